use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::error::{RecommenderError, Result};

/// Index into the topic catalog, `[0, num_topics)`.
pub type TopicId = usize;
pub type UserId = String;
pub type VideoId = String;
pub type CreatorId = String;

/// Dislike reasons carried verbatim from the feedback UI.
pub const REASON_NOT_INTERESTED_IN_TOPICS: &str = "Not interested in topics";
pub const REASON_DISLIKE_CREATOR: &str = "Dislike the creator";
pub const REASON_TOO_MUCH_SIMILAR_CONTENT: &str = "Too much similar content";

/// A single feedback entry as submitted by the API layer.
///
/// `rating == 0` means "no explicit rating given". The derived fields
/// (watch ratio, the video's topic distribution) are attached during batch
/// processing and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub user_id: UserId,
    pub video_id: VideoId,
    /// Explicit star rating in `0..=5`; 0 when absent.
    pub rating: u8,
    /// Topics the user asked to see more of.
    #[serde(default)]
    pub more: BTreeSet<TopicId>,
    /// Topics the user asked to see less of.
    #[serde(default)]
    pub less: BTreeSet<TopicId>,
    /// Accumulated watch time in seconds.
    #[serde(default)]
    pub total_watch_time: f64,
    #[serde(default)]
    pub dislike_reasons: BTreeSet<String>,
    /// Epoch seconds at submission time.
    pub timestamp: i64,
}

impl FeedbackEntry {
    /// Ingestion-time validation. Malformed entries are rejected with
    /// `InvalidInput` instead of being folded on a best-effort basis.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.is_empty() {
            return Err(RecommenderError::InvalidInput(
                "feedback entry is missing a user id".to_string(),
            ));
        }
        if self.video_id.is_empty() {
            return Err(RecommenderError::InvalidInput(
                "feedback entry is missing a video id".to_string(),
            ));
        }
        if self.rating > 5 {
            return Err(RecommenderError::InvalidInput(format!(
                "rating {} is outside 0..=5 for video {}",
                self.rating, self.video_id
            )));
        }
        Ok(())
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.dislike_reasons.contains(reason)
    }
}

/// Compact, editable view of the top of a preference vector: the top-10
/// topics with normalized relative scores, ordered by descending score.
///
/// Edits made through this view are merged back into the full vector by the
/// expand transform; they are never applied to the vector directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessedTopicScores {
    entries: Vec<TopicScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicScore {
    pub topic: TopicId,
    pub score: f64,
}

impl ProcessedTopicScores {
    /// Builds a summary from `(topic, score)` pairs, ordering by descending
    /// score.
    pub fn from_pairs(pairs: Vec<(TopicId, f64)>) -> Self {
        let mut entries: Vec<TopicScore> = pairs
            .into_iter()
            .map(|(topic, score)| TopicScore { topic, score })
            .collect();
        entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ProcessedTopicScores { entries }
    }

    pub fn entries(&self) -> &[TopicScore] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn topics(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.entries.iter().map(|e| e.topic)
    }

    pub fn topic_set(&self) -> HashSet<TopicId> {
        self.topics().collect()
    }

    pub fn score_of(&self, topic: TopicId) -> Option<f64> {
        self.entries.iter().find(|e| e.topic == topic).map(|e| e.score)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.score).sum()
    }
}

/// Disjoint partition of the topic catalog, recomputed from scratch on every
/// feedback cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopicCategories {
    /// Top preference-vector topics minus the filtered set, in descending
    /// preference order. Exploit sampling draws from this list by key.
    pub most_liked: Vec<TopicId>,
    /// Explicitly touched topics that did not make `most_liked`.
    pub rated_but_not_most_liked: Vec<TopicId>,
    /// Everything else, ascending.
    pub unrated: Vec<TopicId>,
}

/// Legacy liked/disliked/unrated partition seeded at registration and
/// consumed by the classic percentile-window recommender.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopicRatings {
    pub liked: Vec<TopicId>,
    pub disliked: Vec<TopicId>,
    pub unrated: Vec<TopicId>,
}

/// Scalar in `[0, 1]` controlling the exploit/explore allocation mix.
///
/// Decays by 0.1 (rounded to one decimal) for every "Too much similar
/// content" dislike in a feedback batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExploitCoefficient(f64);

impl ExploitCoefficient {
    pub fn new(value: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(RecommenderError::InvalidInput(format!(
                "exploit coefficient {value} is outside [0, 1]"
            )));
        }
        Ok(ExploitCoefficient(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Applies `count` decay steps of 0.1, clamped at zero and rounded to
    /// one decimal.
    pub fn decayed(&self, count: usize) -> Self {
        let raw = (self.0 - 0.1 * count as f64).max(0.0);
        ExploitCoefficient((raw * 10.0).round() / 10.0)
    }

    /// Maps the coefficient to a popularity-percentile window used by the
    /// classic recommender to bias which videos within a topic surface.
    ///
    /// The band table is defined on {0.6, 0.7, 0.8, 0.9, 1.0}; lower inputs
    /// clamp up to 0.6, so a decayed coefficient keeps yielding the widest
    /// exploration window instead of failing the request.
    pub fn percentile_window(&self) -> (u8, u8) {
        let clamped = self.0.max(0.6);
        if clamped >= 1.0 {
            (0, 20)
        } else if clamped >= 0.9 {
            (20, 40)
        } else if clamped >= 0.8 {
            (40, 60)
        } else if clamped >= 0.7 {
            (60, 80)
        } else {
            (80, 100)
        }
    }
}

impl Default for ExploitCoefficient {
    fn default() -> Self {
        ExploitCoefficient(0.5)
    }
}

/// Per-user recommendation slot budgets; callers may override per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RecommendationBudgets {
    pub personalised: usize,
    pub unpersonalised: usize,
}

impl Default for RecommendationBudgets {
    fn default() -> Self {
        RecommendationBudgets {
            personalised: 5,
            unpersonalised: 5,
        }
    }
}

/// The per-user aggregate owned by this core. Persisted and replaced
/// atomically as a single document per feedback cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    /// Affinity over all topics; sums to 1 after every completed cycle.
    pub preference_vector: Vec<f64>,
    pub processed_topic_scores: ProcessedTopicScores,
    pub topic_categories: TopicCategories,
    pub topic_ratings: TopicRatings,
    pub exploit_coeff: ExploitCoefficient,
    /// Topics already surfaced by the top-popular lane in the current
    /// rotation; reset once every non-filtered topic has been covered.
    #[serde(default)]
    pub recommended_topics_cycle: HashSet<TopicId>,
    #[serde(default)]
    pub disliked_creators: HashSet<CreatorId>,
    #[serde(default)]
    pub disliked_creator_video_ids: HashSet<VideoId>,
    #[serde(default)]
    pub budgets: RecommendationBudgets,
    /// High-water timestamp of feedback already folded into the vector.
    #[serde(default)]
    pub feedback_last_used: i64,
    pub registered_at: i64,
}

/// One recommendation slot: a video plus the natural-language reason it was
/// selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub video_id: VideoId,
    pub explanation: String,
    pub model: RecommendationModel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationModel {
    TopPopular,
    ExploitExplore,
    ClassicPersonalised,
}

impl RecommendationModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationModel::TopPopular => "top-popular",
            RecommendationModel::ExploitExplore => "personalised exploitation/exploration",
            RecommendationModel::ClassicPersonalised => "classic personalised",
        }
    }
}

/// Outcome of one feedback-processing cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackAck {
    /// Entries folded into the preference vector.
    pub processed: usize,
    /// Entries dropped by the eligibility filter or skipped on upstream
    /// failure.
    pub skipped: usize,
    /// Human-readable per-entry warnings (upstream fetch failures).
    pub warnings: Vec<String>,
}

/// A catalog search hit, popularity-ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoHit {
    pub video_id: VideoId,
    pub view_count: u64,
    /// The topic this video is most strongly about.
    pub most_relevant_topic: TopicId,
}

/// A percentile-window search hit with the video's top two topics, as
/// returned by the classic recommender's catalog query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileHit {
    pub video_id: VideoId,
    pub most_relevant_topic: TopicId,
    pub second_most_relevant_topic: Option<TopicId>,
}
