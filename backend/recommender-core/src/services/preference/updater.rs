//! Folds feedback batches into the per-user preference vector.
//!
//! Entries are folded in the batch's given order. The explicit-rating branch
//! clamps the vector at zero; the watch-ratio branch does not.
//!
//! The two side-channel adjusters (creator-dislike expansion and exploit
//! coefficient decay) consume the same batch and run exactly once per batch,
//! so they live here rather than in the allocator that reads their output.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{
    CreatorId, FeedbackEntry, UserProfile, VideoId, REASON_DISLIKE_CREATOR,
    REASON_NOT_INTERESTED_IN_TOPICS, REASON_TOO_MUCH_SIMILAR_CONTENT,
};
use crate::repository::VideoCatalog;
use crate::services::preference::topic_scores;
use crate::utils::iso8601_duration_to_seconds;

/// Carry-over share of the previous vector on each blended update.
const HISTORY_WEIGHT: f64 = 0.9;
/// Share of the incoming topic distribution on each blended update.
const UPDATE_WEIGHT: f64 = 0.1;
/// Additive bonus per "more of this topic" request.
const MORE_TOPIC_BONUS: f64 = 0.1;
/// Multiplicative penalty per "less of this topic" request.
const LESS_TOPIC_FACTOR: f64 = 0.5;
/// Minimum watch ratio for an unrated view to count as a signal.
const WATCH_RATIO_THRESHOLD: f64 = 0.5;
/// Number of top distribution indices penalized by a topic dislike.
const DISLIKED_TOPIC_COUNT: usize = 3;

/// Update weight for an explicit star rating.
fn rating_weight(rating: u8) -> Option<f64> {
    match rating {
        1 => Some(-2.0),
        2 => Some(-1.0),
        3 => Some(0.5),
        4 => Some(1.0),
        5 => Some(2.0),
        _ => None,
    }
}

/// A feedback entry enriched with its processing-time derived fields.
#[derive(Debug, Clone)]
pub struct ProcessedEntry {
    pub entry: FeedbackEntry,
    pub watch_ratio: Option<f64>,
    pub topic_distribution: Option<Vec<f64>>,
}

impl ProcessedEntry {
    fn watch_signal(&self) -> bool {
        self.watch_ratio.is_some_and(|r| r > WATCH_RATIO_THRESHOLD)
    }

    /// Whether folding this entry reads the video's topic distribution.
    fn needs_distribution(&self) -> bool {
        self.entry.rating != 0
            || self.watch_signal()
            || self.entry.has_reason(REASON_NOT_INTERESTED_IN_TOPICS)
    }

    /// The eligibility filter: at least one actionable signal.
    fn is_actionable(&self) -> bool {
        self.entry.rating != 0
            || self.watch_signal()
            || !self.entry.more.is_empty()
            || !self.entry.less.is_empty()
            || !self.entry.dislike_reasons.is_empty()
    }
}

/// Result of folding one batch, reported back through the `FeedbackAck`.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub processed: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

/// Applies a feedback batch to a user profile: the vector fold plus the
/// side-channel adjusters. Renormalization is the final step; a batch that
/// drives the whole vector to zero aborts with `InvalidState` and nothing is
/// persisted by the caller.
pub struct PreferenceUpdater<C: VideoCatalog> {
    catalog: Arc<C>,
}

impl<C: VideoCatalog> PreferenceUpdater<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    pub async fn apply_batch(
        &self,
        profile: &mut UserProfile,
        batch: &[FeedbackEntry],
    ) -> Result<BatchOutcome> {
        for entry in batch {
            entry.validate()?;
        }

        let mut outcome = BatchOutcome::default();

        // Attach watch ratios for entries without an explicit rating.
        let mut entries = self
            .attach_watch_ratios(batch, &mut outcome.warnings)
            .await?;

        // Drop entries with no actionable signal.
        let before = entries.len();
        entries.retain(|e| {
            let keep = e.is_actionable();
            if !keep {
                debug!(video_id = %e.entry.video_id, "feedback entry has no actionable signal");
            }
            keep
        });
        outcome.skipped += before - entries.len();

        self.attach_topic_distributions(&mut entries, &mut outcome.warnings)
            .await;

        for processed in &entries {
            if processed.needs_distribution() {
                match &processed.topic_distribution {
                    Some(distribution) if distribution.len() == profile.preference_vector.len() => {}
                    Some(_) => {
                        outcome.warnings.push(format!(
                            "topic distribution for video {} has the wrong dimension; entry skipped",
                            processed.entry.video_id
                        ));
                        outcome.skipped += 1;
                        continue;
                    }
                    None => {
                        outcome.warnings.push(format!(
                            "topic distribution for video {} unavailable; entry skipped",
                            processed.entry.video_id
                        ));
                        outcome.skipped += 1;
                        continue;
                    }
                }
            }
            fold_entry(&mut profile.preference_vector, processed);
            outcome.processed += 1;
        }

        self.apply_creator_dislikes(profile, batch, &mut outcome.warnings)
            .await;
        apply_coefficient_decay(profile, batch);

        topic_scores::renormalize(&mut profile.preference_vector)?;

        info!(
            user_id = %profile.user_id,
            processed = outcome.processed,
            skipped = outcome.skipped,
            warnings = outcome.warnings.len(),
            "feedback batch folded"
        );

        Ok(outcome)
    }

    /// Computes `total_watch_time / duration` for entries lacking an
    /// explicit rating. Missing or unparsable durations leave the ratio
    /// unset; the entry may still qualify through its other signals.
    async fn attach_watch_ratios(
        &self,
        batch: &[FeedbackEntry],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<ProcessedEntry>> {
        let unrated_ids: Vec<VideoId> = batch
            .iter()
            .filter(|e| e.rating == 0)
            .map(|e| e.video_id.clone())
            .collect();

        let durations = if unrated_ids.is_empty() {
            HashMap::new()
        } else {
            match self.catalog.video_durations_bulk(&unrated_ids).await {
                Ok(durations) => durations,
                Err(e) => {
                    warnings.push(format!("video durations unavailable: {e}"));
                    HashMap::new()
                }
            }
        };

        Ok(batch
            .iter()
            .map(|entry| {
                let watch_ratio = if entry.rating == 0 {
                    durations.get(&entry.video_id).and_then(|duration| {
                        match iso8601_duration_to_seconds(duration) {
                            Ok(secs) if secs > 0 => Some(entry.total_watch_time / secs as f64),
                            Ok(_) => None,
                            Err(e) => {
                                warnings.push(format!(
                                    "duration of video {} unparsable: {e}",
                                    entry.video_id
                                ));
                                None
                            }
                        }
                    })
                } else {
                    None
                };
                ProcessedEntry {
                    entry: entry.clone(),
                    watch_ratio,
                    topic_distribution: None,
                }
            })
            .collect())
    }

    /// Bulk-fetches topic distributions for the entries that will read them.
    /// A fetch failure degrades to per-entry skips, never a batch abort.
    async fn attach_topic_distributions(
        &self,
        entries: &mut [ProcessedEntry],
        warnings: &mut Vec<String>,
    ) {
        let needed: Vec<VideoId> = entries
            .iter()
            .filter(|e| e.needs_distribution())
            .map(|e| e.entry.video_id.clone())
            .collect();
        if needed.is_empty() {
            return;
        }

        match self.catalog.topic_distributions_bulk(&needed).await {
            Ok(distributions) => {
                for processed in entries.iter_mut().filter(|e| e.needs_distribution()) {
                    processed.topic_distribution =
                        distributions.get(&processed.entry.video_id).cloned();
                }
            }
            Err(e) => {
                warn!(error = %e, "topic distribution fetch failed for batch");
                warnings.push(format!("topic distributions unavailable: {e}"));
            }
        }
    }

    /// Expands "Dislike the creator" entries into the profile's creator and
    /// video exclusion sets.
    async fn apply_creator_dislikes(
        &self,
        profile: &mut UserProfile,
        batch: &[FeedbackEntry],
        warnings: &mut Vec<String>,
    ) {
        let mut disliked: HashSet<CreatorId> = HashSet::new();

        for entry in batch {
            if !entry.has_reason(REASON_DISLIKE_CREATOR) {
                continue;
            }
            match self.catalog.creator_of(&entry.video_id).await {
                Ok(creator_id) => {
                    disliked.insert(creator_id);
                }
                Err(e) => {
                    warnings.push(format!(
                        "creator of video {} unavailable: {e}",
                        entry.video_id
                    ));
                }
            }
        }

        for creator_id in disliked {
            match self.catalog.videos_by_creator(&creator_id).await {
                Ok(video_ids) => {
                    info!(
                        user_id = %profile.user_id,
                        creator_id = %creator_id,
                        video_count = video_ids.len(),
                        "creator disliked; excluding catalog"
                    );
                    profile.disliked_creator_video_ids.extend(video_ids);
                    profile.disliked_creators.insert(creator_id);
                }
                Err(e) => {
                    warnings.push(format!("videos of creator {creator_id} unavailable: {e}"));
                    profile.disliked_creators.insert(creator_id);
                }
            }
        }
    }
}

/// One decay step per "Too much similar content" dislike in the batch.
fn apply_coefficient_decay(profile: &mut UserProfile, batch: &[FeedbackEntry]) {
    let count = batch
        .iter()
        .filter(|e| e.has_reason(REASON_TOO_MUCH_SIMILAR_CONTENT))
        .count();
    if count == 0 {
        return;
    }
    let decayed = profile.exploit_coeff.decayed(count);
    if decayed != profile.exploit_coeff {
        info!(
            user_id = %profile.user_id,
            from = profile.exploit_coeff.value(),
            to = decayed.value(),
            "exploit coefficient decayed"
        );
    }
    profile.exploit_coeff = decayed;
}

/// Applies one enriched entry to the vector, in four steps: the blended
/// rating-or-watch update, the additive `more` bonuses, the multiplicative
/// `less` penalties, and the topic-dislike penalty on the distribution's
/// top-3 indices. Out-of-range topic indices are skipped.
fn fold_entry(vector: &mut [f64], processed: &ProcessedEntry) {
    let entry = &processed.entry;

    if entry.rating != 0 {
        if let (Some(weight), Some(distribution)) =
            (rating_weight(entry.rating), &processed.topic_distribution)
        {
            for (value, dist) in vector.iter_mut().zip(distribution) {
                *value = (HISTORY_WEIGHT * *value + UPDATE_WEIGHT * weight * dist).max(0.0);
            }
        }
    } else if let (Some(ratio), Some(distribution)) =
        (processed.watch_ratio, &processed.topic_distribution)
    {
        if ratio > WATCH_RATIO_THRESHOLD {
            let weight = if (0.75..=100.0).contains(&ratio) { 1.0 } else { 0.5 };
            for (value, dist) in vector.iter_mut().zip(distribution) {
                *value = HISTORY_WEIGHT * *value + UPDATE_WEIGHT * weight * dist;
            }
        }
    }

    for &topic in &entry.more {
        if topic < vector.len() {
            vector[topic] += MORE_TOPIC_BONUS;
        }
    }
    for &topic in &entry.less {
        if topic < vector.len() {
            vector[topic] *= LESS_TOPIC_FACTOR;
        }
    }

    if entry.has_reason(REASON_NOT_INTERESTED_IN_TOPICS) {
        if let Some(distribution) = &processed.topic_distribution {
            let ranked = topic_scores::ranked_indices(distribution);
            for &topic in ranked.iter().take(DISLIKED_TOPIC_COUNT) {
                if topic < vector.len() {
                    vector[topic] *= LESS_TOPIC_FACTOR;
                }
            }
        }
    }
}
