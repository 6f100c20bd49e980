//! The operations exposed to the surrounding API layer.
//!
//! Each operation loads the user's profile, runs to completion with strictly
//! sequential collaborator calls, and persists the whole aggregate with one
//! atomic save; there are no partial commits. Feedback cycles for the same
//! user are serialized through a per-user lock; the profile stores must
//! provide atomic replace semantics so concurrent readers never observe a
//! half-updated profile.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::error::{RecommenderError, Result};
use crate::models::{
    ExploitCoefficient, FeedbackAck, FeedbackEntry, ProcessedTopicScores, Recommendation,
    RecommendationBudgets, TopicCategories, TopicId, TopicRatings, UserId, UserProfile, VideoId,
};
use crate::repository::{FeedbackStore, ProfileStore, VideoCatalog};
use crate::services::allocation::Allocator;
use crate::services::categorizer::TopicCategorizer;
use crate::services::classic::ClassicRecommender;
use crate::services::preference::{compress, expand, renormalize, PreferenceUpdater};

/// Reserved default topics that receive a small floor affinity at
/// registration, so a brand-new profile is never degenerate.
const RESERVED_FLOOR_TOPICS: std::ops::RangeInclusive<TopicId> = 1..=10;
const RESERVED_FLOOR_VALUE: f64 = 0.001;
/// Affinity mass split across the topics picked at registration.
const LIKED_TOPIC_MASS: f64 = 0.99;

pub struct RecommenderEngine<C: VideoCatalog, F: FeedbackStore, P: ProfileStore> {
    feedback: Arc<F>,
    profiles: Arc<P>,
    config: Config,
    updater: PreferenceUpdater<C>,
    categorizer: TopicCategorizer<C>,
    allocator: Allocator<C>,
    classic: ClassicRecommender<C>,
    cycle_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl<C: VideoCatalog, F: FeedbackStore, P: ProfileStore> RecommenderEngine<C, F, P> {
    pub fn new(catalog: Arc<C>, feedback: Arc<F>, profiles: Arc<P>, config: Config) -> Self {
        let filtered = config.catalog.filtered_topic_set();
        Self {
            feedback,
            profiles,
            updater: PreferenceUpdater::new(Arc::clone(&catalog)),
            categorizer: TopicCategorizer::new(
                Arc::clone(&catalog),
                config.catalog.num_topics,
                filtered.clone(),
            ),
            allocator: Allocator::new(
                Arc::clone(&catalog),
                config.catalog.num_topics,
                filtered,
            ),
            classic: ClassicRecommender::new(catalog),
            config,
            cycle_locks: DashMap::new(),
        }
    }

    /// Creates a profile seeded from the topics picked during onboarding.
    pub async fn register_user(&self, user_id: &str, liked_topic_ids: &[TopicId]) -> Result<()> {
        let num_topics = self.config.catalog.num_topics;

        if user_id.is_empty() {
            return Err(RecommenderError::InvalidInput("empty user id".to_string()));
        }
        if liked_topic_ids.is_empty() {
            return Err(RecommenderError::InvalidInput(
                "registration requires at least one liked topic".to_string(),
            ));
        }
        if let Some(&bad) = liked_topic_ids.iter().find(|&&t| t >= num_topics) {
            return Err(RecommenderError::InvalidInput(format!(
                "liked topic {bad} is outside the catalog"
            )));
        }
        if self.profiles.load(user_id).await?.is_some() {
            return Err(RecommenderError::InvalidState(format!(
                "user {user_id} is already registered"
            )));
        }

        let mut vector = vec![0.0; num_topics];
        for topic in RESERVED_FLOOR_TOPICS {
            if topic < num_topics {
                vector[topic] = RESERVED_FLOOR_VALUE;
            }
        }
        let liked_score = LIKED_TOPIC_MASS / liked_topic_ids.len() as f64;
        for &topic in liked_topic_ids {
            vector[topic] = liked_score;
        }
        renormalize(&mut vector)?;

        let processed_topic_scores = compress(&vector, true)?;

        let filtered = self.config.catalog.filtered_topic_set();
        let liked_set: HashSet<TopicId> = liked_topic_ids.iter().copied().collect();
        let topic_categories = TopicCategories {
            most_liked: liked_topic_ids.to_vec(),
            rated_but_not_most_liked: Vec::new(),
            unrated: (0..num_topics)
                .filter(|t| !liked_set.contains(t) && !filtered.contains(t))
                .collect(),
        };
        let topic_ratings = TopicRatings {
            liked: liked_topic_ids.to_vec(),
            disliked: Vec::new(),
            unrated: (0..num_topics).filter(|t| !liked_set.contains(t)).collect(),
        };

        let now = Utc::now().timestamp();
        let profile = UserProfile {
            user_id: user_id.to_string(),
            preference_vector: vector,
            processed_topic_scores,
            topic_categories,
            topic_ratings,
            exploit_coeff: ExploitCoefficient::new(
                self.config.recommendation.initial_exploit_coeff,
            )?,
            recommended_topics_cycle: HashSet::new(),
            disliked_creators: HashSet::new(),
            disliked_creator_video_ids: HashSet::new(),
            budgets: RecommendationBudgets {
                personalised: self.config.recommendation.default_personalised_budget,
                unpersonalised: self.config.recommendation.default_unpersonalised_budget,
            },
            feedback_last_used: now,
            registered_at: now,
        };
        self.profiles.save(&profile).await?;

        info!(
            user_id = %user_id,
            liked_topics = liked_topic_ids.len(),
            "user registered"
        );
        Ok(())
    }

    /// Appends the batch to the feedback log and folds it into the profile.
    pub async fn process_feedback(
        &self,
        user_id: &str,
        batch: &[FeedbackEntry],
    ) -> Result<FeedbackAck> {
        for entry in batch {
            entry.validate()?;
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut profile = self.load_profile(user_id).await?;
        self.feedback.append(batch).await?;
        self.run_cycle(&mut profile, batch).await
    }

    /// Folds any feedback logged since the profile's high-water timestamp.
    /// Callers run this before serving recommendations or profile reads so
    /// the served profile reflects the latest logged feedback.
    pub async fn process_pending_feedback(&self, user_id: &str) -> Result<FeedbackAck> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut profile = self.load_profile(user_id).await?;
        let batch = self
            .feedback
            .feedback_since(user_id, profile.feedback_last_used)
            .await?;
        if batch.is_empty() {
            return Ok(FeedbackAck::default());
        }
        self.run_cycle(&mut profile, &batch).await
    }

    async fn run_cycle(
        &self,
        profile: &mut UserProfile,
        batch: &[FeedbackEntry],
    ) -> Result<FeedbackAck> {
        let outcome = self.updater.apply_batch(profile, batch).await?;

        let history = self.feedback.all_feedback(&profile.user_id).await?;
        profile.topic_categories = self
            .categorizer
            .categorize(&profile.preference_vector, &history)
            .await?;
        profile.processed_topic_scores = compress(&profile.preference_vector, false)?;

        if let Some(latest) = batch.iter().map(|e| e.timestamp).max() {
            profile.feedback_last_used = profile.feedback_last_used.max(latest);
        }

        self.profiles.save(profile).await?;

        Ok(FeedbackAck {
            processed: outcome.processed,
            skipped: outcome.skipped,
            warnings: outcome.warnings,
        })
    }

    /// Allocates a recommendation list for the user. `budgets = None` uses
    /// the per-user stored defaults.
    pub async fn get_recommendations(
        &self,
        user_id: &str,
        budgets: Option<RecommendationBudgets>,
    ) -> Result<Vec<Recommendation>> {
        let mut rng = StdRng::from_entropy();
        self.recommendations_with_rng(user_id, budgets, &mut rng)
            .await
    }

    /// Deterministic variant used by tests and replay tooling.
    pub async fn recommendations_with_rng<R: Rng + Send>(
        &self,
        user_id: &str,
        budgets: Option<RecommendationBudgets>,
        rng: &mut R,
    ) -> Result<Vec<Recommendation>> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut profile = self.load_profile(user_id).await?;
        let budgets = budgets.unwrap_or(profile.budgets);
        let excluded = self.excluded_videos(&profile).await?;

        let recommendations = self
            .allocator
            .allocate(&mut profile, budgets, &excluded, rng)
            .await?;
        self.profiles.save(&profile).await?;

        Ok(recommendations)
    }

    /// The recovered classic percentile-window lane.
    pub async fn classic_recommendations(
        &self,
        user_id: &str,
        n_recs: usize,
    ) -> Result<Vec<Recommendation>> {
        let profile = self.load_profile(user_id).await?;
        let excluded = self.excluded_videos(&profile).await?;
        self.classic.recommend(&profile, &excluded, n_recs).await
    }

    /// Merges a user-edited top-10 summary back into the full vector.
    pub async fn update_edited_summary(
        &self,
        user_id: &str,
        edited: ProcessedTopicScores,
    ) -> Result<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut profile = self.load_profile(user_id).await?;
        let expanded = expand(
            &profile.preference_vector,
            &profile.processed_topic_scores,
            &edited,
        )?;
        profile.preference_vector = expanded;
        profile.processed_topic_scores = ProcessedTopicScores::from_pairs(
            edited.entries().iter().map(|e| (e.topic, e.score)).collect(),
        );
        self.profiles.save(&profile).await?;

        info!(user_id = %user_id, "edited topic summary merged");
        Ok(())
    }

    async fn load_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiles
            .load(user_id)
            .await?
            .ok_or_else(|| RecommenderError::NotFound(format!("user {user_id}")))
    }

    /// Watched videos union the disliked-creator catalog; no lane may
    /// surface any of these.
    async fn excluded_videos(&self, profile: &UserProfile) -> Result<HashSet<VideoId>> {
        let mut excluded: HashSet<VideoId> = self
            .feedback
            .all_feedback(&profile.user_id)
            .await?
            .into_iter()
            .map(|entry| entry.video_id)
            .collect();
        excluded.extend(profile.disliked_creator_video_ids.iter().cloned());
        Ok(excluded)
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.cycle_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
