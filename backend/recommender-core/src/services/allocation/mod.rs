//! Slot allocation across the three recommendation lanes.
//!
//! 1. Top-popular: uniform topics from the current rotation cycle, highest
//!    view count first.
//! 2. Exploit: weighted draw over the user's most-liked topics.
//! 3. Explore: even split over the unrated and rated-but-not-most-liked
//!    pools.
//!
//! When the exploit share rounds to zero the personalised lanes are dropped
//! entirely and only the top-popular results are returned. The final list is
//! shuffled uniformly.

pub mod explanation;
pub mod sampling;

use rand::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{
    Recommendation, RecommendationBudgets, RecommendationModel, TopicId, UserProfile, VideoId,
};
use crate::repository::VideoCatalog;

pub struct Allocator<C: VideoCatalog> {
    catalog: Arc<C>,
    num_topics: usize,
    filtered_topics: HashSet<TopicId>,
}

impl<C: VideoCatalog> Allocator<C> {
    pub fn new(catalog: Arc<C>, num_topics: usize, filtered_topics: HashSet<TopicId>) -> Self {
        Self {
            catalog,
            num_topics,
            filtered_topics,
        }
    }

    /// Fills the request's budget. Mutates the profile's rotation cycle; the
    /// caller persists the profile after a successful allocation.
    pub async fn allocate<R: Rng + Send>(
        &self,
        profile: &mut UserProfile,
        budgets: RecommendationBudgets,
        excluded: &HashSet<VideoId>,
        rng: &mut R,
    ) -> Result<Vec<Recommendation>> {
        let mut recommendations = self
            .top_popular_lane(profile, budgets.unpersonalised, excluded, rng)
            .await?;

        let coeff = profile.exploit_coeff;
        let n_exploit = (budgets.personalised as f64 * coeff.value()).round() as usize;
        let n_explore = budgets.personalised - n_exploit;

        let explore_topics = sampling::sample_explore_topics(
            n_explore,
            &profile.topic_categories.unrated,
            &profile.topic_categories.rated_but_not_most_liked,
            rng,
        );

        if n_exploit == 0 {
            // The personalised lanes are dropped wholesale, explore sample
            // included; only the top-popular slots survive.
            info!(
                user_id = %profile.user_id,
                "exploit share is zero; returning top-popular lane only"
            );
            return Ok(recommendations);
        }

        let exploit_topics = sampling::sample_exploit_topics(
            &profile.topic_categories.most_liked,
            &profile.processed_topic_scores,
            n_exploit,
            rng,
        )?;

        let mut descriptions: HashMap<TopicId, String> = HashMap::new();

        let exploit_hits = self
            .catalog
            .search_by_topics(&exploit_topics, excluded, exploit_topics.len())
            .await?;
        for hit in exploit_hits {
            let description = self
                .topic_description_cached(hit.most_relevant_topic, &mut descriptions)
                .await;
            recommendations.push(Recommendation {
                video_id: hit.video_id,
                explanation: explanation::personalised(&description, true, coeff),
                model: RecommendationModel::ExploitExplore,
            });
        }

        let explore_hits = self
            .catalog
            .search_by_topics(&explore_topics, excluded, explore_topics.len())
            .await?;
        for hit in explore_hits {
            let description = self
                .topic_description_cached(hit.most_relevant_topic, &mut descriptions)
                .await;
            recommendations.push(Recommendation {
                video_id: hit.video_id,
                explanation: explanation::personalised(&description, false, coeff),
                model: RecommendationModel::ExploitExplore,
            });
        }

        recommendations.shuffle(rng);

        info!(
            user_id = %profile.user_id,
            n_exploit = n_exploit,
            n_explore = n_explore,
            total = recommendations.len(),
            "allocation completed"
        );

        Ok(recommendations)
    }

    /// The unpersonalised lane: rotates uniformly through every non-filtered
    /// topic, resetting once the whole catalog has been surfaced, and picks
    /// the most viewed unseen video per sampled topic.
    async fn top_popular_lane<R: Rng + Send>(
        &self,
        profile: &mut UserProfile,
        budget: usize,
        excluded: &HashSet<VideoId>,
        rng: &mut R,
    ) -> Result<Vec<Recommendation>> {
        let rotation_size = self.num_topics - self.filtered_topics.len();
        if profile.recommended_topics_cycle.len() >= rotation_size {
            info!(
                user_id = %profile.user_id,
                "top-popular rotation complete; resetting cycle"
            );
            profile.recommended_topics_cycle.clear();
        }

        let available: Vec<TopicId> = (0..self.num_topics)
            .filter(|t| {
                !profile.recommended_topics_cycle.contains(t) && !self.filtered_topics.contains(t)
            })
            .collect();

        let sampled = sampling::sample_uniform_topics(&available, budget, rng);
        if sampled.is_empty() {
            return Ok(Vec::new());
        }

        let hits = self
            .catalog
            .search_by_topics(&sampled, excluded, sampled.len())
            .await?;

        let recommendations = hits
            .into_iter()
            .map(|hit| Recommendation {
                video_id: hit.video_id,
                explanation: explanation::top_popular(hit.view_count),
                model: RecommendationModel::TopPopular,
            })
            .collect();

        profile.recommended_topics_cycle.extend(sampled);
        Ok(recommendations)
    }

    async fn topic_description_cached(
        &self,
        topic_id: TopicId,
        cache: &mut HashMap<TopicId, String>,
    ) -> String {
        if let Some(description) = cache.get(&topic_id) {
            return description.clone();
        }
        let description = match self.catalog.topic_description(topic_id).await {
            Ok(description) => description,
            Err(e) => {
                warn!(topic_id = topic_id, error = %e, "topic description unavailable");
                "No description available".to_string()
            }
        };
        cache.insert(topic_id, description.clone());
        description
    }
}
