//! The classic personalised recommender.
//!
//! Predecessor of the exploit/explore allocator, kept as a selectable lane:
//! one percentile-window catalog query driven by the legacy liked/unrated
//! topic ratings. Above a coefficient of 0.5 the query exploits (liked
//! topics first, window from the coefficient); at or below it explores
//! (unrated topics first, window from the complement).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{
    ExploitCoefficient, Recommendation, RecommendationModel, TopicId, UserProfile, VideoId,
};
use crate::repository::VideoCatalog;

pub struct ClassicRecommender<C: VideoCatalog> {
    catalog: Arc<C>,
}

impl<C: VideoCatalog> ClassicRecommender<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    pub async fn recommend(
        &self,
        profile: &UserProfile,
        excluded: &HashSet<VideoId>,
        n_recs: usize,
    ) -> Result<Vec<Recommendation>> {
        let coeff = profile.exploit_coeff;
        let exploitative = coeff.value() > 0.5;

        let window = if exploitative {
            coeff.percentile_window()
        } else {
            ExploitCoefficient::new(1.0 - coeff.value())?.percentile_window()
        };

        let (primary, secondary): (&[TopicId], &[TopicId]) = if exploitative {
            (&profile.topic_ratings.liked, &profile.topic_ratings.unrated)
        } else {
            (&profile.topic_ratings.unrated, &profile.topic_ratings.liked)
        };

        let hits = self
            .catalog
            .search_by_topic_percentile(primary, secondary, window, excluded, n_recs)
            .await?;

        info!(
            user_id = %profile.user_id,
            exploitative = exploitative,
            window_low = window.0,
            window_high = window.1,
            hits = hits.len(),
            "classic recommendation query completed"
        );

        let mut recommendations = Vec::with_capacity(hits.len());
        for hit in hits {
            let first = self.describe(hit.most_relevant_topic).await;
            let second = match hit.second_most_relevant_topic {
                Some(topic) => self.describe(topic).await,
                None => "No description available".to_string(),
            };
            let explanation = if exploitative {
                format!(
                    "Recommended to you because you seem to like topic '{first}' \
                     and because you have not come across videos of topic '{second}'."
                )
            } else {
                format!(
                    "Recommended to you because you have not come across videos of topic '{first}' \
                     and because you seem to like topic '{second}'."
                )
            };
            recommendations.push(Recommendation {
                video_id: hit.video_id,
                explanation,
                model: RecommendationModel::ClassicPersonalised,
            });
        }

        Ok(recommendations)
    }

    async fn describe(&self, topic_id: TopicId) -> String {
        match self.catalog.topic_description(topic_id).await {
            Ok(description) => description,
            Err(e) => {
                warn!(topic_id = topic_id, error = %e, "topic description unavailable");
                "No description available".to_string()
            }
        }
    }
}
