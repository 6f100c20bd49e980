//! Partitions the topic catalog into most-liked / rated-but-not-most-liked /
//! unrated for one user.
//!
//! The partition is recomputed from scratch on every feedback cycle; nothing
//! is patched incrementally. `most_liked` keeps descending preference order
//! so the allocator can weight its exploit draw by summary key.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::models::{FeedbackEntry, TopicCategories, TopicId, VideoId};
use crate::repository::VideoCatalog;
use crate::services::preference::{ranked_indices, SUMMARY_LEN};

pub struct TopicCategorizer<C: VideoCatalog> {
    catalog: Arc<C>,
    num_topics: usize,
    filtered_topics: HashSet<TopicId>,
}

impl<C: VideoCatalog> TopicCategorizer<C> {
    pub fn new(catalog: Arc<C>, num_topics: usize, filtered_topics: HashSet<TopicId>) -> Self {
        Self {
            catalog,
            num_topics,
            filtered_topics,
        }
    }

    pub async fn categorize(
        &self,
        preference_vector: &[f64],
        feedback_history: &[FeedbackEntry],
    ) -> Result<TopicCategories> {
        let most_liked: Vec<TopicId> = ranked_indices(preference_vector)
            .into_iter()
            .take(SUMMARY_LEN)
            .filter(|t| !self.filtered_topics.contains(t))
            .collect();
        let most_liked_set: HashSet<TopicId> = most_liked.iter().copied().collect();

        let rated = self.rated_topics(feedback_history).await?;

        let mut rated_but_not_most_liked: Vec<TopicId> = rated
            .into_iter()
            .filter(|t| !most_liked_set.contains(t) && !self.filtered_topics.contains(t))
            .collect();
        rated_but_not_most_liked.sort_unstable();
        let rated_set: HashSet<TopicId> = rated_but_not_most_liked.iter().copied().collect();

        let unrated: Vec<TopicId> = (0..self.num_topics)
            .filter(|t| {
                !most_liked_set.contains(t)
                    && !rated_set.contains(t)
                    && !self.filtered_topics.contains(t)
            })
            .collect();

        debug!(
            most_liked = most_liked.len(),
            rated = rated_but_not_most_liked.len(),
            unrated = unrated.len(),
            "topic categories recomputed"
        );

        Ok(TopicCategories {
            most_liked,
            rated_but_not_most_liked,
            unrated,
        })
    }

    /// Topics the user has explicitly touched: every `more`/`less` id ever
    /// submitted, plus the top-3 topics of every video with an explicit
    /// rating.
    async fn rated_topics(&self, feedback_history: &[FeedbackEntry]) -> Result<HashSet<TopicId>> {
        let mut rated: HashSet<TopicId> = HashSet::new();

        for entry in feedback_history {
            rated.extend(entry.more.iter().copied());
            rated.extend(entry.less.iter().copied());
        }

        let rated_video_ids: Vec<VideoId> = feedback_history
            .iter()
            .filter(|e| e.rating != 0)
            .map(|e| e.video_id.clone())
            .collect();
        if !rated_video_ids.is_empty() {
            let top_topics = self.catalog.video_top_topics_bulk(&rated_video_ids).await?;
            for topics in top_topics.values() {
                rated.extend(topics.iter().copied());
            }
        }

        Ok(rated)
    }
}
