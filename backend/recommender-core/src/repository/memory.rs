//! DashMap-backed in-memory implementations of the collaborator traits.
//!
//! Used by the test suite and suitable for embedding the engine without an
//! external search/storage deployment.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};

use crate::error::{RecommenderError, Result};
use crate::models::{
    CreatorId, FeedbackEntry, PercentileHit, TopicId, UserProfile, VideoHit, VideoId,
};
use crate::repository::{FeedbackStore, ProfileStore, VideoCatalog};

/// A catalog document for one video.
#[derive(Debug, Clone)]
pub struct CatalogVideo {
    pub video_id: VideoId,
    pub creator_id: CreatorId,
    /// Probability-like vector over all topics.
    pub topic_distribution: Vec<f64>,
    /// ISO 8601 duration string, e.g. `PT4M30S`.
    pub duration: String,
    pub view_count: u64,
    /// Popularity percentile of this video within its primary topic,
    /// precomputed by the ingest (0 = most popular band).
    pub primary_topic_percentile: f64,
}

impl CatalogVideo {
    /// Topic indices ordered by descending distribution score.
    fn ranked_topics(&self) -> Vec<TopicId> {
        let mut indices: Vec<TopicId> = (0..self.topic_distribution.len()).collect();
        indices.sort_by(|&a, &b| {
            self.topic_distribution[b]
                .partial_cmp(&self.topic_distribution[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        indices
    }

    fn most_relevant_topic(&self) -> TopicId {
        self.ranked_topics().first().copied().unwrap_or_default()
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    videos: DashMap<VideoId, CatalogVideo>,
    topic_descriptions: DashMap<TopicId, String>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_video(&self, video: CatalogVideo) {
        self.videos.insert(video.video_id.clone(), video);
    }

    pub fn insert_topic_description(&self, topic_id: TopicId, description: impl Into<String>) {
        self.topic_descriptions.insert(topic_id, description.into());
    }
}

#[async_trait]
impl VideoCatalog for InMemoryCatalog {
    async fn topic_distributions_bulk(
        &self,
        video_ids: &[VideoId],
    ) -> Result<HashMap<VideoId, Vec<f64>>> {
        Ok(video_ids
            .iter()
            .filter_map(|id| {
                self.videos
                    .get(id)
                    .map(|v| (id.clone(), v.topic_distribution.clone()))
            })
            .collect())
    }

    async fn video_top_topics_bulk(
        &self,
        video_ids: &[VideoId],
    ) -> Result<HashMap<VideoId, Vec<TopicId>>> {
        Ok(video_ids
            .iter()
            .filter_map(|id| {
                self.videos
                    .get(id)
                    .map(|v| (id.clone(), v.ranked_topics().into_iter().take(3).collect()))
            })
            .collect())
    }

    async fn video_durations_bulk(
        &self,
        video_ids: &[VideoId],
    ) -> Result<HashMap<VideoId, String>> {
        Ok(video_ids
            .iter()
            .filter_map(|id| self.videos.get(id).map(|v| (id.clone(), v.duration.clone())))
            .collect())
    }

    async fn creator_of(&self, video_id: &str) -> Result<CreatorId> {
        self.videos
            .get(video_id)
            .map(|v| v.creator_id.clone())
            .ok_or_else(|| RecommenderError::NotFound(format!("video {video_id}")))
    }

    async fn videos_by_creator(&self, creator_id: &str) -> Result<Vec<VideoId>> {
        let mut ids: Vec<VideoId> = self
            .videos
            .iter()
            .filter(|entry| entry.value().creator_id == creator_id)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn search_by_topics(
        &self,
        topics: &[TopicId],
        exclude: &HashSet<VideoId>,
        limit: usize,
    ) -> Result<Vec<VideoHit>> {
        let topic_set: HashSet<TopicId> = topics.iter().copied().collect();
        let mut hits: Vec<VideoHit> = self
            .videos
            .iter()
            .filter(|entry| !exclude.contains(entry.key()))
            .filter_map(|entry| {
                let video = entry.value();
                let top = video.most_relevant_topic();
                topic_set.contains(&top).then(|| VideoHit {
                    video_id: video.video_id.clone(),
                    view_count: video.view_count,
                    most_relevant_topic: top,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn search_by_topic_percentile(
        &self,
        primary: &[TopicId],
        secondary: &[TopicId],
        window: (u8, u8),
        exclude: &HashSet<VideoId>,
        limit: usize,
    ) -> Result<Vec<PercentileHit>> {
        let primary_set: HashSet<TopicId> = primary.iter().copied().collect();
        let secondary_set: HashSet<TopicId> = secondary.iter().copied().collect();
        let (lo, hi) = (window.0 as f64, window.1 as f64);

        let mut scored: Vec<(u64, PercentileHit)> = self
            .videos
            .iter()
            .filter(|entry| !exclude.contains(entry.key()))
            .filter_map(|entry| {
                let video = entry.value();
                let ranked = video.ranked_topics();
                let top = *ranked.first()?;
                let second = ranked.get(1).copied();
                let in_window =
                    video.primary_topic_percentile >= lo && video.primary_topic_percentile <= hi;
                let secondary_match = second.is_some_and(|s| secondary_set.contains(&s));
                (primary_set.contains(&top) && in_window && secondary_match).then(|| {
                    (
                        video.view_count,
                        PercentileHit {
                            video_id: video.video_id.clone(),
                            most_relevant_topic: top,
                            second_most_relevant_topic: second,
                        },
                    )
                })
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().map(|(_, hit)| hit).take(limit).collect())
    }

    async fn topic_description(&self, topic_id: TopicId) -> Result<String> {
        self.topic_descriptions
            .get(&topic_id)
            .map(|d| d.clone())
            .ok_or_else(|| RecommenderError::NotFound(format!("topic {topic_id}")))
    }
}

#[derive(Default)]
pub struct InMemoryFeedbackStore {
    entries: DashMap<UserIdKey, Vec<FeedbackEntry>>,
}

type UserIdKey = String;

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn append(&self, entries: &[FeedbackEntry]) -> Result<()> {
        for entry in entries {
            self.entries
                .entry(entry.user_id.clone())
                .or_default()
                .push(entry.clone());
        }
        Ok(())
    }

    async fn feedback_since(&self, user_id: &str, since: i64) -> Result<Vec<FeedbackEntry>> {
        let mut entries: Vec<FeedbackEntry> = self
            .entries
            .get(user_id)
            .map(|e| {
                e.iter()
                    .filter(|f| f.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by_key(|f| f.timestamp);
        Ok(entries)
    }

    async fn all_feedback(&self, user_id: &str) -> Result<Vec<FeedbackEntry>> {
        Ok(self
            .entries
            .get(user_id)
            .map(|e| e.clone())
            .unwrap_or_default())
    }
}

/// Profiles are stored as serialized documents so that save/load round-trips
/// exercise the same shape an external document store would see.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<UserIdKey, String>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load(&self, user_id: &str) -> Result<Option<UserProfile>> {
        match self.profiles.get(user_id) {
            Some(doc) => {
                let profile: UserProfile = serde_json::from_str(&doc)
                    .map_err(|e| RecommenderError::Upstream(format!("corrupt profile: {e}")))?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, profile: &UserProfile) -> Result<()> {
        let doc = serde_json::to_string(profile)
            .map_err(|e| RecommenderError::Upstream(format!("serialize profile: {e}")))?;
        self.profiles.insert(profile.user_id.clone(), doc);
        Ok(())
    }
}
