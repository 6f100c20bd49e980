//! External collaborator boundaries.
//!
//! The core never talks to a concrete store: the video/topic catalog, the
//! feedback log and the profile document store are all behind async traits,
//! and every call is awaited sequentially within a request. Implement these
//! traits to integrate with your search/storage infrastructure; the
//! [`memory`] module ships DashMap-backed implementations used by the tests
//! and usable as an embedded backend.

pub mod memory;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::{
    CreatorId, FeedbackEntry, PercentileHit, TopicId, UserProfile, VideoHit, VideoId,
};

/// Read-only access to video topic distributions, topic descriptions and
/// topic-based video search.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Topic distributions for a set of videos. Videos unknown to the
    /// catalog are absent from the result map.
    async fn topic_distributions_bulk(
        &self,
        video_ids: &[VideoId],
    ) -> Result<HashMap<VideoId, Vec<f64>>>;

    /// Top-3 most relevant topics per video.
    async fn video_top_topics_bulk(
        &self,
        video_ids: &[VideoId],
    ) -> Result<HashMap<VideoId, Vec<TopicId>>>;

    /// ISO 8601 duration strings as stored by the upstream ingest.
    async fn video_durations_bulk(
        &self,
        video_ids: &[VideoId],
    ) -> Result<HashMap<VideoId, String>>;

    async fn creator_of(&self, video_id: &str) -> Result<CreatorId>;

    async fn videos_by_creator(&self, creator_id: &str) -> Result<Vec<VideoId>>;

    /// Videos whose most relevant topic is in `topics`, excluding
    /// `exclude`, sorted by view count descending.
    async fn search_by_topics(
        &self,
        topics: &[TopicId],
        exclude: &HashSet<VideoId>,
        limit: usize,
    ) -> Result<Vec<VideoHit>>;

    /// Videos whose primary topic is in `primary` within the given
    /// popularity-percentile window and whose secondary topic is in
    /// `secondary`, excluding `exclude`.
    async fn search_by_topic_percentile(
        &self,
        primary: &[TopicId],
        secondary: &[TopicId],
        window: (u8, u8),
        exclude: &HashSet<VideoId>,
        limit: usize,
    ) -> Result<Vec<PercentileHit>>;

    async fn topic_description(&self, topic_id: TopicId) -> Result<String>;
}

/// Append/read access to the per-user feedback log.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn append(&self, entries: &[FeedbackEntry]) -> Result<()>;

    /// Entries with `timestamp > since`, oldest first.
    async fn feedback_since(&self, user_id: &str, since: i64) -> Result<Vec<FeedbackEntry>>;

    async fn all_feedback(&self, user_id: &str) -> Result<Vec<FeedbackEntry>>;
}

/// Atomic read/replace of the per-user profile aggregate.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn save(&self, profile: &UserProfile) -> Result<()>;
}
