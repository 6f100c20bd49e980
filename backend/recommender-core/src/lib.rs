//! Decision core of a topic-affinity video recommender.
//!
//! Maintains a per-user preference vector over the topic catalog, folds
//! behavioral and explicit feedback into it incrementally, keeps a compact
//! editable top-10 summary consistent with the full vector, and allocates
//! recommendation slots between exploit (known preferences) and explore
//! (under-sampled topics) strategies.
//!
//! The HTTP layer, the document stores and the offline topic-modeling
//! pipeline are external collaborators behind the [`repository`] traits.

pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{RecommenderError, Result};
pub use models::{
    ExploitCoefficient, FeedbackAck, FeedbackEntry, ProcessedTopicScores, Recommendation,
    RecommendationBudgets, RecommendationModel, TopicCategories, TopicId, TopicRatings,
    UserProfile,
};
pub use repository::{FeedbackStore, ProfileStore, VideoCatalog};
pub use services::RecommenderEngine;
