pub mod allocation;
pub mod categorizer;
pub mod classic;
pub mod engine;
pub mod preference;

pub use allocation::Allocator;
pub use categorizer::TopicCategorizer;
pub use classic::ClassicRecommender;
pub use engine::RecommenderEngine;
pub use preference::PreferenceUpdater;
