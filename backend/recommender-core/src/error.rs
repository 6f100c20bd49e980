use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommenderError>;

/// Error kinds surfaced by the recommendation core.
///
/// Updater and allocator operations are all-or-nothing per call: an error
/// aborts the whole feedback cycle or recommendation request without partial
/// persistence. The one exception is a per-entry upstream failure inside a
/// feedback batch: the entry is skipped and reported as a warning in the
/// returned [`crate::models::FeedbackAck`].
#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl RecommenderError {
    /// Stable machine-readable tag, used in logs and degraded API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            RecommenderError::NotFound(_) => "not_found",
            RecommenderError::InvalidInput(_) => "invalid_input",
            RecommenderError::InvalidState(_) => "invalid_state",
            RecommenderError::Upstream(_) => "upstream_failure",
            RecommenderError::InsufficientData(_) => "insufficient_data",
        }
    }
}
