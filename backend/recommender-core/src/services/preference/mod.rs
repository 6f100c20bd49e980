//! Preference state management: the online vector updater and the
//! compact-summary transform.

pub mod topic_scores;
pub mod updater;

pub use topic_scores::{compress, expand, ranked_indices, renormalize, SUMMARY_LEN};
pub use updater::{BatchOutcome, PreferenceUpdater, ProcessedEntry};
