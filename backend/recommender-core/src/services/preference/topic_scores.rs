//! Bidirectional transform between the full preference vector and its
//! compact top-10 summary.
//!
//! Compression subtracts the 11th-ranked value from the top-10 and
//! renormalizes the deltas; expansion rescales edited summary scores back
//! into the stored vector's value range and renormalizes the whole vector.
//! Compressing then expanding with no edits preserves the top-10 relative
//! ordering.

use crate::error::{RecommenderError, Result};
use crate::models::{ProcessedTopicScores, TopicId};

/// Number of summary entries when the catalog is large enough.
pub const SUMMARY_LEN: usize = 10;

/// Topic indices ordered by descending vector value.
pub fn ranked_indices(vector: &[f64]) -> Vec<TopicId> {
    let mut indices: Vec<TopicId> = (0..vector.len()).collect();
    indices.sort_by(|&a, &b| {
        vector[b]
            .partial_cmp(&vector[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices
}

/// Divides the vector by its sum in place. A zero-sum vector is an
/// `InvalidState`: every affinity has been driven to zero and there is no
/// distribution left to renormalize.
pub fn renormalize(vector: &mut [f64]) -> Result<()> {
    let sum: f64 = vector.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return Err(RecommenderError::InvalidState(
            "preference vector sums to zero at renormalization".to_string(),
        ));
    }
    for value in vector.iter_mut() {
        *value /= sum;
    }
    Ok(())
}

/// Compresses a preference vector into its top-K summary.
///
/// `drop_zero_scores` is set only on the registration path: the seeded
/// vector's summary drops entries whose delta over the cutoff is zero, while
/// the feedback-cycle recompute keeps them.
pub fn compress(vector: &[f64], drop_zero_scores: bool) -> Result<ProcessedTopicScores> {
    if vector.len() < 2 {
        return Err(RecommenderError::InsufficientData(format!(
            "{} topics cannot be summarized",
            vector.len()
        )));
    }

    let ranked = ranked_indices(vector);
    let k = SUMMARY_LEN.min(vector.len() - 1);
    let cutoff = vector[ranked[k]];

    let deltas: Vec<(TopicId, f64)> = ranked[..k]
        .iter()
        .map(|&topic| (topic, vector[topic] - cutoff))
        .collect();

    let total: f64 = deltas.iter().map(|(_, d)| d).sum();
    if total <= 0.0 {
        return Err(RecommenderError::InvalidState(
            "top topic scores are all tied; summary has zero mass".to_string(),
        ));
    }

    let pairs: Vec<(TopicId, f64)> = deltas
        .into_iter()
        .map(|(topic, delta)| (topic, delta / total))
        .filter(|(_, score)| !drop_zero_scores || *score != 0.0)
        .collect();

    Ok(ProcessedTopicScores::from_pairs(pairs))
}

/// Expands an edited summary back into a full preference vector.
///
/// The edited summary must carry exactly the key set of `current`, the
/// summary previously derived from `stored`; the edited scores must sum to 1.
/// Non-summary indices are copied from `stored` unchanged and the result is
/// renormalized.
pub fn expand(
    stored: &[f64],
    current: &ProcessedTopicScores,
    edited: &ProcessedTopicScores,
) -> Result<Vec<f64>> {
    if edited.topic_set() != current.topic_set() {
        return Err(RecommenderError::InvalidState(
            "edited summary keys do not match the stored summary".to_string(),
        ));
    }
    let total = edited.total();
    if (total - 1.0).abs() > 1e-6 {
        return Err(RecommenderError::InvalidInput(format!(
            "edited summary scores sum to {total}, expected 1"
        )));
    }
    if let Some(bad) = edited.topics().find(|&t| t >= stored.len()) {
        return Err(RecommenderError::InvalidState(format!(
            "summary topic {bad} is outside the stored vector"
        )));
    }

    let stored_top: Vec<f64> = edited.topics().map(|t| stored[t]).collect();
    let cutoff = stored_top.iter().copied().fold(f64::INFINITY, f64::min);
    let scaling_factor: f64 = stored_top.iter().sum::<f64>() - cutoff;

    let mut updated = stored.to_vec();
    for entry in edited.entries() {
        updated[entry.topic] = entry.score * scaling_factor + cutoff;
    }
    renormalize(&mut updated)?;
    Ok(updated)
}
