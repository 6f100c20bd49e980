//! Topic sampling primitives for the allocator lanes.

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::collections::HashSet;

use crate::error::{RecommenderError, Result};
use crate::models::{ProcessedTopicScores, TopicId};

/// Weighted sample with replacement from `most_liked`, using the compact
/// summary's scores as probabilities.
///
/// The draw is keyed: every most-liked topic must be present in the summary
/// and the selected weights must sum to ~1, otherwise the exploit
/// distribution is invalid and the request fails.
pub fn sample_exploit_topics<R: Rng>(
    most_liked: &[TopicId],
    summary: &ProcessedTopicScores,
    n: usize,
    rng: &mut R,
) -> Result<Vec<TopicId>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    if most_liked.is_empty() {
        return Err(RecommenderError::InvalidState(
            "invalid exploit distribution: no most-liked topics".to_string(),
        ));
    }

    let mut weights = Vec::with_capacity(most_liked.len());
    for &topic in most_liked {
        let score = summary.score_of(topic).ok_or_else(|| {
            RecommenderError::InvalidState(format!(
                "invalid exploit distribution: topic {topic} missing from the summary"
            ))
        })?;
        weights.push(score);
    }

    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(RecommenderError::InvalidState(format!(
            "invalid exploit distribution: weights sum to {total}"
        )));
    }

    let index = WeightedIndex::new(&weights).map_err(|e| {
        RecommenderError::InvalidState(format!("invalid exploit distribution: {e}"))
    })?;

    Ok((0..n).map(|_| most_liked[index.sample(rng)]).collect())
}

/// Splits `n_explore` as evenly as possible between the two explore pools,
/// the extra unit going to `rated_but_not_most_liked` (the pool drawn
/// second). Draws are without replacement; when one pool runs short the
/// shortfall comes from the other pool's unused topics. Two empty pools
/// yield an empty sample.
pub fn sample_explore_topics<R: Rng>(
    n_explore: usize,
    unrated: &[TopicId],
    rated_but_not_most_liked: &[TopicId],
    rng: &mut R,
) -> Vec<TopicId> {
    if n_explore == 0 {
        return Vec::new();
    }

    let n_each = n_explore / 2;
    let extra = n_explore % 2;

    let mut sampled: Vec<TopicId> = Vec::with_capacity(n_explore);
    sampled.extend(unrated.choose_multiple(rng, n_each).copied());
    sampled.extend(
        rated_but_not_most_liked
            .choose_multiple(rng, n_each + extra)
            .copied(),
    );

    if sampled.len() < n_explore {
        let drawn: HashSet<TopicId> = sampled.iter().copied().collect();
        let leftovers: Vec<TopicId> = unrated
            .iter()
            .chain(rated_but_not_most_liked)
            .copied()
            .filter(|t| !drawn.contains(t))
            .collect();
        let shortfall = n_explore - sampled.len();
        sampled.extend(leftovers.choose_multiple(rng, shortfall).copied());
    }

    sampled
}

/// Uniform without-replacement draw for the top-popular lane.
pub fn sample_uniform_topics<R: Rng>(
    available: &[TopicId],
    n: usize,
    rng: &mut R,
) -> Vec<TopicId> {
    available.choose_multiple(rng, n.min(available.len())).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn summary_for(topics: &[TopicId]) -> ProcessedTopicScores {
        let share = 1.0 / topics.len() as f64;
        ProcessedTopicScores::from_pairs(topics.iter().map(|&t| (t, share)).collect())
    }

    #[test]
    fn test_exploit_draws_only_most_liked() {
        let most_liked = vec![3, 8, 12];
        let summary = summary_for(&most_liked);
        let sampled = sample_exploit_topics(&most_liked, &summary, 50, &mut rng()).unwrap();
        assert_eq!(sampled.len(), 50);
        assert!(sampled.iter().all(|t| most_liked.contains(t)));
    }

    #[test]
    fn test_exploit_respects_weights() {
        let most_liked = vec![1, 2];
        let summary = ProcessedTopicScores::from_pairs(vec![(1, 0.95), (2, 0.05)]);
        let sampled = sample_exploit_topics(&most_liked, &summary, 200, &mut rng()).unwrap();
        let ones = sampled.iter().filter(|&&t| t == 1).count();
        assert!(ones > 150, "expected topic 1 to dominate, got {ones}/200");
    }

    #[test]
    fn test_exploit_rejects_missing_key() {
        let summary = summary_for(&[1, 2]);
        let result = sample_exploit_topics(&[1, 2, 3], &summary, 5, &mut rng());
        assert!(matches!(result, Err(RecommenderError::InvalidState(_))));
    }

    #[test]
    fn test_exploit_rejects_partial_weight_mass() {
        // A filtered topic knocked out of most_liked leaves the summary's
        // mass incomplete
        let summary = ProcessedTopicScores::from_pairs(vec![(1, 0.5), (2, 0.3), (3, 0.2)]);
        let result = sample_exploit_topics(&[1, 2], &summary, 5, &mut rng());
        assert!(matches!(result, Err(RecommenderError::InvalidState(_))));
    }

    #[test]
    fn test_exploit_zero_budget_is_empty() {
        let summary = summary_for(&[1]);
        assert!(sample_exploit_topics(&[1], &summary, 0, &mut rng())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_explore_even_split_with_extra_to_rated() {
        let unrated: Vec<TopicId> = (0..50).collect();
        let rated: Vec<TopicId> = (50..100).collect();
        let sampled = sample_explore_topics(5, &unrated, &rated, &mut rng());

        assert_eq!(sampled.len(), 5);
        let from_unrated = sampled.iter().filter(|&&t| t < 50).count();
        let from_rated = sampled.len() - from_unrated;
        assert_eq!(from_unrated, 2);
        assert_eq!(from_rated, 3);
    }

    #[test]
    fn test_explore_backfills_from_other_pool() {
        let unrated: Vec<TopicId> = vec![0];
        let rated: Vec<TopicId> = (10..30).collect();
        let sampled = sample_explore_topics(6, &unrated, &rated, &mut rng());

        assert_eq!(sampled.len(), 6);
        // No duplicates: backfill draws from unused topics only
        let unique: HashSet<TopicId> = sampled.iter().copied().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_explore_both_pools_empty() {
        assert!(sample_explore_topics(4, &[], &[], &mut rng()).is_empty());
    }

    #[test]
    fn test_uniform_sampling_without_replacement() {
        let available: Vec<TopicId> = (0..20).collect();
        let sampled = sample_uniform_topics(&available, 8, &mut rng());
        assert_eq!(sampled.len(), 8);
        let unique: HashSet<TopicId> = sampled.iter().copied().collect();
        assert_eq!(unique.len(), 8);

        // Asking for more than available caps at the pool size
        assert_eq!(sample_uniform_topics(&available, 50, &mut rng()).len(), 20);
    }
}
