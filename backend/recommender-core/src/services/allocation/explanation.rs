//! Natural-language explanation templates for recommendation slots.
//!
//! The personalised wording is banded on the exploit coefficient; the
//! exploit and explore paths use mirrored phrasings of the same band.

use crate::models::ExploitCoefficient;
use crate::utils::format_count;

/// Explanation for a top-popular slot, referencing the view count.
pub fn top_popular(view_count: u64) -> String {
    format!(
        "Recommended to you because it was popular among other users ({} views).",
        format_count(view_count)
    )
}

/// Explanation for a personalised slot. `exploit_rec` tells whether the slot
/// came from the exploit lane (most-liked topic) or the explore lane.
pub fn personalised(
    topic_description: &str,
    exploit_rec: bool,
    coeff: ExploitCoefficient,
) -> String {
    let first_part = if exploit_rec {
        format!("Because you seem to like the topic '{topic_description}', and ")
    } else {
        format!("Because you haven't explored the topic '{topic_description}' much yet, and ")
    };

    let c = coeff.value();
    let second_part = if c >= 1.0 {
        "you want your personalised recommendations to exclusively focus on your most liked topics."
    } else if c >= 0.8 {
        if exploit_rec {
            "you want your personalised recommendations to heavily focus on your most liked topics."
        } else {
            "you want your personalised recommendations to minimally feature your unexplored topics."
        }
    } else if c >= 0.6 {
        if exploit_rec {
            "you want your personalised recommendations to rather focus on your most liked topics."
        } else {
            "you want your personalised recommendations to feature some of your unexplored topics."
        }
    } else if c == 0.5 {
        "you want your personalised recommendations to represent both your most liked and unexplored topics equally."
    } else if c >= 0.3 {
        if exploit_rec {
            "you want your personalised recommendations to feature some of your most liked topics."
        } else {
            "you want your personalised recommendations to rather focus on your unexplored topics."
        }
    } else if c > 0.0 {
        if exploit_rec {
            "you want your personalised recommendations to minimally feature your most liked topics."
        } else {
            "you want your personalised recommendations to heavily focus on your unexplored topics."
        }
    } else {
        "you want your personalised recommendations to exclusively focus on unexplored topics."
    };

    first_part + second_part
}
