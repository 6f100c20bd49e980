use serde::Deserialize;
use std::collections::HashSet;
use std::env;

use crate::models::TopicId;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub recommendation: RecommendationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Total number of topics produced by the offline topic-modeling run.
    pub num_topics: usize,
    /// Topics permanently excluded from every user-facing pool.
    pub filtered_topics: Vec<TopicId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationConfig {
    /// Default per-user personalised slot budget.
    pub default_personalised_budget: usize,
    /// Default per-user unpersonalised (top-popular) slot budget.
    pub default_unpersonalised_budget: usize,
    /// Exploit coefficient assigned at registration.
    pub initial_exploit_coeff: f64,
}

impl CatalogConfig {
    pub fn filtered_topic_set(&self) -> HashSet<TopicId> {
        self.filtered_topics.iter().copied().collect()
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Config {
            catalog: CatalogConfig {
                num_topics: env::var("NUM_TOPICS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .expect("NUM_TOPICS must be a valid usize"),
                filtered_topics: env::var("FILTERED_TOPICS")
                    .unwrap_or_default()
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| {
                        s.trim()
                            .parse()
                            .expect("FILTERED_TOPICS must be a comma-separated list of topic ids")
                    })
                    .collect(),
            },
            recommendation: RecommendationConfig {
                default_personalised_budget: env::var("DEFAULT_PERSONALISED_BUDGET")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("DEFAULT_PERSONALISED_BUDGET must be a valid usize"),
                default_unpersonalised_budget: env::var("DEFAULT_UNPERSONALISED_BUDGET")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("DEFAULT_UNPERSONALISED_BUDGET must be a valid usize"),
                initial_exploit_coeff: env::var("INITIAL_EXPLOIT_COEFF")
                    .unwrap_or_else(|_| "0.5".to_string())
                    .parse()
                    .expect("INITIAL_EXPLOIT_COEFF must be a valid f64"),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            catalog: CatalogConfig {
                num_topics: 300,
                filtered_topics: Vec::new(),
            },
            recommendation: RecommendationConfig {
                default_personalised_budget: 5,
                default_unpersonalised_budget: 5,
                initial_exploit_coeff: 0.5,
            },
        }
    }
}
