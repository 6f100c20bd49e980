//! End-to-end flows over the in-memory collaborator implementations:
//! registration, feedback cycles, allocation, exclusions and the edited
//! summary path.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use recommender_core::models::{
    RecommendationModel, TopicId, REASON_DISLIKE_CREATOR, REASON_TOO_MUCH_SIMILAR_CONTENT,
};
use recommender_core::repository::memory::{
    CatalogVideo, InMemoryCatalog, InMemoryFeedbackStore, InMemoryProfileStore,
};
use recommender_core::repository::{FeedbackStore, ProfileStore, VideoCatalog};
use recommender_core::{
    Config, FeedbackEntry, RecommendationBudgets, RecommenderEngine,
};

const NUM_TOPICS: usize = 30;
const FILTERED_TOPIC: TopicId = 3;

struct Fixture {
    engine: RecommenderEngine<InMemoryCatalog, InMemoryFeedbackStore, InMemoryProfileStore>,
    catalog: Arc<InMemoryCatalog>,
    feedback: Arc<InMemoryFeedbackStore>,
    profiles: Arc<InMemoryProfileStore>,
}

/// Two videos per topic: the `a` video is the popular one, the `b` video
/// sits in the 80-100 popularity percentile of its topic. Distributions
/// peak on `(t, t+1, t+2)` so every video has a deterministic top-3.
fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let catalog = Arc::new(InMemoryCatalog::new());
    for topic in 0..NUM_TOPICS {
        let mut dist = vec![0.0; NUM_TOPICS];
        dist[topic] = 0.7;
        dist[(topic + 1) % NUM_TOPICS] = 0.2;
        dist[(topic + 2) % NUM_TOPICS] = 0.1;

        catalog.insert_video(CatalogVideo {
            video_id: format!("vid-{topic}-a"),
            creator_id: format!("creator-{topic}"),
            topic_distribution: dist.clone(),
            duration: "PT10M".to_string(),
            view_count: 10_000 + topic as u64 * 10,
            primary_topic_percentile: 10.0,
        });
        catalog.insert_video(CatalogVideo {
            video_id: format!("vid-{topic}-b"),
            creator_id: format!("creator-{topic}"),
            topic_distribution: dist,
            duration: "PT10M".to_string(),
            view_count: 100 + topic as u64,
            primary_topic_percentile: 90.0,
        });
        catalog.insert_topic_description(topic, format!("topic {topic}"));
    }

    let feedback = Arc::new(InMemoryFeedbackStore::new());
    let profiles = Arc::new(InMemoryProfileStore::new());

    let mut config = Config::default();
    config.catalog.num_topics = NUM_TOPICS;
    config.catalog.filtered_topics = vec![FILTERED_TOPIC];

    let engine = RecommenderEngine::new(
        Arc::clone(&catalog),
        Arc::clone(&feedback),
        Arc::clone(&profiles),
        config,
    );

    Fixture {
        engine,
        catalog,
        feedback,
        profiles,
    }
}

fn entry(user: &str, video: &str, timestamp: i64) -> FeedbackEntry {
    FeedbackEntry {
        user_id: user.to_string(),
        video_id: video.to_string(),
        rating: 0,
        more: BTreeSet::new(),
        less: BTreeSet::new(),
        total_watch_time: 0.0,
        dislike_reasons: BTreeSet::new(),
        timestamp,
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::test]
async fn test_feedback_cycle_updates_whole_profile() {
    let fx = fixture();
    fx.engine.register_user("alice", &[12, 15]).await.unwrap();

    let ts = now() + 100;
    let mut rated = entry("alice", "vid-12-a", ts);
    rated.rating = 5;
    let mut watched = entry("alice", "vid-16-a", ts + 1);
    watched.total_watch_time = 480.0; // 0.8 of PT10M
    let mut opinionated = entry("alice", "vid-18-a", ts + 2);
    opinionated.more.insert(18);
    opinionated.less.insert(19);
    let mut creator_hater = entry("alice", "vid-20-a", ts + 3);
    creator_hater
        .dislike_reasons
        .insert(REASON_DISLIKE_CREATOR.to_string());

    let ack = fx
        .engine
        .process_feedback("alice", &[rated, watched, opinionated, creator_hater])
        .await
        .unwrap();
    assert_eq!(ack.processed, 4);
    assert_eq!(ack.skipped, 0);
    assert!(ack.warnings.is_empty());

    let profile = fx.profiles.load("alice").await.unwrap().unwrap();

    // Vector invariant
    let sum: f64 = profile.preference_vector.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
    assert!(profile.preference_vector.iter().all(|v| *v >= 0.0));

    // Summary invariant: 10 entries summing to 1
    assert_eq!(profile.processed_topic_scores.len(), 10);
    assert!((profile.processed_topic_scores.total() - 1.0).abs() < 1e-6);

    // Category partition: disjoint, and with the filtered topic the union
    // covers the catalog
    let most: HashSet<TopicId> = profile.topic_categories.most_liked.iter().copied().collect();
    let rated_set: HashSet<TopicId> = profile
        .topic_categories
        .rated_but_not_most_liked
        .iter()
        .copied()
        .collect();
    let unrated: HashSet<TopicId> = profile.topic_categories.unrated.iter().copied().collect();
    assert!(most.is_disjoint(&rated_set));
    assert!(most.is_disjoint(&unrated));
    assert!(rated_set.is_disjoint(&unrated));
    let mut union = HashSet::new();
    union.extend(&most);
    union.extend(&rated_set);
    union.extend(&unrated);
    union.insert(FILTERED_TOPIC);
    assert_eq!(union.len(), NUM_TOPICS);
    assert!(!most.contains(&FILTERED_TOPIC));
    assert!(!unrated.contains(&FILTERED_TOPIC));

    // Creator dislike expanded to the whole catalog of creator-20
    assert!(profile.disliked_creators.contains("creator-20"));
    assert!(profile.disliked_creator_video_ids.contains("vid-20-a"));
    assert!(profile.disliked_creator_video_ids.contains("vid-20-b"));
    let creator_videos = fx.catalog.videos_by_creator("creator-20").await.unwrap();
    for id in &creator_videos {
        assert!(profile.disliked_creator_video_ids.contains(id));
    }

    // The high-water mark advanced to the batch maximum
    assert_eq!(profile.feedback_last_used, ts + 3);
}

#[tokio::test]
async fn test_recommendations_exclude_watched_and_disliked() {
    let fx = fixture();
    fx.engine.register_user("alice", &[12, 15]).await.unwrap();

    let ts = now() + 100;
    let mut rated = entry("alice", "vid-12-a", ts);
    rated.rating = 5;
    let mut creator_hater = entry("alice", "vid-20-a", ts + 1);
    creator_hater
        .dislike_reasons
        .insert(REASON_DISLIKE_CREATOR.to_string());
    fx.engine
        .process_feedback("alice", &[rated, creator_hater])
        .await
        .unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..5 {
        let recs = fx
            .engine
            .recommendations_with_rng("alice", None, &mut rng)
            .await
            .unwrap();
        for rec in &recs {
            assert_ne!(rec.video_id, "vid-12-a", "watched video resurfaced");
            assert!(
                !rec.video_id.starts_with("vid-20-"),
                "disliked creator video {} resurfaced",
                rec.video_id
            );
            assert!(
                !rec.video_id.starts_with(&format!("vid-{FILTERED_TOPIC}-")),
                "filtered-topic video {} surfaced in the top-popular lane",
                rec.video_id
            );
        }
    }
}

#[tokio::test]
async fn test_decayed_coefficient_drops_personalised_lanes() {
    let fx = fixture();
    fx.engine.register_user("frank", &[5]).await.unwrap();

    // Five "Too much similar content" dislikes: 0.5 -> 0.0
    let ts = now() + 100;
    let batch: Vec<FeedbackEntry> = (0..5)
        .map(|i| {
            let mut fb = entry("frank", &format!("vid-{i}-a"), ts + i as i64);
            fb.dislike_reasons
                .insert(REASON_TOO_MUCH_SIMILAR_CONTENT.to_string());
            fb
        })
        .collect();
    fx.engine.process_feedback("frank", &batch).await.unwrap();

    let profile = fx.profiles.load("frank").await.unwrap().unwrap();
    assert_eq!(profile.exploit_coeff.value(), 0.0);

    // n_exploit == 0: only the top-popular lane survives
    let mut rng = StdRng::seed_from_u64(13);
    let recs = fx
        .engine
        .recommendations_with_rng(
            "frank",
            Some(RecommendationBudgets {
                personalised: 6,
                unpersonalised: 4,
            }),
            &mut rng,
        )
        .await
        .unwrap();
    assert!(!recs.is_empty());
    assert!(recs
        .iter()
        .all(|r| r.model == RecommendationModel::TopPopular));
}

#[tokio::test]
async fn test_top_popular_rotation_covers_catalog() {
    let fx = fixture();
    fx.engine.register_user("gina", &[7]).await.unwrap();

    let mut rng = StdRng::seed_from_u64(17);
    let budgets = Some(RecommendationBudgets {
        personalised: 0,
        unpersonalised: 10,
    });

    let mut surfaced: HashSet<TopicId> = HashSet::new();
    for _ in 0..3 {
        fx.engine
            .recommendations_with_rng("gina", budgets, &mut rng)
            .await
            .unwrap();
        let profile = fx.profiles.load("gina").await.unwrap().unwrap();
        surfaced.extend(profile.recommended_topics_cycle.iter().copied());
    }

    // 29 usable topics drained in batches of 10, 10 and 9
    let profile = fx.profiles.load("gina").await.unwrap().unwrap();
    assert_eq!(profile.recommended_topics_cycle.len(), NUM_TOPICS - 1);
    assert!(!surfaced.contains(&FILTERED_TOPIC));

    // The next request resets the rotation and starts a fresh cycle
    fx.engine
        .recommendations_with_rng("gina", budgets, &mut rng)
        .await
        .unwrap();
    let profile = fx.profiles.load("gina").await.unwrap().unwrap();
    assert_eq!(profile.recommended_topics_cycle.len(), 10);
}

#[tokio::test]
async fn test_pending_feedback_uses_high_water_mark() {
    let fx = fixture();
    fx.engine.register_user("hana", &[9, 11]).await.unwrap();

    let ts = now() + 100;
    let mut fb = entry("hana", "vid-9-a", ts);
    fb.rating = 4;
    fx.feedback.append(&[fb]).await.unwrap();

    let ack = fx.engine.process_pending_feedback("hana").await.unwrap();
    assert_eq!(ack.processed, 1);

    let profile = fx.profiles.load("hana").await.unwrap().unwrap();
    assert_eq!(profile.feedback_last_used, ts);

    // Nothing new: the second pull is a no-op
    let ack = fx.engine.process_pending_feedback("hana").await.unwrap();
    assert_eq!(ack.processed, 0);
    assert_eq!(ack.skipped, 0);
}

#[tokio::test]
async fn test_upstream_gap_skips_entry_with_warning() {
    let fx = fixture();
    fx.engine.register_user("ivan", &[4]).await.unwrap();

    let ts = now() + 100;
    let mut known = entry("ivan", "vid-4-a", ts);
    known.rating = 5;
    let mut unknown = entry("ivan", "vid-unknown", ts + 1);
    unknown.rating = 5;

    let ack = fx
        .engine
        .process_feedback("ivan", &[known, unknown])
        .await
        .unwrap();
    assert_eq!(ack.processed, 1);
    assert_eq!(ack.skipped, 1);
    assert_eq!(ack.warnings.len(), 1);
    assert!(ack.warnings[0].contains("vid-unknown"));

    // The cycle still completed and persisted a normalized vector
    let profile = fx.profiles.load("ivan").await.unwrap().unwrap();
    let sum: f64 = profile.preference_vector.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_classic_lane_explores_at_balanced_coefficient() {
    let fx = fixture();
    fx.engine.register_user("alice", &[12, 15]).await.unwrap();

    // coeff 0.5 is not exploitative: primary topics come from the unrated
    // ratings pool, the window derives from the complement
    let recs = fx.engine.classic_recommendations("alice", 5).await.unwrap();
    assert!(!recs.is_empty());
    for rec in &recs {
        assert_eq!(rec.model, RecommendationModel::ClassicPersonalised);
        assert!(rec
            .explanation
            .starts_with("Recommended to you because you have not come across videos of topic"));
        // The secondary topic is one of the liked ones
        assert!(
            rec.explanation.contains("'topic 12'") || rec.explanation.contains("'topic 15'"),
            "unexpected explanation: {}",
            rec.explanation
        );
    }
}

#[tokio::test]
async fn test_edited_summary_survives_next_cycle() {
    let fx = fixture();
    fx.engine.register_user("june", &[21, 24]).await.unwrap();

    let profile = fx.profiles.load("june").await.unwrap().unwrap();
    let edited = recommender_core::ProcessedTopicScores::from_pairs(
        profile
            .processed_topic_scores
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| (e.topic, if i == 0 { 0.9 } else { 0.1 }))
            .collect(),
    );
    fx.engine.update_edited_summary("june", edited).await.unwrap();

    let profile = fx.profiles.load("june").await.unwrap().unwrap();
    let sum: f64 = profile.preference_vector.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);

    // A later cycle recomputes the summary from the edited vector without
    // violating any invariant
    let ts = now() + 100;
    let mut fb = entry("june", "vid-21-a", ts);
    fb.rating = 4;
    fx.engine.process_feedback("june", &[fb]).await.unwrap();

    let profile = fx.profiles.load("june").await.unwrap().unwrap();
    assert_eq!(profile.processed_topic_scores.len(), 10);
    assert!((profile.processed_topic_scores.total() - 1.0).abs() < 1e-6);
}
