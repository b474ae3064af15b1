//! Integration tests for the ranking pipeline over the in-memory store.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use driftline_recs::codec;
use driftline_recs::config::{RecsConfig, GAMMA};
use driftline_recs::rank::Ranker;
use driftline_recs::store::memory::InMemoryRecsStore;
use driftline_recs::store::RecsStore;
use driftline_recs::types::{
    AiPostSummary, Page, Post, PostId, RecommendationQuery, SortOrder, UserId,
};

const DIM: usize = 4;

fn test_config() -> RecsConfig {
    RecsConfig {
        feature_dim: DIM,
        ..RecsConfig::default()
    }
}

fn quantize(v: &[f32]) -> Vec<i8> {
    codec::encode(v, DIM, 1.0, GAMMA).unwrap()
}

fn post(id: u64, owner: u64) -> Post {
    Post {
        id: PostId(id),
        owner: UserId(owner),
        parent: None,
        likes: 0,
    }
}

async fn add_vector(store: &InMemoryRecsStore, id: u64, v: &[f32]) {
    store
        .upsert_summary(AiPostSummary {
            post: PostId(id),
            summary: None,
            features: Some(quantize(v)),
            tags: vec![],
            keyword_hashes: vec![],
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        })
        .await
        .unwrap();
}

fn tag_query(tags: &[&str]) -> RecommendationQuery {
    RecommendationQuery::for_tags(tags.iter().map(|t| (t.to_string(), 1)).collect())
}

#[tokio::test]
async fn empty_tag_set_is_an_empty_result() {
    let store = Arc::new(InMemoryRecsStore::new());
    store.add_post(post(1, 1));
    store.add_tag(PostId(1), "tech", 1);
    let ranker = Ranker::new(store, test_config());

    let result = ranker
        .recommend_posts(&RecommendationQuery::for_tags(vec![]))
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn malformed_tag_entries_are_skipped_not_fatal() {
    let store = Arc::new(InMemoryRecsStore::new());
    store.add_post(post(1, 1));
    store.add_tag(PostId(1), "tech", 1);
    let ranker = Ranker::new(store, test_config());

    let query = RecommendationQuery::for_tags(vec![
        ("".into(), 1),
        ("tech".into(), 0),
        ("tech".into(), 1),
    ]);
    let result = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(result, vec![PostId(1)]);
}

#[tokio::test]
async fn self_authored_candidates_are_excluded_when_self_supplied() {
    let store = Arc::new(InMemoryRecsStore::new());
    store.add_post(post(1, 2));
    store.add_post(post(2, 1));
    store.add_tag(PostId(1), "tech", 1);
    store.add_tag(PostId(2), "tech", 1);
    let ranker = Ranker::new(store, test_config());

    let mut query = tag_query(&["tech"]);
    query.self_user = Some(UserId(1));
    let result = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(result, vec![PostId(1)]);

    query.self_user = None;
    let result = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.contains(&PostId(2)));
}

#[tokio::test]
async fn tag_only_order_falls_back_to_id_descending() {
    let store = Arc::new(InMemoryRecsStore::new());
    for id in [5u64, 9, 2] {
        store.add_post(post(id, 2));
        store.add_tag(PostId(id), "tech", 1);
    }
    let ranker = Ranker::new(store, test_config());

    let result = ranker.recommend_posts(&tag_query(&["tech"])).await.unwrap();
    assert_eq!(result, vec![PostId(9), PostId(5), PostId(2)]);
}

#[tokio::test]
async fn vector_refine_orders_by_contrast_score() {
    let store = Arc::new(InMemoryRecsStore::new());
    // Ids deliberately reversed relative to similarity so the vector
    // stage must reorder.
    let vectors: [(u64, &[f32]); 3] = [
        (1, &[1.0, 0.0, 0.0, 0.0]),
        (2, &[0.7, 0.7, 0.0, 0.0]),
        (3, &[0.0, 1.0, 0.0, 0.0]),
    ];
    for (id, v) in vectors {
        store.add_post(post(id, 2));
        store.add_tag(PostId(id), "tech", 1);
        add_vector(&store, id, v).await;
    }
    let ranker = Ranker::new(store.clone(), test_config());

    let mut query = tag_query(&["tech"]);
    query.features = Some(vec![1.0, 0.0, 0.0, 0.0]);
    let result = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(result, vec![PostId(1), PostId(2), PostId(3)]);

    // Recompute independently from the stored vectors: descending
    // contrast-stretched cosine must match the returned order.
    let cfg = test_config();
    let mut expected: Vec<(PostId, f64)> = Vec::new();
    for id in [1u64, 2, 3] {
        let stored = store.summaries(&[PostId(id)]).await.unwrap();
        let decoded = codec::decode(stored[0].features.as_deref().unwrap(), GAMMA).unwrap();
        let unit = driftline_recs::vecmath::normalize_l2(&decoded);
        let cos =
            driftline_recs::vecmath::cosine_similarity(&[1.0, 0.0, 0.0, 0.0], &unit).unwrap();
        let score = driftline_recs::vecmath::sigmoidal_contrast(
            (cos as f64).clamp(0.0, 1.0),
            cfg.contrast_gain,
            cfg.contrast_mid,
        );
        expected.push((PostId(id), score));
    }
    expected.sort_by(|a, b| b.1.total_cmp(&a.1));
    let expected_ids: Vec<PostId> = expected.into_iter().map(|(id, _)| id).collect();
    assert_eq!(result, expected_ids);
}

#[tokio::test]
async fn candidates_missing_vectors_sink_but_are_not_removed() {
    let store = Arc::new(InMemoryRecsStore::new());
    store.add_post(post(1, 2));
    store.add_post(post(2, 2));
    store.add_tag(PostId(1), "tech", 1);
    store.add_tag(PostId(2), "tech", 1);
    add_vector(&store, 1, &[1.0, 0.0, 0.0, 0.0]).await;
    // Post 2 has no summary at all.
    let ranker = Ranker::new(store, test_config());

    let mut query = tag_query(&["tech"]);
    query.features = Some(vec![1.0, 0.0, 0.0, 0.0]);
    let result = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(result, vec![PostId(1), PostId(2)]);
}

#[tokio::test]
async fn pagination_slices_the_full_ascending_order() {
    let store = Arc::new(InMemoryRecsStore::new());
    for id in 1u64..=6 {
        store.add_post(post(id, 2));
        store.add_tag(PostId(id), "tech", 1);
    }
    let ranker = Ranker::new(store, test_config());

    let mut query = tag_query(&["tech"]);
    query.page = Page {
        offset: 0,
        limit: 100,
        order: SortOrder::Asc,
    };
    let full = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(full.len(), 6);

    query.page = Page {
        offset: 1,
        limit: 3,
        order: SortOrder::Asc,
    };
    let slice = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(slice, full[1..4].to_vec());
}

#[tokio::test]
async fn tech_post_outranks_unrelated_eco_post() {
    let store = Arc::new(InMemoryRecsStore::new());
    let a = PostId(1);
    let b = PostId(2);
    store.add_post(post(1, 2));
    store.add_post(post(2, 3));
    store.add_tag(a, "tech", 1);
    store.add_tag(b, "eco", 1);
    add_vector(&store, 1, &[10.0, 0.0, 0.0, 0.0]).await;
    add_vector(&store, 2, &[0.0, 10.0, 0.0, 0.0]).await;
    let ranker = Ranker::new(store, test_config());

    let mut query = tag_query(&["tech"]);
    query.features = Some(vec![10.0, 0.0, 0.0, 0.0]);
    let result = ranker.recommend_posts(&query).await.unwrap();

    let pos_a = result.iter().position(|&id| id == a).unwrap();
    let pos_b = result
        .iter()
        .position(|&id| id == b)
        .unwrap_or(usize::MAX);
    assert!(pos_a < pos_b);
    assert_eq!(result[0], a);
}

#[tokio::test]
async fn keyword_hash_matches_lift_older_posts() {
    let store = Arc::new(InMemoryRecsStore::new());
    // Post 2 is newer but matches only the tag; post 1 also carries a
    // rare corroborated keyword hash the query asks for.
    store.add_post(post(1, 2));
    store.add_post(post(2, 3));
    store.add_tag(PostId(1), "tech", 1);
    store.add_tag(PostId(2), "tech", 1);
    store.add_keyword(PostId(1), 0xdead, 2);
    store.add_keyword(PostId(1), 0xbeef, 1);
    store.add_keyword(PostId(2), 0xbeef, 1);
    let ranker = Ranker::new(store, test_config());

    // Without the hashes the id tie-break puts the newer post first.
    let plain = ranker.recommend_posts(&tag_query(&["tech"])).await.unwrap();
    assert_eq!(plain, vec![PostId(2), PostId(1)]);

    let mut query = tag_query(&["tech"]);
    query.keyword_hashes = vec![(0xdead, 3), (0xbeef, 1)];
    let result = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(result, vec![PostId(1), PostId(2)]);
}

#[tokio::test]
async fn seed_posts_are_included_regardless_of_rank() {
    let store = Arc::new(InMemoryRecsStore::new());
    store.add_post(post(1, 2));
    store.add_tag(PostId(1), "tech", 1);
    // Post 99 matches no query tag.
    store.add_post(post(99, 3));
    let ranker = Ranker::new(store, test_config());

    let mut query = tag_query(&["tech"]);
    query.seed_posts = vec![PostId(99)];
    let result = ranker.recommend_posts(&query).await.unwrap();
    assert!(result.contains(&PostId(99)));
    assert!(result.contains(&PostId(1)));
}

#[tokio::test]
async fn seed_post_promotion_prefers_earlier_seed_entries() {
    let store = Arc::new(InMemoryRecsStore::new());
    for id in 1u64..=4 {
        store.add_post(post(id, 2));
        store.add_tag(PostId(id), "tech", 1);
    }
    let ranker = Ranker::new(store, test_config());

    // Baseline: id-descending.
    let baseline = ranker.recommend_posts(&tag_query(&["tech"])).await.unwrap();
    assert_eq!(baseline[0], PostId(4));

    let mut query = tag_query(&["tech"]);
    query.seed_posts = vec![PostId(1), PostId(2)];
    query.knobs.seed_post_promotion = 10.0;
    let promoted = ranker.recommend_posts(&query).await.unwrap();
    // Earlier seed entry gets the larger boost.
    assert_eq!(promoted[0], PostId(1));
    assert_eq!(promoted[1], PostId(2));
}

#[tokio::test]
async fn owner_decay_demotes_repeat_authors() {
    let store = Arc::new(InMemoryRecsStore::new());
    // Author 5 holds the two newest posts; author 6 the oldest. Two query
    // tags give every post a nonzero lexical score.
    store.add_post(post(30, 5));
    store.add_post(post(20, 5));
    store.add_post(post(10, 6));
    for id in [30u64, 20, 10] {
        store.add_tag(PostId(id), "a", 1);
    }
    store.add_tag(PostId(30), "b", 1);
    store.add_tag(PostId(20), "b", 1);
    let ranker = Ranker::new(store, test_config());

    let neutral = ranker
        .recommend_posts(&tag_query(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(neutral, vec![PostId(30), PostId(20), PostId(10)]);

    let mut query = tag_query(&["a", "b"]);
    query.knobs.owner_decay = 0.01;
    let decayed = ranker.recommend_posts(&query).await.unwrap();
    // Author 5's second post falls behind author 6's only post.
    let pos_20 = decayed.iter().position(|&id| id == PostId(20)).unwrap();
    let pos_10 = decayed.iter().position(|&id| id == PostId(10)).unwrap();
    assert!(pos_10 < pos_20);
    assert_eq!(decayed[0], PostId(30));
}

#[tokio::test]
async fn likes_promotion_and_reply_demotion_adjust_positions() {
    let store = Arc::new(InMemoryRecsStore::new());
    // Newest first by default: 3 (reply), 2 (plain), 1 (well-liked).
    store.add_post(Post {
        id: PostId(3),
        owner: UserId(2),
        parent: Some(PostId(2)),
        likes: 0,
    });
    store.add_post(post(2, 2));
    store.add_post(Post {
        id: PostId(1),
        owner: UserId(2),
        parent: None,
        likes: 100,
    });
    for id in 1u64..=3 {
        store.add_tag(PostId(id), "tech", 1);
    }
    let ranker = Ranker::new(store, test_config());

    let baseline = ranker.recommend_posts(&tag_query(&["tech"])).await.unwrap();
    assert_eq!(baseline, vec![PostId(3), PostId(2), PostId(1)]);

    let mut query = tag_query(&["tech"]);
    query.knobs.likes_promotion_alpha = 3.0;
    query.knobs.reply_demotion = 5.0;
    let adjusted = ranker.recommend_posts(&query).await.unwrap();
    // The liked root post overtakes everything; the reply drops last.
    assert_eq!(adjusted[0], PostId(1));
    assert_eq!(*adjusted.last().unwrap(), PostId(3));
}

#[tokio::test]
async fn duplicate_content_is_demoted_past_the_threshold() {
    let store = Arc::new(InMemoryRecsStore::new());
    // Posts 3 and 2 share a direction; post 1 is orthogonal.
    let vectors: [(u64, &[f32]); 3] = [
        (3, &[1.0, 0.0, 0.0, 0.0]),
        (2, &[1.0, 0.0, 0.0, 0.0]),
        (1, &[0.0, 1.0, 0.0, 0.0]),
    ];
    for (id, v) in vectors {
        store.add_post(post(id, 2));
        store.add_tag(PostId(id), "tech", 1);
        add_vector(&store, id, v).await;
    }
    let ranker = Ranker::new(store, test_config());

    let mut query = tag_query(&["tech"]);
    query.knobs.duplicate_demotion = 10.0;
    let result = ranker.recommend_posts(&query).await.unwrap();
    // The second copy of the shared direction sinks below the orthogonal
    // post.
    assert_eq!(result, vec![PostId(3), PostId(1), PostId(2)]);
}

#[tokio::test]
async fn duplicate_demotion_is_inert_at_threshold_one() {
    let store = Arc::new(InMemoryRecsStore::new());
    let vectors: [(u64, &[f32]); 3] = [
        (3, &[1.0, 0.0, 0.0, 0.0]),
        (2, &[1.0, 0.0, 0.0, 0.0]),
        (1, &[0.0, 1.0, 0.0, 0.0]),
    ];
    for (id, v) in vectors {
        store.add_post(post(id, 2));
        store.add_tag(PostId(id), "tech", 1);
        add_vector(&store, id, v).await;
    }
    // A threshold of 1.0 can never be exceeded; the knob must be a no-op
    // rather than divide by zero in the penalty.
    let config = RecsConfig {
        duplicate_threshold: 1.0,
        ..test_config()
    };
    let ranker = Ranker::new(store, config);

    let mut query = tag_query(&["tech"]);
    query.knobs.duplicate_demotion = 10.0;
    let result = ranker.recommend_posts(&query).await.unwrap();
    assert_eq!(result, vec![PostId(3), PostId(2), PostId(1)]);
}

#[tokio::test]
async fn out_of_range_owner_decay_leaves_order_unchanged() {
    let store = Arc::new(InMemoryRecsStore::new());
    store.add_post(post(30, 5));
    store.add_post(post(20, 5));
    store.add_post(post(10, 6));
    for id in [30u64, 20, 10] {
        store.add_tag(PostId(id), "a", 1);
    }
    store.add_tag(PostId(30), "b", 1);
    store.add_tag(PostId(20), "b", 1);
    let ranker = Ranker::new(store, test_config());

    let neutral = ranker
        .recommend_posts(&tag_query(&["a", "b"]))
        .await
        .unwrap();
    for decay in [1.5, -0.1] {
        let mut query = tag_query(&["a", "b"]);
        query.knobs.owner_decay = decay;
        let result = ranker.recommend_posts(&query).await.unwrap();
        assert_eq!(result, neutral);
    }
}
