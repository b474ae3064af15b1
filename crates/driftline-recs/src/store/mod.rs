//! Collaborator traits for data access and caching.
//!
//! The core treats storage as an abstract repository supporting point
//! lookups by id set, equality lookups by tag/hash, and capped
//! id-descending range scans. Any backend satisfying these shapes is
//! acceptable; reads are idempotent and writes are upsert-style, so
//! concurrent request-scoped computations need no locking here.
//!
//! [`memory`] provides DashMap-backed stubs for tests.

pub mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{AiPostSummary, KeywordAssociation, Post, PostId, TagAssociation, UserId};

/// A like edge with its creation time; recency ordering for likes follows
/// the timestamp, not the liked post's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeEdge {
    pub post: PostId,
    pub liked_at: DateTime<Utc>,
}

/// Read/write surface the recommendation core needs from the data store.
///
/// All "recent" reads return id-descending results capped at `cap`.
/// Missing ids in point lookups are silently omitted — partial data
/// degrades, it does not fail.
#[async_trait]
pub trait RecsStore: Send + Sync {
    /// The owner's most recent posts, id-descending.
    async fn recent_posts_by_owner(
        &self,
        owner: UserId,
        cap: usize,
    ) -> Result<Vec<PostId>, StoreError>;

    /// Posts the user liked most recently, like-time-descending.
    async fn recent_likes_by_user(
        &self,
        user: UserId,
        cap: usize,
    ) -> Result<Vec<PostId>, StoreError>;

    /// Users the given user follows.
    async fn followees(&self, user: UserId) -> Result<Vec<UserId>, StoreError>;

    /// Latest post id per owner, for owners that have posted at all.
    async fn latest_post_ids(
        &self,
        owners: &[UserId],
    ) -> Result<HashMap<UserId, PostId>, StoreError>;

    /// Posts associated with a tag, id-descending, with per-association
    /// source counts (how many origin indexes corroborate it).
    async fn posts_for_tag(&self, tag: &str, cap: usize)
        -> Result<Vec<TagAssociation>, StoreError>;

    /// Posts associated with a keyword hash, id-descending.
    async fn posts_for_keyword(
        &self,
        hash: u32,
        cap: usize,
    ) -> Result<Vec<KeywordAssociation>, StoreError>;

    /// Tag associations for a post id set.
    async fn tags_for_posts(&self, ids: &[PostId]) -> Result<Vec<TagAssociation>, StoreError>;

    /// Keyword-hash associations for a post id set.
    async fn keywords_for_posts(
        &self,
        ids: &[PostId],
    ) -> Result<Vec<KeywordAssociation>, StoreError>;

    /// Post metadata (ownership, parent, likes) for an id set.
    async fn posts(&self, ids: &[PostId]) -> Result<Vec<Post>, StoreError>;

    /// Enrichment summaries (vectors, tags, hashes) for an id set.
    async fn summaries(&self, ids: &[PostId]) -> Result<Vec<AiPostSummary>, StoreError>;

    /// Enrichment-side writer; last writer wins per post.
    async fn upsert_summary(&self, summary: AiPostSummary) -> Result<(), StoreError>;
}

/// Fetch summaries for an id set in bounded-size pages, issued
/// sequentially to bound store load.
pub async fn summaries_chunked(
    store: &dyn RecsStore,
    ids: &[PostId],
    chunk: usize,
) -> Result<Vec<AiPostSummary>, StoreError> {
    let mut out = Vec::with_capacity(ids.len());
    for page in ids.chunks(chunk.max(1)) {
        out.extend(store.summaries(page).await?);
    }
    Ok(out)
}

/// TTL cache used by orchestrating callers to memoize seeds and
/// recommendation id lists per user. Values are JSON strings; a miss
/// simply triggers recomputation, and entries expire without active
/// invalidation.
#[async_trait]
pub trait RecsCache: Send + Sync {
    /// Fetch a live (unexpired) value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value with a TTL; last writer wins.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
}
