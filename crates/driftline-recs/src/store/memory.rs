//! In-memory stub implementations of [`RecsStore`] and [`RecsCache`].
//!
//! Test only. Lookups are full scans over `DashMap`s, nothing persists,
//! and there is no index structure behind the tag/keyword reads. Suitable
//! for unit and integration tests with small datasets; do not use as a
//! production backend.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::{LikeEdge, RecsCache, RecsStore};
use crate::error::StoreError;
use crate::types::{AiPostSummary, KeywordAssociation, Post, PostId, TagAssociation, UserId};

/// DashMap-backed stub store. Cheap to clone state into via the `add_*`
/// helpers; every read is a scan.
#[derive(Debug, Default)]
pub struct InMemoryRecsStore {
    posts: DashMap<PostId, Post>,
    summaries: DashMap<PostId, AiPostSummary>,
    tag_index: DashMap<String, Vec<(PostId, u8)>>,
    keyword_index: DashMap<u32, Vec<(PostId, u8)>>,
    likes: DashMap<UserId, Vec<LikeEdge>>,
    follows: DashMap<UserId, Vec<UserId>>,
}

impl InMemoryRecsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a post.
    pub fn add_post(&self, post: Post) {
        self.posts.insert(post.id, post);
    }

    /// Associate a tag with a post. `source_count` is 1 (single index) or
    /// 2 (corroborated by both curated and inferred indexes).
    pub fn add_tag(&self, post: PostId, tag: &str, source_count: u8) {
        self.tag_index
            .entry(tag.to_string())
            .or_default()
            .push((post, source_count));
    }

    /// Associate a keyword hash with a post.
    pub fn add_keyword(&self, post: PostId, hash: u32, source_count: u8) {
        self.keyword_index
            .entry(hash)
            .or_default()
            .push((post, source_count));
    }

    /// Record a like edge at the given time.
    pub fn add_like(&self, user: UserId, post: PostId, liked_at: DateTime<Utc>) {
        self.likes
            .entry(user)
            .or_default()
            .push(LikeEdge { post, liked_at });
    }

    /// Record a follow edge.
    pub fn add_follow(&self, follower: UserId, followee: UserId) {
        self.follows.entry(follower).or_default().push(followee);
    }
}

#[async_trait]
impl RecsStore for InMemoryRecsStore {
    async fn recent_posts_by_owner(
        &self,
        owner: UserId,
        cap: usize,
    ) -> Result<Vec<PostId>, StoreError> {
        let mut ids: Vec<PostId> = self
            .posts
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| *e.key())
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(cap);
        Ok(ids)
    }

    async fn recent_likes_by_user(
        &self,
        user: UserId,
        cap: usize,
    ) -> Result<Vec<PostId>, StoreError> {
        let mut edges = self
            .likes
            .get(&user)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        edges.sort_unstable_by(|a, b| b.liked_at.cmp(&a.liked_at).then(b.post.cmp(&a.post)));
        Ok(edges.into_iter().take(cap).map(|e| e.post).collect())
    }

    async fn followees(&self, user: UserId) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .follows
            .get(&user)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn latest_post_ids(
        &self,
        owners: &[UserId],
    ) -> Result<HashMap<UserId, PostId>, StoreError> {
        let mut latest = HashMap::new();
        for entry in self.posts.iter() {
            let post = entry.value();
            if owners.contains(&post.owner) {
                let slot = latest.entry(post.owner).or_insert(post.id);
                if post.id > *slot {
                    *slot = post.id;
                }
            }
        }
        Ok(latest)
    }

    async fn posts_for_tag(
        &self,
        tag: &str,
        cap: usize,
    ) -> Result<Vec<TagAssociation>, StoreError> {
        let mut entries = self
            .tag_index
            .get(tag)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        entries.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        entries.truncate(cap);
        debug!(tag, hits = entries.len(), "tag index scan");
        Ok(entries
            .into_iter()
            .map(|(post, source_count)| TagAssociation {
                post,
                tag: tag.to_string(),
                source_count,
            })
            .collect())
    }

    async fn posts_for_keyword(
        &self,
        hash: u32,
        cap: usize,
    ) -> Result<Vec<KeywordAssociation>, StoreError> {
        let mut entries = self
            .keyword_index
            .get(&hash)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        entries.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        entries.truncate(cap);
        Ok(entries
            .into_iter()
            .map(|(post, source_count)| KeywordAssociation {
                post,
                hash,
                source_count,
            })
            .collect())
    }

    async fn tags_for_posts(&self, ids: &[PostId]) -> Result<Vec<TagAssociation>, StoreError> {
        let mut out = Vec::new();
        for entry in self.tag_index.iter() {
            for &(post, source_count) in entry.value() {
                if ids.contains(&post) {
                    out.push(TagAssociation {
                        post,
                        tag: entry.key().clone(),
                        source_count,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn keywords_for_posts(
        &self,
        ids: &[PostId],
    ) -> Result<Vec<KeywordAssociation>, StoreError> {
        let mut out = Vec::new();
        for entry in self.keyword_index.iter() {
            for &(post, source_count) in entry.value() {
                if ids.contains(&post) {
                    out.push(KeywordAssociation {
                        post,
                        hash: *entry.key(),
                        source_count,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn posts(&self, ids: &[PostId]) -> Result<Vec<Post>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.posts.get(id).map(|e| e.value().clone()))
            .collect())
    }

    async fn summaries(&self, ids: &[PostId]) -> Result<Vec<AiPostSummary>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.summaries.get(id).map(|e| e.value().clone()))
            .collect())
    }

    async fn upsert_summary(&self, summary: AiPostSummary) -> Result<(), StoreError> {
        debug!(post = %summary.post, "summary upsert");
        self.summaries.insert(summary.post, summary);
        Ok(())
    }
}

/// Mutex-guarded TTL cache stub. Expired entries are dropped lazily on
/// read; last writer wins per key.
#[derive(Debug, Default)]
pub struct InMemoryRecsCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryRecsCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecsCache for InMemoryRecsCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: u64, owner: u64) -> Post {
        Post {
            id: PostId(id),
            owner: UserId(owner),
            parent: None,
            likes: 0,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn recent_posts_are_id_descending_and_capped() {
        let store = InMemoryRecsStore::new();
        for id in [3u64, 9, 1, 7] {
            store.add_post(post(id, 1));
        }
        store.add_post(post(5, 2));
        let ids = store
            .recent_posts_by_owner(UserId(1), 3)
            .await
            .unwrap();
        assert_eq!(ids, vec![PostId(9), PostId(7), PostId(3)]);
    }

    #[tokio::test]
    async fn likes_order_by_time_not_post_id() {
        let store = InMemoryRecsStore::new();
        store.add_like(UserId(1), PostId(100), at(10));
        store.add_like(UserId(1), PostId(5), at(30));
        store.add_like(UserId(1), PostId(50), at(20));
        let ids = store.recent_likes_by_user(UserId(1), 10).await.unwrap();
        assert_eq!(ids, vec![PostId(5), PostId(50), PostId(100)]);
    }

    #[tokio::test]
    async fn tag_scan_reports_source_counts() {
        let store = InMemoryRecsStore::new();
        store.add_tag(PostId(1), "tech", 2);
        store.add_tag(PostId(4), "tech", 1);
        let hits = store.posts_for_tag("tech", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].post, PostId(4));
        assert_eq!(hits[0].source_count, 1);
        assert_eq!(hits[1].source_count, 2);
        assert!(store.posts_for_tag("nope", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_upsert_is_last_writer_wins() {
        let store = InMemoryRecsStore::new();
        let mut summary = AiPostSummary {
            post: PostId(1),
            summary: Some("v1".into()),
            features: None,
            tags: vec![],
            keyword_hashes: vec![],
            updated_at: at(1),
        };
        store.upsert_summary(summary.clone()).await.unwrap();
        summary.summary = Some("v2".into());
        store.upsert_summary(summary).await.unwrap();
        let got = store.summaries(&[PostId(1)]).await.unwrap();
        assert_eq!(got[0].summary.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn cache_expires_by_ttl() {
        let cache = InMemoryRecsCache::new();
        cache
            .set("k", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache
            .set("gone", "v".into(), Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(cache.get("gone").await.unwrap(), None);
    }
}
