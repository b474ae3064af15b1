//! Core data model for the recommendation engine.
//!
//! Ids are fixed-width unsigned 64-bit integers internally. External
//! callers may render them as fixed-16-hex-digit strings; the newtypes
//! round-trip that representation exactly, with no floating-point detour.
//!
//! Post ids are monotonically increasing: a larger id is a more recent
//! post. Several scoring steps rely on this ordering.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecsError;

/// 64-bit post identifier. Larger id = more recent post.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PostId(pub u64);

/// 64-bit user identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

macro_rules! impl_hex16_id {
    ($ty:ident) => {
        impl $ty {
            /// Render as a fixed-16-digit lowercase hex string.
            pub fn to_hex(self) -> String {
                format!("{:016x}", self.0)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = RecsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != 16 {
                    return Err(RecsError::MalformedId { input: s.into() });
                }
                u64::from_str_radix(s, 16)
                    .map($ty)
                    .map_err(|_| RecsError::MalformedId { input: s.into() })
            }
        }

        impl From<u64> for $ty {
            fn from(raw: u64) -> Self {
                $ty(raw)
            }
        }
    };
}

impl_hex16_id!(PostId);
impl_hex16_id!(UserId);

/// Post metadata as the core consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub owner: UserId,
    /// `None` means a root (top-level) post; `Some` means a reply.
    pub parent: Option<PostId>,
    pub likes: u32,
}

impl Post {
    /// Whether this post is top-level rather than a reply.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A tag attached to a post, corroborated by `source_count` distinct
/// origin indexes (curated and/or inferred; always 1 or 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssociation {
    pub post: PostId,
    pub tag: String,
    pub source_count: u8,
}

/// Same shape as [`TagAssociation`] with a 32-bit keyword hash instead of
/// a tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordAssociation {
    pub post: PostId,
    pub hash: u32,
    pub source_count: u8,
}

/// Enrichment output for a post: summary text, quantized feature vector,
/// free-form tags, and keyword hashes.
///
/// One-to-one with a post. Written by the external enrichment pipeline via
/// upsert; strictly read-only to this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiPostSummary {
    pub post: PostId,
    pub summary: Option<String>,
    /// Quantized feature vector of the configured dimension, components in
    /// [-127, 127]. `None` when enrichment has not produced one yet.
    pub features: Option<Vec<i8>>,
    pub tags: Vec<String>,
    pub keyword_hashes: Vec<u32>,
    pub updated_at: DateTime<Utc>,
}

/// A tag kept in a seed's primary tier: integer count >= 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u32,
}

/// A "near miss" tag kept with a fractional weight < 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagWeight {
    pub tag: String,
    pub weight: f64,
}

/// A keyword hash kept in a seed's primary tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashCount {
    pub hash: u32,
    pub count: u32,
}

/// A "near miss" keyword hash with a fractional weight < 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HashWeight {
    pub hash: u32,
    pub weight: f64,
}

/// A weighted interest profile derived from a user's behavior.
///
/// Ephemeral: produced on demand, never persisted by the core. Callers may
/// cache serialized seeds per user with TTL-only invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSeed {
    /// Primary tags with counts rescaled so the cutoff tag sits near 1.
    pub tags: Vec<TagCount>,
    /// Next-tier tags with fractional weights below 1.
    pub extra_tags: Vec<TagWeight>,
    /// Primary keyword hashes.
    pub keyword_hashes: Vec<HashCount>,
    /// Next-tier keyword hashes.
    pub extra_hashes: Vec<HashWeight>,
    /// Re-quantized unit feature vector for this interest cluster.
    pub features: Vec<i8>,
    /// Aggregate signal mass of the cluster. Always > 0 for emitted seeds.
    pub weight: f64,
    /// Representative non-self member posts, strongest first.
    pub post_ids: Vec<PostId>,
}

/// Result ordering for a recommendation page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Best-ranked first.
    #[default]
    Desc,
    /// Reversed full ordering.
    Asc,
}

/// Pagination over the ranked universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
    pub order: SortOrder,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
            order: SortOrder::Desc,
        }
    }
}

/// Optional rank-adjustment knobs. A knob at its neutral value disables
/// that adjustment entirely.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankKnobs {
    /// Positional penalty weight for near-duplicate content. 0 disables.
    pub duplicate_demotion: f64,
    /// Alpha for the log-scaled likes promotion. 0 disables.
    pub likes_promotion_alpha: f64,
    /// Positional boost weight for explicitly supplied seed posts. 0 disables.
    pub seed_post_promotion: f64,
    /// Fixed positional penalty for replies. 0 disables.
    pub reply_demotion: f64,
    /// Per-repeat multiplier on an author's later posts. Only values in
    /// [0, 1) activate the decay; 1 and out-of-range values leave the
    /// order unchanged.
    pub owner_decay: f64,
}

impl Default for RankKnobs {
    fn default() -> Self {
        Self {
            duplicate_demotion: 0.0,
            likes_promotion_alpha: 0.0,
            seed_post_promotion: 0.0,
            reply_demotion: 0.0,
            owner_decay: 1.0,
        }
    }
}

impl RankKnobs {
    /// Whether any positional adjustment is active.
    pub fn any_positional(&self) -> bool {
        self.likes_promotion_alpha > 0.0
            || self.seed_post_promotion > 0.0
            || self.reply_demotion > 0.0
    }
}

/// One ranking request against the tag/vector indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationQuery {
    /// Tag multiset: (name, query-side count).
    pub tags: Vec<(String, u32)>,
    /// Keyword-hash multiset: (hash, query-side count).
    pub keyword_hashes: Vec<(u32, u32)>,
    /// Optional dense query vector (raw floats, dimension D).
    pub features: Option<Vec<f32>>,
    /// Posts whose inclusion in the universe is guaranteed. Earlier
    /// entries receive a larger promotion boost.
    pub seed_posts: Vec<PostId>,
    /// Querying user; their own posts are excluded when present.
    pub self_user: Option<UserId>,
    pub knobs: RankKnobs,
    pub page: Page,
}

impl RecommendationQuery {
    /// A query over the given tags with every knob neutral.
    pub fn for_tags(tags: Vec<(String, u32)>) -> Self {
        Self {
            tags,
            keyword_hashes: Vec::new(),
            features: None,
            seed_posts: Vec::new(),
            self_user: None,
            knobs: RankKnobs::default(),
            page: Page::default(),
        }
    }
}

impl SearchSeed {
    /// Bridge a seed into a ranking query: primary tags and keyword hashes
    /// carry their counts, the seed's features become the query vector,
    /// and the representative posts become guaranteed seed posts.
    ///
    /// `gamma` must be the companding exponent the seed's features were
    /// encoded with (`RecsConfig::quant_gamma`).
    pub fn to_query(
        &self,
        self_user: Option<UserId>,
        gamma: f32,
    ) -> crate::error::Result<RecommendationQuery> {
        let features = crate::codec::decode(&self.features, gamma)?;
        Ok(RecommendationQuery {
            tags: self
                .tags
                .iter()
                .map(|t| (t.tag.clone(), t.count))
                .collect(),
            keyword_hashes: self
                .keyword_hashes
                .iter()
                .map(|h| (h.hash, h.count))
                .collect(),
            features: Some(features),
            seed_posts: self.post_ids.clone(),
            self_user,
            knobs: RankKnobs::default(),
            page: Page::default(),
        })
    }
}

/// Cache key for a user's memoized seeds.
pub fn seed_cache_key(user: UserId) -> String {
    format!("recs:seed:{user}")
}

/// Cache key for a user's memoized recommendation id list.
pub fn recs_cache_key(user: UserId) -> String {
    format!("recs:feed:{user}")
}
