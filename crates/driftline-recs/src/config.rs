//! Tunable configuration for the recommendation core.
//!
//! Every empirically-chosen constant lives here and is injected into
//! [`SeedBuilder`](crate::seed::SeedBuilder) and
//! [`Ranker`](crate::rank::Ranker) rather than read from ambient state, so
//! tests can pin or override any knob deterministically.
//!
//! The defaults are behavioral-compatibility values; do not adjust them
//! speculatively.

use serde::{Deserialize, Serialize};

/// Default dense feature dimension.
pub const DEFAULT_FEATURE_DIM: usize = 512;

/// Companding exponent shared by the codec and the seed weight flattening.
///
/// Expands near-zero values and compresses large ones, which is where most
/// normalized-embedding mass lives.
pub const GAMMA: f32 = 0.7;

/// Per-source base weights for seed-building signal gathering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceWeights {
    /// The user's own recent posts.
    pub own_posts: f64,
    /// The user's own recent likes.
    pub own_likes: f64,
    /// Recent posts by the most-recently-active followees.
    pub followee_posts: f64,
    /// Recent likes by those followees.
    pub followee_likes: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            own_posts: 1.0,
            own_likes: 0.7,
            followee_posts: 0.3,
            followee_likes: 0.2,
        }
    }
}

/// Social-proximity multipliers applied during lexical scoring.
///
/// Resolvable only when the query names a self user; otherwise scoring is
/// proximity-neutral (factor 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityWeights {
    /// The querying user's own posts (normally excluded upstream).
    pub self_tier: f64,
    /// Posts authored by a followee of the querying user.
    pub followee: f64,
    /// Everyone else.
    pub stranger: f64,
}

impl Default for ProximityWeights {
    fn default() -> Self {
        Self {
            self_tier: 1.0,
            followee: 0.8,
            stranger: 0.6,
        }
    }
}

/// All tunables for seed building and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecsConfig {
    /// Dense feature dimension D. Stored and query vectors must match.
    pub feature_dim: usize,

    /// Order-statistic percentile used as the quantization scale.
    pub quant_percentile: f32,

    /// Codec companding exponent.
    pub quant_gamma: f32,

    /// Power-law exponent flattening normalized candidate weights.
    pub weight_gamma: f64,

    /// Weakest-candidate retention after id-order recency decay.
    pub recency_floor: f64,

    /// Per-source signal base weights.
    pub source_weights: SourceWeights,

    /// Cap on posts fetched per signal source.
    pub source_cap: usize,

    /// How many most-recently-active followees contribute signals.
    pub followee_cap: usize,

    /// Tags kept per seed with integer counts.
    pub tag_top_n: usize,

    /// Next-tier tags kept per seed with fractional counts.
    pub extra_tag_n: usize,

    /// Keyword hashes kept per seed with integer counts.
    pub keyword_top_n: usize,

    /// Next-tier keyword hashes kept with fractional counts.
    pub extra_keyword_n: usize,

    /// Cap on representative post ids per seed.
    pub representative_cap: usize,

    /// K-means iteration cap.
    pub kmeans_max_iterations: usize,

    /// Cap on posts fetched per query tag/keyword from each index.
    pub tag_fetch_cap: usize,

    /// Bounded candidate universe per ranking call.
    pub universe_cap: usize,

    /// Page size for sequential candidate-vector fetches.
    pub vector_fetch_chunk: usize,

    /// Social-proximity multipliers.
    pub proximity: ProximityWeights,

    /// Lexical score multiplier for reply (non-root) posts.
    pub reply_rootness: f64,

    /// Sigmoidal contrast gain applied to refine-stage cosine scores.
    pub contrast_gain: f64,

    /// Sigmoidal contrast midpoint.
    pub contrast_mid: f64,

    /// Running-sum similarity above which duplicate demotion kicks in.
    pub duplicate_threshold: f64,

    /// Cache TTL, in seconds, suggested to memoizing callers.
    pub cache_ttl_secs: u64,
}

impl Default for RecsConfig {
    fn default() -> Self {
        Self {
            feature_dim: DEFAULT_FEATURE_DIM,
            quant_percentile: 0.95,
            quant_gamma: GAMMA,
            weight_gamma: GAMMA as f64,
            recency_floor: 0.8,
            source_weights: SourceWeights::default(),
            source_cap: 64,
            followee_cap: 16,
            tag_top_n: 8,
            extra_tag_n: 8,
            keyword_top_n: 8,
            extra_keyword_n: 8,
            representative_cap: 8,
            kmeans_max_iterations: 32,
            tag_fetch_cap: 128,
            universe_cap: 256,
            vector_fetch_chunk: 64,
            proximity: ProximityWeights::default(),
            reply_rootness: 0.5,
            contrast_gain: 8.0,
            contrast_mid: 0.55,
            duplicate_threshold: 0.8,
            cache_ttl_secs: 900,
        }
    }
}
