//! Recommendation core for the driftline social-posting backend.
//!
//! Builds per-user "interest seed" profiles from behavioral signals and
//! ranks candidate posts against tag/vector queries. The rest of the
//! backend (routing, auth, CRUD, media, notifications, enrichment) sits
//! outside this crate and talks to it through the [`store`] traits.
//!
//! # Components
//!
//! - [`codec`] — lossy int8 quantization of dense float embeddings
//! - [`vecmath`] — normalization, cosine similarity, contrast stretch,
//!   deterministic seeded k-means
//! - [`seed`] — [`SeedBuilder`]: weighted multi-signal aggregation into
//!   interest seeds
//! - [`rank`] — [`Ranker`]: two-stage lexical/vector rank fusion with
//!   positional adjustments
//!
//! Both entry points are stateless, request-scoped computations; the only
//! shared resources are the external store and cache, reached through
//! idempotent reads and upsert writes. All scoring and clustering is
//! deterministic given its inputs and seeds.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use driftline_recs::config::RecsConfig;
//! use driftline_recs::rank::Ranker;
//! use driftline_recs::store::memory::InMemoryRecsStore;
//! use driftline_recs::types::RecommendationQuery;
//!
//! # async fn demo() -> driftline_recs::error::Result<()> {
//! let store = Arc::new(InMemoryRecsStore::new());
//! let ranker = Ranker::new(store, RecsConfig::default());
//! let query = RecommendationQuery::for_tags(vec![("tech".into(), 1)]);
//! let page = ranker.recommend_posts(&query).await?;
//! # let _ = page;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod rank;
pub mod seed;
pub mod store;
pub mod types;
pub mod vecmath;

pub use config::RecsConfig;
pub use error::{RecsError, Result};
pub use rank::Ranker;
pub use seed::SeedBuilder;
pub use types::{RecommendationQuery, SearchSeed};
