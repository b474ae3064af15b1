//! Error types for driftline-recs.
//!
//! Errors split into two tiers:
//!
//! - Input/programming errors (bad cluster counts, non-finite vector
//!   components, malformed percentiles, dimension mismatches) surface as
//!   `Err` variants and fail fast.
//! - "No data" conditions (empty tag sets, no behavioral history, no
//!   surviving candidates) are valid empty results and never reach this
//!   module — callers get `Ok` with an empty collection.
//!
//! Sub-errors ([`CodecError`], [`VectorMathError`], [`StoreError`]) convert
//! into the unified [`RecsError`] via `#[from]`; library code propagates
//! with `?` and never panics.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RecsError>;

/// Errors from the lossy int8 feature codec.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Input contains NaN or Infinity.
    #[error("non-finite component at index {index}")]
    NonFinite { index: usize },

    /// Percentile outside [0, 1].
    #[error("percentile {value} outside [0, 1]")]
    InvalidPercentile { value: f32 },

    /// Quantization scale collapsed (all-zero input or degenerate percentile).
    #[error("quantization scale {value} is not a finite positive number")]
    DegenerateScale { value: f32 },

    /// Target dimension is zero.
    #[error("target dimension must be positive")]
    ZeroDimension,

    /// Quantized component outside the symmetric int8 range.
    #[error("quantized component {value} at index {index} outside [-127, 127]")]
    ComponentOutOfRange { index: usize, value: i16 },
}

/// Errors from dense vector math.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VectorMathError {
    /// Dimension mismatch between operands.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Empty vector where a dimension is required.
    #[error("empty vector provided")]
    EmptyVector,

    /// No vectors supplied to clustering.
    #[error("no vectors to cluster")]
    NoVectors,

    /// Cluster count must be >= 1.
    #[error("invalid cluster count {k}")]
    InvalidClusterCount { k: usize },

    /// Fewer vectors than requested clusters.
    #[error("{available} vectors cannot fill {requested} clusters")]
    TooFewVectors { available: usize, requested: usize },

    /// Zero vector where pre-normalization was requested.
    #[error("zero vector at index {index} cannot be normalized")]
    ZeroVector { index: usize },
}

/// Errors from the data-store collaborator.
///
/// The core treats the store as an abstract repository; concrete backends
/// map their failures into these variants. Transient faults are the
/// caller's responsibility to retry — the core never retries.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// Backend-specific read failure.
    #[error("store read failed: {reason}")]
    Read { reason: String },

    /// Backend-specific write failure.
    #[error("store write failed: {reason}")]
    Write { reason: String },

    /// Cache backend failure.
    #[error("cache operation failed: {reason}")]
    Cache { reason: String },
}

/// Unified error for the recommendation core.
#[derive(Debug, Error)]
pub enum RecsError {
    /// Feature codec failure.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// Vector math failure.
    #[error("vector math: {0}")]
    VectorMath(#[from] VectorMathError),

    /// Data-store collaborator failure.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Caller passed an invalid cluster count to the seed builder.
    #[error("requested cluster count {requested} is invalid")]
    InvalidClusterCount { requested: usize },

    /// Id string did not parse as fixed-16 hex.
    #[error("malformed id string {input:?}")]
    MalformedId { input: String },
}
