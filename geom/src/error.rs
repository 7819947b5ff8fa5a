//! Error types for geometry construction.

use snafu::Snafu;

/// Result type for geometry operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while validating geometry at construction.
///
/// Nothing here is recoverable at runtime: a bad fold shape means the
/// compiled solution and the engine disagree about the hardware, which is
/// fatal before the first step runs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Vector fold length must be positive in every domain dim.
    #[snafu(display("fold length must be positive in dim {dim}, got {pts}"))]
    InvalidFold { dim: usize, pts: i64 },

    /// Cluster span must be a whole number of vectors.
    #[snafu(display("cluster span {cluster} in dim {dim} is not a multiple of fold length {fold}"))]
    ClusterNotMultiple { dim: usize, cluster: i64, fold: i64 },

    /// Lane masks are 64-bit, so a fold cannot have more lanes than that.
    #[snafu(display("fold has {lanes} lanes, limit is 64"))]
    TooManyLanes { lanes: i64 },

    /// Tuple ranks disagree.
    #[snafu(display("rank mismatch: expected {expected}, got {actual}"))]
    RankMismatch { expected: usize, actual: usize },
}
