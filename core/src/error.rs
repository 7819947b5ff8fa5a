//! Error types for the execution core.

use snafu::Snafu;

/// Result type for core operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced while assembling a solution.
///
/// The core does no I/O; everything here is a configuration problem caught
/// at construction. Hot-path precondition violations are `debug_assert!`s,
/// not `Error` variants.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Every non-scratch bundle in a stage must share one step condition.
    #[snafu(display(
        "stage '{stage}': bundle '{offending}' has step condition '{offending_cond}', \
         but '{first}' has '{first_cond}'"
    ))]
    InconsistentStepConditions { stage: String, first: String, first_cond: String, offending: String, offending_cond: String },

    /// A stage needs at least one non-scratch bundle to define its step condition.
    #[snafu(display("stage '{stage}' has no non-scratch bundle"))]
    EmptyStage { stage: String },

    /// Bundle id not present in the registry.
    #[snafu(display("unknown bundle id {id}"))]
    UnknownBundle { id: usize },

    /// Geometry validation failed.
    #[snafu(display("geometry error: {source}"))]
    Geometry { source: lattica_geom::Error },
}
