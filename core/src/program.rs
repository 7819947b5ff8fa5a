//! The contract between the execution core and compiler-generated stencils.
//!
//! The stencil compiler emits, for every bundle, an object implementing
//! [`BundleProgram`]: per-point scalar code, masked single-vector code, and
//! unrolled multi-vector cluster code, plus the metadata the engine needs to
//! place and account for the work. The core is generic over the concrete
//! program type so the hot dispatch loop monomorphizes; only the dependency
//! graph and stage iteration go through `dyn` (see [`crate::bundle::Bundle`]).
//!
//! Index conventions for the three entry points:
//!
//! - `calc_scalar` gets one point in global element coordinates.
//! - `calc_vectors` / `calc_clusters` get a scan whose `[start, stop)` range
//!   is in *normalized*, rank-relative coordinates: element indices divided
//!   by the fold length per domain dim, so they address vectors. The cluster
//!   range always spans whole clusters.

use lattica_geom::{Idx, Indices, LaneMask, ScanIndices};

/// A compiler-generated stencil bundle implementation.
pub trait BundleProgram: Send + Sync {
    /// Opaque generated core data; the engine threads `&Core` through
    /// without inspecting it.
    type Core;

    fn name(&self) -> &str;

    /// Estimated FP ops per scalar evaluation.
    fn scalar_fp_ops(&self) -> i64;

    /// Points read per scalar evaluation.
    fn scalar_points_read(&self) -> i64;

    /// Points written per scalar evaluation.
    fn scalar_points_written(&self) -> i64;

    /// Whether this bundle writes scratch vars only.
    fn is_scratch(&self) -> bool;

    /// Whether `pt` (full stencil rank, global coordinates) is inside this
    /// bundle's valid sub-domain.
    fn is_in_valid_domain(&self, core: &Self::Core, pt: &Indices) -> bool;

    /// True if the bundle has a non-default sub-domain condition.
    fn is_sub_domain_expr(&self) -> bool;

    /// Human-readable sub-domain condition.
    fn domain_description(&self) -> String;

    /// Whether the bundle is enabled at the given step index.
    fn is_in_valid_step(&self, core: &Self::Core, step: Idx) -> bool;

    /// True if the bundle has a non-default step condition.
    fn is_step_cond_expr(&self) -> bool;

    /// Human-readable step condition.
    fn step_cond_description(&self) -> String;

    /// If the bundle writes vars with the step index, the step that an
    /// evaluation at `input_step` writes; `None` otherwise.
    fn output_step_index(&self, input_step: Idx) -> Option<Idx>;

    /// Evaluate one point. `scratch_or_outer_idx` selects the scratch-var
    /// slice for scratch bundles and is the outer thread index otherwise.
    fn calc_scalar(&self, core: &Self::Core, scratch_or_outer_idx: usize, pt: &Indices);

    /// Evaluate single vectors over a normalized range, writing only the
    /// lanes set in `mask`.
    fn calc_vectors(
        &self,
        core: &Self::Core,
        outer_thread_idx: usize,
        inner_thread_idx: usize,
        thread_limit: usize,
        norm_idxs: &ScanIndices,
        mask: LaneMask,
    );

    /// Evaluate whole clusters over a normalized range. No masking: every
    /// lane of every vector in the range is written.
    fn calc_clusters(
        &self,
        core: &Self::Core,
        outer_thread_idx: usize,
        inner_thread_idx: usize,
        thread_limit: usize,
        norm_idxs: &ScanIndices,
    );
}
