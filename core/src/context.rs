//! The per-rank solution context shared by every bundle.

use lattica_geom::{BoundingBox, FoldGeometry, Indices};

/// Everything a bundle evaluation needs besides its own state: the opaque
/// generated core data, the fold/cluster geometry, this rank's placement in
/// the global domain, and the extended bounding box (domain plus halos) that
/// all scratch expansion is clamped to.
///
/// `C` is the compiler-generated core data type; the engine never looks
/// inside it, it only threads `&C` through to the generated kernels.
pub struct SolutionContext<C> {
    /// Opaque generated data handed to every kernel call.
    pub core: C,
    /// Vector fold and cluster shape over the domain dims.
    pub geometry: FoldGeometry,
    /// Global coordinate of this rank's domain origin, per domain dim.
    pub rank_domain_offsets: Indices,
    /// Rank domain plus halos, in global element coordinates.
    pub ext_bb: BoundingBox,
    /// Whether step conditions are evaluated at all (disabling them makes
    /// every step valid).
    pub check_step_conds: bool,
}

impl<C> SolutionContext<C> {
    pub fn new(core: C, geometry: FoldGeometry, rank_domain_offsets: Indices, ext_bb: BoundingBox) -> Self {
        debug_assert_eq!(geometry.ndims(), rank_domain_offsets.rank());
        debug_assert_eq!(geometry.ndims(), ext_bb.ndims());
        Self { core, geometry, rank_domain_offsets, ext_bb, check_step_conds: true }
    }

    /// Number of domain dims.
    pub fn nddims(&self) -> usize {
        self.geometry.ndims()
    }

    /// Full stencil rank: the step dim plus the domain dims.
    pub fn nsdims(&self) -> usize {
        self.nddims() + 1
    }
}
