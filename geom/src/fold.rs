//! SIMD fold and cluster geometry.
//!
//! A *fold* is the N-D shape of one SIMD vector in the domain (e.g. 4×4
//! elements); a *cluster* is a fixed arrangement of whole vectors unrolled
//! by the generated code. Both are per-domain-dim point counts fixed when
//! the solution is compiled. The decomposition core only ever asks three
//! things of them: the per-dim lengths, the lane count, and the order lanes
//! are laid out in, which [`FoldGeometry::visit_fold_points`] enumerates.

use snafu::ensure;

use crate::error::{ClusterNotMultipleSnafu, InvalidFoldSnafu, RankMismatchSnafu, Result, TooManyLanesSnafu};
use crate::indices::{Idx, Indices};

/// Vector fold and cluster shape over the domain dims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoldGeometry {
    /// Points per vector in each domain dim.
    fold_pts: Indices,
    /// Points per cluster in each domain dim; always a multiple of the fold.
    cluster_pts: Indices,
    /// Lane layout: true if the first domain dim varies fastest.
    first_inner: bool,
    /// Total lanes in one vector (product of `fold_pts`).
    fold_len: Idx,
}

impl FoldGeometry {
    /// Validate and build a fold geometry from per-dim point counts.
    pub fn new(fold_pts: Indices, cluster_pts: Indices, first_inner: bool) -> Result<Self> {
        ensure!(
            fold_pts.rank() == cluster_pts.rank(),
            RankMismatchSnafu { expected: fold_pts.rank(), actual: cluster_pts.rank() }
        );
        for j in 0..fold_pts.rank() {
            ensure!(fold_pts[j] > 0, InvalidFoldSnafu { dim: j, pts: fold_pts[j] });
            ensure!(cluster_pts[j] > 0, InvalidFoldSnafu { dim: j, pts: cluster_pts[j] });
            ensure!(
                cluster_pts[j] % fold_pts[j] == 0,
                ClusterNotMultipleSnafu { dim: j, cluster: cluster_pts[j], fold: fold_pts[j] }
            );
        }
        let fold_len = fold_pts.product();
        ensure!(fold_len <= 64, TooManyLanesSnafu { lanes: fold_len });
        Ok(Self { fold_pts, cluster_pts, first_inner, fold_len })
    }

    /// Build from cluster spans given in whole vectors per domain dim.
    pub fn from_mults(fold_pts: Indices, cluster_mults: Indices, first_inner: bool) -> Result<Self> {
        ensure!(
            fold_pts.rank() == cluster_mults.rank(),
            RankMismatchSnafu { expected: fold_pts.rank(), actual: cluster_mults.rank() }
        );
        let mut cluster_pts = Indices::new(fold_pts.rank());
        for j in 0..fold_pts.rank() {
            ensure!(cluster_mults[j] > 0, InvalidFoldSnafu { dim: j, pts: cluster_mults[j] });
            cluster_pts[j] = fold_pts[j] * cluster_mults[j];
        }
        Self::new(fold_pts, cluster_pts, first_inner)
    }

    /// Scalar geometry: 1-point fold and cluster in every dim.
    pub fn scalar(ndims: usize) -> Self {
        Self {
            fold_pts: Indices::splat(ndims, 1),
            cluster_pts: Indices::splat(ndims, 1),
            first_inner: true,
            fold_len: 1,
        }
    }

    /// Number of domain dims.
    pub fn ndims(&self) -> usize {
        self.fold_pts.rank()
    }

    /// Points per vector in domain dim `j`.
    #[inline]
    pub fn fold_pts(&self, j: usize) -> Idx {
        self.fold_pts[j]
    }

    /// Points per cluster in domain dim `j`.
    #[inline]
    pub fn cluster_pts(&self, j: usize) -> Idx {
        self.cluster_pts[j]
    }

    pub fn fold_pts_all(&self) -> &Indices {
        &self.fold_pts
    }

    /// Total lanes per vector.
    #[inline]
    pub fn fold_len(&self) -> Idx {
        self.fold_len
    }

    /// True when a cluster is a single point, i.e. no vectorization at all.
    /// Masked-vector code is never reachable in this configuration.
    pub fn unit_cluster(&self) -> bool {
        self.cluster_pts.product() == 1
    }

    /// Lane layout order.
    pub fn first_inner(&self) -> bool {
        self.first_inner
    }

    /// Visit every lane of the fold in layout order.
    ///
    /// The body receives the lane's per-dim offset within the fold and its
    /// linear lane index (0-based, incremented per visit). Lane order is
    /// fixed by `first_inner` at construction and must match the generated
    /// code's layout, since lane masks are built bit-by-bit in this order.
    pub fn visit_fold_points(&self, f: &mut impl FnMut(&Indices, usize)) {
        let nd = self.ndims();
        let mut pt = Indices::new(nd);
        let mut idx = 0usize;
        // Dim visit order: innermost dim advances fastest.
        let order: Vec<usize> = if self.first_inner { (0..nd).collect() } else { (0..nd).rev().collect() };
        loop {
            f(&pt, idx);
            idx += 1;
            // Odometer increment over `order`.
            let mut carry = true;
            for &j in &order {
                pt[j] += 1;
                if pt[j] < self.fold_pts[j] {
                    carry = false;
                    break;
                }
                pt[j] = 0;
            }
            if carry {
                return;
            }
        }
    }
}
