//! Nano-block decomposition: the hot path of the engine.
//!
//! A nano-block arrives in element units and global coordinates. In each
//! domain dim it is split into up to five sections, bounded by indices
//! rounded to cluster and vector multiples (rank-relative):
//!
//! ```text
//!   eidxs.begin
//!    | peel <--------- partial vecs here -------> remainder
//!    | |   left <------ full vecs here ----> right |
//!    | |    |         full clusters here       |   | eidxs.end
//!    | |    |                 |                |   |  |
//!    v v    v                 v                v   v  v
//!    +--+-------+---------------------------+-----+--+  compute boundaries
//!       |       |                           |     |
//!   +---+-------+---------------------------+-----+---+ vec-aligned boundaries
//!   ^   ^       ^                            ^     ^   ^
//!   |   |       fcidxs.begin (rounded up)    |     |   ovidxs.end (rounded up)
//!   |   fvidxs.begin (rounded up)            |     fvidxs.end (rounded down)
//!   ovidxs.begin (rounded down)              fcidxs.end (rounded down)
//! ```
//!
//! The interior of whole clusters goes to the unrolled cluster kernel. The
//! ring outside it is enumerated as faces/edges/corners (every k-subset of
//! dims crossed with every left/right sequence); full-vector sections get an
//! all-ones lane mask, peel/remainder sections get masks built lane-by-lane
//! from the fold layout and ANDed across the dims of the region.
//!
//! Sections can collapse or overlap in any dim (a nano-block narrower than
//! one vector, or with no whole cluster); the fixups after mask construction
//! handle those cases, matching the bit-for-bit behavior the generated
//! kernels expect.

use tracing::trace;

use lattica_geom::{
    dim_combos, idiv_flr, imod_flr, is_bit_set, round_down_flr, round_up_flr, set_bit, DimSet, FoldGeometry, Indices,
    LaneMask, ScanIndices, ALL_LANES,
};

use crate::bundle::BundleDriver;
use crate::context::SolutionContext;
use crate::program::BundleProgram;
use crate::settings::KernelSettings;

/// Divide element indices by the fold length per domain dim.
///
/// Rank offsets must already be subtracted and each domain value must be a
/// fold multiple; floor division keeps negative (halo) indices correct.
fn normalize_indices(geom: &FoldGeometry, orig: &Indices) -> Indices {
    let mut norm = orig.clone();
    for j in 0..geom.ndims() {
        let i = j + 1;
        debug_assert_eq!(imod_flr(orig[i], geom.fold_pts(j)), 0, "index not vector-aligned in dim {j}");
        norm[i] = idiv_flr(orig[i], geom.fold_pts(j));
    }
    norm
}

/// Normalize a whole scan carrier. `start/stop` are reset to the normalized
/// sweep bounds; stride/tile/align are scaled down, never below one vector.
fn normalize_scan(geom: &FoldGeometry, orig: &ScanIndices) -> ScanIndices {
    let mut norm = orig.clone();
    norm.begin = normalize_indices(geom, &orig.begin);
    norm.end = normalize_indices(geom, &orig.end);
    for j in 0..geom.ndims() {
        let i = j + 1;
        let vpts = geom.fold_pts(j);
        norm.stride[i] = idiv_flr(orig.stride[i], vpts).max(1);
        norm.tile_size[i] = idiv_flr(orig.tile_size[i], vpts).max(1);
        norm.align[i] = idiv_flr(orig.align[i], vpts).max(1);
    }
    norm.start = norm.begin.clone();
    norm.stop = norm.end.clone();
    norm
}

impl<P: BundleProgram> BundleDriver<P> {
    /// Scalar reference evaluation of one nano-block. Slow; used for debug
    /// and for verifying the optimized path.
    pub(crate) fn calc_nano_block_dbg(
        &self,
        ctx: &SolutionContext<P::Core>,
        outer_thread_idx: usize,
        inner_thread_idx: usize,
        micro_block_idxs: &ScanIndices,
    ) {
        trace!(
            bundle = self.program.name(),
            range = %micro_block_idxs.make_range_str(false),
            outer_thread_idx,
            inner_thread_idx,
            "nano-block (scalar reference)"
        );

        // Element-granular scan: unit stride and alignment, global indices.
        let mut sb_idxs = micro_block_idxs.create_inner();
        sb_idxs.stride.set_all(1);
        sb_idxs.align.set_all(1);

        sb_idxs.for_each_point(&mut |pt| {
            if self.program.is_in_valid_domain(&ctx.core, pt) {
                self.program.calc_scalar(&ctx.core, outer_thread_idx, pt);
            }
        });
    }

    /// Optimized evaluation of one nano-block: decompose into clusters,
    /// full vectors, and masked partial vectors, then dispatch each region
    /// to the generated kernels.
    pub(crate) fn calc_nano_block_opt(
        &self,
        ctx: &SolutionContext<P::Core>,
        outer_thread_idx: usize,
        inner_thread_idx: usize,
        settings: &KernelSettings,
        micro_block_idxs: &ScanIndices,
    ) {
        let geom = &ctx.geometry;
        let nd = ctx.nddims();
        trace!(
            bundle = self.program.name(),
            range = %micro_block_idxs.make_range_str(false),
            outer_thread_idx,
            inner_thread_idx,
            "nano-block (optimized)"
        );

        // Nano-block bounds from the parent tile, element units, global.
        // All derived carriers are built from this one so the step index is
        // carried through.
        let mut sb_idxs = micro_block_idxs.create_inner();

        // Strides within a nano-block are pico-block sizes.
        sb_idxs.set_strides_from_inner(&settings.pico_block_sizes, 1);
        sb_idxs.tile_size = settings.nano_block_tile_sizes.clone();

        // Element-granular bounds, rank-relative.
        let mut eidxs = sb_idxs.clone();
        // Subset covered by whole clusters.
        let mut fcidxs = sb_idxs.clone();
        // Subset covered by whole vectors (contains the cluster subset).
        let mut fvidxs = sb_idxs.clone();
        // Vector-aligned superset of the whole nano-block.
        let mut ovidxs = sb_idxs.clone();

        // These are all rank-relative, so zero the alignment offsets.
        eidxs.align_ofs.set_all(0);
        fcidxs.align_ofs.set_all(0);
        fvidxs.align_ofs.set_all(0);
        ovidxs.align_ofs.set_all(0);

        let mut do_clusters = true;
        let mut do_outside_clusters = false;

        // Per-dim flags for full and partial vectors on each side.
        let mut do_left_fvecs: DimSet = 0;
        let mut do_right_fvecs: DimSet = 0;
        let mut do_left_pvecs: DimSet = 0;
        let mut do_right_pvecs: DimSet = 0;

        // Per-dim lane masks for partial vectors; zero when unused.
        let mut peel_masks = vec![0 as LaneMask; nd];
        let mut rem_masks = vec![0 as LaneMask; nd];

        for j in 0..nd {
            let i = j + 1;

            // Rank-relative element bounds in this dim.
            let rofs = ctx.rank_domain_offsets[j];
            let ebgn = sb_idxs.begin[i] - rofs;
            let eend = sb_idxs.end[i] - rofs;

            // Range of full clusters; also the inner boundary of the full
            // vectors. fcbgn > fcend means the nano-block sits inside one
            // cluster.
            let cpts = geom.cluster_pts(j);
            let mut fcbgn = round_up_flr(ebgn, cpts);
            let mut fcend = round_down_flr(eend, cpts);

            // Range of full vectors; also the inner boundary of the peel
            // and remainder sections.
            let vpts = geom.fold_pts(j);
            let fvbgn = round_up_flr(ebgn, vpts);
            let fvend = round_down_flr(eend, vpts);

            // Outer vector-aligned boundaries: rounded away from the
            // nano-block, bounding the partial vectors.
            let ovbgn = round_down_flr(ebgn, vpts);
            let ovend = round_up_flr(eend, vpts);
            debug_assert!(ovend >= ovbgn);
            debug_assert!(ovbgn <= fvbgn);
            debug_assert!(ovend >= fvend);

            // Full vectors on either side only exist with clustering.
            let mut do_left_fvec = fvbgn < fcbgn;
            let mut do_right_fvec = fvend > fcend;

            // Partial vectors on either side.
            let mut do_left_pvec = ebgn < fvbgn;
            let mut do_right_pvec = eend > fvend;

            let mut pmask: LaneMask = 0;
            let mut rmask: LaneMask = 0;
            if do_left_pvec || do_right_pvec {
                // Build this dim's peel and remainder masks by walking the
                // fold's lanes in layout order: shift both masks toward the
                // low bit, then set the high bit when the lane's element
                // lies inside the nano-block. After the walk, bit b of a
                // mask corresponds to lane b.
                let mbit: LaneMask = 1 << (geom.fold_len() - 1) as u32;
                geom.visit_fold_points(&mut |pt, _idx| {
                    pmask >>= 1;
                    rmask >>= 1;
                    if ovbgn + pt[j] >= ebgn {
                        pmask |= mbit;
                    }
                    if fvend + pt[j] < eend {
                        rmask |= mbit;
                    }
                });
                if do_left_pvec {
                    debug_assert_ne!(pmask, 0);
                }
                if do_right_pvec {
                    debug_assert_ne!(rmask, 0);
                }
            }

            // Fixup: peel and remainder overlap, i.e. the nano-block starts
            // and ends inside the same vector. AND the masks into the peel
            // and do the peel only.
            if do_left_pvec && do_right_pvec && ovbgn == fvend {
                debug_assert_eq!(fvbgn, ovend);
                pmask &= rmask;
                rmask = 0;
                do_left_pvec = true;
                do_right_pvec = false;
                do_left_fvec = false;
                do_right_fvec = false;
                do_clusters = false;
            }
            // Fixup: no whole cluster in this dim. Collapse the cluster
            // range to the end of the full-vector range; any full vectors
            // are then all on the left of it.
            else if fcend <= fcbgn {
                fcbgn = fvend;
                fcend = fvend;
                do_clusters = false;
                if do_left_fvec || do_right_fvec {
                    do_left_fvec = true;
                    do_right_fvec = false;
                }
            }

            if do_left_fvec || do_right_fvec || do_left_pvec || do_right_pvec {
                do_outside_clusters = true;
            }

            eidxs.begin[i] = ebgn;
            eidxs.end[i] = eend;
            fcidxs.begin[i] = fcbgn;
            fcidxs.end[i] = fcend;
            fvidxs.begin[i] = fvbgn;
            fvidxs.end[i] = fvend;
            ovidxs.begin[i] = ovbgn;
            ovidxs.end[i] = ovend;

            peel_masks[j] = pmask;
            rem_masks[j] = rmask;
            if do_left_fvec {
                set_bit(&mut do_left_fvecs, j);
            }
            if do_right_fvec {
                set_bit(&mut do_right_fvecs, j);
            }
            if do_left_pvec {
                set_bit(&mut do_left_pvecs, j);
            }
            if do_right_pvec {
                set_bit(&mut do_right_pvecs, j);
            }
        }
        trace!(
            eidxs = %eidxs.make_range_str(false),
            full_clusters = %fcidxs.make_range_str(false),
            full_vectors = %fvidxs.make_range_str(false),
            vector_bounds = %ovidxs.make_range_str(false),
            "nano-block sections"
        );

        let thread_limit = settings.thread_limit;
        let norm_fcidxs = normalize_scan(geom, &fcidxs);

        // Full rectilinear polytope of aligned clusters: unrolled code, no
        // masking.
        if do_clusters {
            trace!(range = %norm_fcidxs.make_range_str(false), "calculating clusters");
            self.program.calc_clusters(&ctx.core, outer_thread_idx, inner_thread_idx, thread_limit, &norm_fcidxs);
        }

        if do_outside_clusters {
            debug_assert!(
                !geom.unit_cluster(),
                "vector border code must be unreachable with a unit cluster"
            );
            let norm_fvidxs = normalize_scan(geom, &fvidxs);
            let norm_ovidxs = normalize_scan(geom, &ovidxs);

            // Walk the boundary ring: for 2-D, 4 edges then 4 corners; for
            // 3-D, 6 faces, 12 edges, 8 corners. Each region is one k-subset
            // of dims crossed with one left/right choice per selected dim;
            // non-selected dims keep the interior cluster range.
            for k in 1..=nd {
                // Left/right sequences over the k selected dims.
                let nseqs: DimSet = 1 << k;
                for cdims in dim_combos(nd, k) {
                    for lr in 0..nseqs {
                        let mut fv_part = norm_fcidxs.clone();
                        let mut pv_part = norm_fvidxs.clone();
                        let mut fv_needed = true;
                        let mut pv_needed = true;
                        let mut pv_mask: LaneMask = ALL_LANES;

                        let mut nsel = 0;
                        for j in 0..nd {
                            if !is_bit_set(cdims, j) {
                                continue;
                            }
                            let i = j + 1;
                            let is_left = !is_bit_set(lr, nsel);
                            nsel += 1;

                            if is_left {
                                fv_part.begin[i] = norm_fvidxs.begin[i];
                                fv_part.end[i] = norm_fcidxs.begin[i];
                                if !is_bit_set(do_left_fvecs, j) {
                                    fv_needed = false;
                                }
                                pv_part.begin[i] = norm_ovidxs.begin[i];
                                pv_part.end[i] = norm_fvidxs.begin[i];
                                pv_mask &= peel_masks[j];
                                if !is_bit_set(do_left_pvecs, j) {
                                    pv_needed = false;
                                }
                            } else {
                                fv_part.begin[i] = norm_fcidxs.end[i];
                                fv_part.end[i] = norm_fvidxs.end[i];
                                if !is_bit_set(do_right_fvecs, j) {
                                    fv_needed = false;
                                }
                                pv_part.begin[i] = norm_fvidxs.end[i];
                                pv_part.end[i] = norm_ovidxs.end[i];
                                pv_mask &= rem_masks[j];
                                if !is_bit_set(do_right_pvecs, j) {
                                    pv_needed = false;
                                }
                            }
                        }

                        if fv_needed {
                            fv_part.start = fv_part.begin.clone();
                            fv_part.stop = fv_part.end.clone();
                            trace!(range = %fv_part.make_range_str(true), "calculating full vectors");
                            self.program.calc_vectors(
                                &ctx.core,
                                outer_thread_idx,
                                inner_thread_idx,
                                thread_limit,
                                &fv_part,
                                ALL_LANES,
                            );
                        }

                        if pv_needed {
                            pv_part.start = pv_part.begin.clone();
                            pv_part.stop = pv_part.end.clone();
                            trace!(
                                range = %pv_part.make_range_str(true),
                                mask = %format_args!("{pv_mask:#x}"),
                                "calculating partial vectors"
                            );
                            self.program.calc_vectors(
                                &ctx.core,
                                outer_thread_idx,
                                inner_thread_idx,
                                thread_limit,
                                &pv_part,
                                pv_mask,
                            );
                        }
                    }
                }
            }
        }
    }
}
