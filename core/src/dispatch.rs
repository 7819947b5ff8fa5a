//! Micro-block orchestration and the two-level thread fan-out.
//!
//! Outer threads own whole micro/nano-blocks (and a private slice of every
//! scratch var); inner threads parallelize inside a nano-block and are
//! managed by the generated kernels themselves. This module drives the
//! outer level: scratch children before parents, nano-block tiling of each
//! micro-block, and the `rayon`-scoped fan-out of independent regions.
//! Barriers between stages are the caller's job; nothing here suspends.

use parking_lot::Mutex;
use tracing::trace;

use lattica_geom::ScanIndices;

use crate::bundle::{Bundle, BundleId};
use crate::context::SolutionContext;
use crate::error::{Result, UnknownBundleSnafu};
use crate::settings::KernelSettings;
use crate::vars::DirtyView;

/// Cut one span into nano-blocks and evaluate each through the bundle's
/// decomposition. Inner thread index is owned by the generated kernels, so
/// it is always seeded as 0 here.
pub fn nano_block_loop<C>(
    ctx: &SolutionContext<C>,
    bundle: &dyn Bundle<C>,
    outer_thread_idx: usize,
    settings: &KernelSettings,
    span: &ScanIndices,
) {
    let mut loop_idxs = span.create_inner();
    loop_idxs.tile_size = settings.nano_block_sizes.clone();
    loop_idxs.for_each_tile(&mut |nano| {
        bundle.calc_nano_block(ctx, outer_thread_idx, 0, settings, nano);
    });
}

/// Evaluate one bundle over a micro-block: scratch children first, in
/// listed order and with their write-halo-expanded spans, then the bundle
/// itself. Dirty flags are updated once, after the bundle's own evaluation.
pub fn calc_micro_block<C>(
    ctx: &SolutionContext<C>,
    bundles: &[Box<dyn Bundle<C>>],
    id: BundleId,
    outer_thread_idx: usize,
    settings: &KernelSettings,
    micro_block_idxs: &ScanIndices,
) -> Result<()> {
    let bundle = match bundles.get(id) {
        Some(b) if b.id() == id => b.as_ref(),
        _ => return UnknownBundleSnafu { id }.fail(),
    };
    trace!(
        bundle = bundle.name(),
        range = %micro_block_idxs.make_range_str(true),
        outer_thread_idx,
        "micro-block"
    );

    for &child_id in bundle.scratch_children() {
        let child = match bundles.get(child_id) {
            Some(b) if b.id() == child_id => b.as_ref(),
            _ => return UnknownBundleSnafu { id: child_id }.fail(),
        };
        let span = child.adjust_scratch_span(outer_thread_idx, micro_block_idxs, ctx);
        nano_block_loop(ctx, child, outer_thread_idx, settings, &span);
    }

    nano_block_loop(ctx, bundle, outer_thread_idx, settings, micro_block_idxs);

    // Evaluations write on the host side; mirror the flag so a device copy
    // knows it is stale. Scratch children are temporaries and not tracked.
    let step = micro_block_idxs.start[0];
    bundle.update_var_info(DirtyView::Host, step, true, false, true);
    Ok(())
}

/// Fan disjoint micro-block regions out over outer threads.
///
/// Regions must be pairwise disjoint (the outer scheduler's tiling
/// guarantees this); each worker indexes its private scratch slice with its
/// pool thread index.
pub fn run_micro_blocks<C: Sync>(
    ctx: &SolutionContext<C>,
    bundles: &[Box<dyn Bundle<C>>],
    id: BundleId,
    settings: &KernelSettings,
    regions: &[ScanIndices],
) -> Result<()> {
    let errors: Mutex<Vec<crate::error::Error>> = Mutex::new(Vec::new());

    rayon::scope(|s| {
        for region in regions {
            let errors_ref = &errors;
            s.spawn(move |_| {
                let outer_thread_idx = rayon::current_thread_index().unwrap_or(0);
                if let Err(e) = calc_micro_block(ctx, bundles, id, outer_thread_idx, settings, region) {
                    errors_ref.lock().push(e);
                }
            });
        }
    });

    match errors.into_inner().into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
