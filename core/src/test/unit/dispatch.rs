//! Micro-block orchestration: scratch children, nano tiling, fan-out.

use lattica_geom::{BoundingBox, FoldGeometry, ScanIndices};

use crate::bundle::{find_write_halos, Bundle, BundleDriver};
use crate::context::SolutionContext;
use crate::dispatch::{calc_micro_block, run_micro_blocks};
use crate::error::Error;
use crate::settings::KernelSettings;
use crate::test::fixture::{var_ref, Harness, KernelCall, RefCore, RefProgram, TestVar};
use crate::vars::DirtyView;

const PARENT_TAG: usize = 2;
const CHILD_TAG: usize = 1;

/// A parent bundle with one scratch child writing var "tmp" that the parent
/// reads with an x halo of 2 on each side.
fn scratch_pair() -> (SolutionContext<RefCore>, Vec<Box<dyn Bundle<RefCore>>>, std::sync::Arc<TestVar>) {
    let geom = FoldGeometry::from_mults([4, 4].into(), [1, 1].into(), true).unwrap();
    let core = RefCore::new(geom.clone(), [0, 0].into());
    let ext = BoundingBox::from_begin_end([-4, -4].into(), [20, 20].into());
    let ctx = SolutionContext::new(core, geom, [0, 0].into(), ext);

    let tmp = TestVar::new("tmp", [2, 0].into(), [2, 0].into());
    let u = TestVar::plain("u", 2);

    let mut child =
        BundleDriver::new(0, 2, RefProgram { tag: CHILD_TAG, name: "scr".into(), is_scratch: true, ..Default::default() });
    child.push_scratch_slot(vec![var_ref(&tmp)], vec![]);

    let mut parent = BundleDriver::new(1, 2, RefProgram { tag: PARENT_TAG, name: "main".into(), ..Default::default() });
    parent.add_scratch_child(0);
    parent.add_output_var(var_ref(&u));
    parent.push_scratch_slot(vec![], vec![var_ref(&tmp)]);

    let mut bundles: Vec<Box<dyn Bundle<RefCore>>> = vec![Box::new(child), Box::new(parent)];
    find_write_halos(&mut bundles);
    (ctx, bundles, u)
}

fn tagged_points(ctx: &SolutionContext<RefCore>, tag: usize) -> Vec<Vec<i64>> {
    let mut pts: Vec<Vec<i64>> =
        ctx.core.writes.lock().iter().filter(|w| w.tag == tag).map(|w| w.pt.as_slice().to_vec()).collect();
    pts.sort();
    pts
}

#[test]
fn scratch_child_writes_the_expanded_region() {
    let (ctx, bundles, _) = scratch_pair();
    let settings = KernelSettings::builder().rank(3).build();
    let micro = ScanIndices::from_range([0, 0, 0].into(), [1, 16, 16].into());

    calc_micro_block(&ctx, &bundles, 1, 0, &settings, &micro).unwrap();

    // The scratch child covers the parent region plus its write halos.
    assert_eq!(tagged_points(&ctx, CHILD_TAG), Harness::points_in(&[0, -2, 0], &[1, 18, 16]));
    // The parent covers exactly its own region.
    assert_eq!(tagged_points(&ctx, PARENT_TAG), Harness::points_in(&[0, 0, 0], &[1, 16, 16]));
}

#[test]
fn scratch_children_run_before_the_parent() {
    let (ctx, bundles, _) = scratch_pair();
    let settings = KernelSettings::builder().rank(3).build();
    let micro = ScanIndices::from_range([0, 0, 0].into(), [1, 16, 16].into());

    calc_micro_block(&ctx, &bundles, 1, 0, &settings, &micro).unwrap();

    let tags: Vec<usize> = ctx
        .core
        .calls
        .lock()
        .iter()
        .map(|c| match c {
            KernelCall::Clusters { tag, .. } | KernelCall::Vectors { tag, .. } => *tag,
        })
        .collect();
    let first_parent = tags.iter().position(|&t| t == PARENT_TAG).unwrap();
    assert!(tags[..first_parent].iter().all(|&t| t == CHILD_TAG));
    assert!(tags[..first_parent].contains(&CHILD_TAG));
}

#[test]
fn micro_block_updates_dirty_flags_once() {
    let (ctx, bundles, u) = scratch_pair();
    let settings = KernelSettings::builder().rank(3).build();
    let micro = ScanIndices::from_range([0, 0, 0].into(), [1, 16, 16].into());

    calc_micro_block(&ctx, &bundles, 1, 0, &settings, &micro).unwrap();

    assert!(u.flags.get(DirtyView::Host, 0));
    assert!(u.flags.get(DirtyView::Device, 0));
    assert_eq!(u.flags.valid_step(), Some(0));
}

#[test]
fn unknown_bundle_id_is_an_error() {
    let (ctx, bundles, _) = scratch_pair();
    let settings = KernelSettings::builder().rank(3).build();
    let micro = ScanIndices::from_range([0, 0, 0].into(), [1, 8, 8].into());

    let err = calc_micro_block(&ctx, &bundles, 99, 0, &settings, &micro).unwrap_err();
    assert!(matches!(err, Error::UnknownBundle { id: 99 }));
}

#[test]
fn nano_block_sizes_tile_the_micro_block() {
    let (ctx, bundles, _) = scratch_pair();
    let settings = KernelSettings::builder().rank(3).nano_block_sizes([1, 8, 16].into()).build();
    let micro = ScanIndices::from_range([0, 0, 0].into(), [1, 16, 16].into());

    calc_micro_block(&ctx, &bundles, 1, 0, &settings, &micro).unwrap();

    // The parent's 16x16 block is cut into two aligned 8x16 nano-blocks,
    // each dispatched as one cluster call.
    let parent_clusters = ctx
        .core
        .calls
        .lock()
        .iter()
        .filter(|c| c.is_clusters() && matches!(c, KernelCall::Clusters { tag, .. } if *tag == PARENT_TAG))
        .count();
    assert_eq!(parent_clusters, 2);
    assert_eq!(tagged_points(&ctx, PARENT_TAG), Harness::points_in(&[0, 0, 0], &[1, 16, 16]));
}

#[test]
fn disjoint_regions_fan_out_and_tile() {
    let (ctx, bundles, _) = scratch_pair();
    let settings = KernelSettings::builder().rank(3).build();
    let regions = vec![
        ScanIndices::from_range([0, 0, 0].into(), [1, 16, 8].into()),
        ScanIndices::from_range([0, 0, 8].into(), [1, 16, 16].into()),
    ];

    run_micro_blocks(&ctx, &bundles, 1, &settings, &regions).unwrap();

    assert_eq!(tagged_points(&ctx, PARENT_TAG), Harness::points_in(&[0, 0, 0], &[1, 16, 16]));
}
