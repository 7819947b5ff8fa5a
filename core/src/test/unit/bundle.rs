//! Bounding-box discovery, write halos, and dirty tracking.

use lattica_geom::{Indices, ScanIndices};

use crate::bundle::{find_write_halos, Bundle, BundleDriver};
use crate::test::fixture::{var_ref, Harness, PathKind, RefCore, RefProgram, TestVar};
use crate::vars::DirtyView;

#[test]
fn no_subdomain_expr_takes_the_extended_box() {
    let Harness { ctx, mut driver, .. } = Harness::with_offsets(&[4, 4], &[1, 1], &[0, 0], &[0, 0], &[16, 16]);
    driver.find_bounding_boxes(&ctx);

    assert_eq!(driver.bb().begin, [0, 0].into());
    assert_eq!(driver.bb().end, [16, 16].into());
    assert!(driver.bb().is_full);
    assert_eq!(driver.bb_list().len(), 1);
}

#[test]
fn half_plane_condition_yields_one_merged_box() {
    let Harness { mut ctx, mut driver, .. } = Harness::with_offsets(&[4, 4], &[1, 1], &[0, 0], &[0, 0], &[16, 16]);
    driver.program.sub_domain_expr = true;
    ctx.core.valid = Some(Box::new(|pt| pt[1] < 8));
    driver.find_bounding_boxes(&ctx);

    assert_eq!(driver.bb().begin, [0, 0].into());
    assert_eq!(driver.bb().end, [8, 16].into());
    assert!(driver.bb().is_full);
    // Runs along x merge along y into a single box.
    assert_eq!(driver.bb_list().len(), 1);
    assert_eq!(driver.bb_list().num_points(), 8 * 16);
}

#[test]
fn checkerboard_condition_yields_disjoint_cover() {
    let Harness { mut ctx, mut driver, .. } = Harness::with_offsets(&[4, 4], &[1, 1], &[0, 0], &[0, 0], &[16, 16]);
    driver.program.sub_domain_expr = true;
    ctx.core.valid = Some(Box::new(|pt| (pt[1] / 4 + pt[2] / 4) % 2 == 0));
    driver.find_bounding_boxes(&ctx);

    let list = driver.bb_list();
    assert!(list.is_disjoint());
    // Half the 4x4 tiles are valid.
    assert_eq!(list.num_points(), 128);
    for bb in list {
        assert!(driver.bb().contains_box(bb));
    }
    assert!(!driver.bb().is_full);
}

#[test]
fn empty_domain_yields_empty_boxes() {
    let Harness { mut ctx, mut driver, .. } = Harness::with_offsets(&[4, 4], &[1, 1], &[0, 0], &[0, 0], &[16, 16]);
    driver.program.sub_domain_expr = true;
    ctx.core.valid = Some(Box::new(|_| false));
    driver.find_bounding_boxes(&ctx);

    assert!(driver.bb().is_empty());
    assert!(driver.bb_list().is_empty());
}

#[test]
fn copy_bounding_boxes_duplicates_both_outputs() {
    let Harness { ctx, mut driver, .. } = Harness::with_offsets(&[4, 4], &[1, 1], &[0, 0], &[0, 0], &[16, 16]);
    driver.find_bounding_boxes(&ctx);

    let mut other = BundleDriver::new(1, 2, RefProgram { tag: 1, ..Default::default() });
    other.copy_bounding_boxes(&driver);
    assert_eq!(other.bb(), driver.bb());
    assert_eq!(other.bb_list().len(), driver.bb_list().len());
}

#[test]
fn write_halos_come_from_consumer_read_halos() {
    let tmp = TestVar::new("tmp", [2, 0].into(), [1, 0].into());

    let mut scratch = BundleDriver::new(0, 2, RefProgram { is_scratch: true, name: "scr".into(), ..Default::default() });
    scratch.push_scratch_slot(vec![var_ref(&tmp)], vec![]);

    let mut parent = BundleDriver::new(1, 2, RefProgram { tag: 1, name: "main".into(), ..Default::default() });
    parent.add_scratch_child(0);
    parent.push_scratch_slot(vec![], vec![var_ref(&tmp)]);

    let mut bundles: Vec<Box<dyn Bundle<RefCore>>> = vec![Box::new(scratch), Box::new(parent)];
    find_write_halos(&mut bundles);

    let (lh, rh) = bundles[0].write_halos();
    assert_eq!(*lh, [2, 0].into());
    assert_eq!(*rh, [1, 0].into());
    // Non-scratch bundles keep zero write halos.
    let (plh, prh) = bundles[1].write_halos();
    assert_eq!(*plh, Indices::new(2));
    assert_eq!(*prh, Indices::new(2));
}

#[test]
fn adjust_scratch_span_expands_clamps_and_reorigins() {
    let Harness { ctx, mut driver, .. } = Harness::with_offsets(&[4, 4], &[1, 1], &[0, 0], &[-2, -4], &[17, 20]);
    let tmp = TestVar::plain("tmp", 2);
    driver.push_scratch_slot(vec![var_ref(&tmp)], vec![]);
    driver.set_write_halos([2, 0].into(), [2, 0].into());

    let span = ScanIndices::from_range([0, 0, 0].into(), [1, 16, 16].into());
    let adj = driver.adjust_scratch_span(0, &span, &ctx);

    // Expanded by the halos, clamped to the extended box on the left (-2)
    // and right (17).
    assert_eq!(adj.begin, [0, -2, 0].into());
    assert_eq!(adj.end, [1, 17, 16].into());
    assert_eq!(adj.start, adj.begin);
    assert_eq!(adj.stop, adj.end);
    assert_eq!(*tmp.origin.lock(), Some([-2, 0].into()));
}

#[test]
fn update_var_info_marks_both_views_and_watermark() {
    let mut driver = BundleDriver::new(0, 2, RefProgram::default());
    let u = TestVar::plain("u", 2);
    driver.add_output_var(var_ref(&u));

    driver.update_var_info(DirtyView::Host, 3, true, true, true);
    assert!(u.flags.get(DirtyView::Host, 3));
    assert!(u.flags.get(DirtyView::Device, 3));
    assert!(u.flags.mod_dev_data());
    assert_eq!(u.flags.valid_step(), Some(3));
}

#[test]
fn update_var_info_without_step_output_skips_watermark() {
    let mut driver = BundleDriver::new(0, 2, RefProgram { writes_step_dim: false, ..Default::default() });
    let u = TestVar::plain("u", 2);
    driver.add_output_var(var_ref(&u));

    driver.update_var_info(DirtyView::Device, 7, false, false, true);
    assert!(u.flags.get(DirtyView::Device, 7));
    assert!(!u.flags.get(DirtyView::Host, 7));
    assert_eq!(u.flags.valid_step(), None);
}

#[test]
fn reqd_bundles_lists_children_then_self() {
    let mut driver = BundleDriver::new(2, 2, RefProgram::default());
    driver.add_scratch_child(5);
    driver.add_scratch_child(7);
    assert_eq!(driver.reqd_bundles(), vec![5, 7, 2]);
}

#[test]
fn step_condition_respects_context_toggle() {
    let Harness { mut ctx, mut driver, .. } = Harness::new(&[4, 4], &[1, 1]);
    driver.program.step_every = Some(2);

    assert!(driver.is_in_valid_step(&ctx, 4));
    assert!(!driver.is_in_valid_step(&ctx, 3));

    ctx.check_step_conds = false;
    assert!(driver.is_in_valid_step(&ctx, 3));
}

#[test]
fn dependency_edges_are_ordered_and_deduplicated() {
    let mut driver = BundleDriver::new(0, 2, RefProgram::default());
    driver.add_dep(3);
    driver.add_dep(1);
    driver.add_dep(3);
    let deps: Vec<_> = driver.depends_on().iter().copied().collect();
    assert_eq!(deps, vec![3, 1]);
}

#[test]
fn calc_in_domain_gates_every_point() {
    let Harness { mut ctx, driver, .. } = Harness::new(&[4, 4], &[1, 1]);
    ctx.core.valid = Some(Box::new(|pt| pt[1] % 2 == 0));

    let scan = ScanIndices::from_range([0, 0, 0].into(), [1, 4, 4].into());
    driver.calc_in_domain(&ctx, 0, &scan);

    let writes = ctx.core.writes.lock();
    assert_eq!(writes.len(), 8);
    assert!(writes.iter().all(|w| w.pt[1] % 2 == 0 && w.path == PathKind::Scalar));
}

#[test]
fn scratch_slot_out_of_range_is_empty() {
    // A driver with no scratch slots must still adjust spans safely.
    let Harness { ctx, driver, .. } = Harness::new(&[4, 4], &[1, 1]);
    let span = ScanIndices::from_range([0, 0, 0].into(), [1, 8, 8].into());
    let adj = driver.adjust_scratch_span(3, &span, &ctx);
    assert_eq!(adj.begin, span.begin);
}
