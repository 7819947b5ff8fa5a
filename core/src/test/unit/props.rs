//! Property tests over randomized nano-blocks and fold shapes.

use proptest::prelude::*;

use crate::test::fixture::Harness;

fn fold_cases() -> impl Strategy<Value = (Vec<i64>, Vec<i64>)> {
    prop_oneof![
        Just((vec![1, 1], vec![1, 1])),
        Just((vec![4, 4], vec![1, 1])),
        Just((vec![4, 4], vec![1, 2])),
        Just((vec![4, 2], vec![2, 1])),
        Just((vec![8, 1], vec![1, 1])),
    ]
}

proptest! {
    /// The union of dispatched regions equals the nano-block exactly: no
    /// point missed, no point written twice, for any bounds and fold.
    #[test]
    fn optimized_path_tiles_exactly(
        (fold, cm) in fold_cases(),
        x0 in -8i64..32,
        xl in 0i64..24,
        y0 in -8i64..32,
        yl in 0i64..24,
    ) {
        let h = Harness::new(&fold, &cm);
        let begin = [0, x0, y0];
        let end = [1, x0 + xl, y0 + yl];
        h.nano(&begin, &end);
        h.assert_partition(&begin, &end);
    }

    /// The scalar reference path and the optimized path write the same set
    /// of points.
    #[test]
    fn scalar_and_optimized_paths_agree(
        (fold, cm) in fold_cases(),
        x0 in -8i64..32,
        xl in 0i64..20,
        y0 in -8i64..32,
        yl in 0i64..20,
    ) {
        let begin = [0, x0, y0];
        let end = [1, x0 + xl, y0 + yl];

        let opt = Harness::new(&fold, &cm);
        opt.nano(&begin, &end);
        let mut opt_pts: Vec<Vec<i64>> = opt.writes().iter().map(|w| w.pt.as_slice().to_vec()).collect();
        opt_pts.sort();

        let mut dbg = Harness::new(&fold, &cm);
        dbg.settings.force_scalar = true;
        dbg.nano(&begin, &end);
        let mut dbg_pts: Vec<Vec<i64>> = dbg.writes().iter().map(|w| w.pt.as_slice().to_vec()).collect();
        dbg_pts.sort();

        prop_assert_eq!(opt_pts, dbg_pts);
    }

    /// Lane masks select exactly the in-block lanes: a mask bit is set iff
    /// the lane's point lies inside the nano-block. (Follows from the
    /// partition property, but checked per call here.)
    #[test]
    fn masked_writes_stay_in_block(
        (fold, cm) in fold_cases(),
        x0 in -8i64..32,
        xl in 1i64..16,
        y0 in -8i64..32,
        yl in 1i64..16,
    ) {
        let h = Harness::new(&fold, &cm);
        let begin = [0, x0, y0];
        let end = [1, x0 + xl, y0 + yl];
        h.nano(&begin, &end);
        for w in h.writes() {
            prop_assert!(w.pt[1] >= x0 && w.pt[1] < x0 + xl, "x write {} outside block", w.pt);
            prop_assert!(w.pt[2] >= y0 && w.pt[2] < y0 + yl, "y write {} outside block", w.pt);
        }
    }
}
