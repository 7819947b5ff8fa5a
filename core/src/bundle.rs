//! The stencil bundle: the unit of evaluated work.
//!
//! A bundle owns a compiler-generated [`BundleProgram`], its dependency
//! edges, the scratch bundles that must run before it, and the bounding
//! boxes describing where it is valid. [`BundleDriver`] carries that state
//! and implements everything except the nano-block decomposition, which
//! lives in [`crate::tiling`].
//!
//! Dispatch is split the way the crate docs describe: the hot kernel calls
//! are monomorphized over the concrete program type, while the dependency
//! graph and stage iteration see bundles as `dyn Bundle<C>` objects.

use indexmap::IndexSet;
use tracing::debug;

use lattica_geom::{BBList, BoundingBox, Idx, Indices, ScanIndices};

use crate::context::SolutionContext;
use crate::program::BundleProgram;
use crate::settings::KernelSettings;
use crate::vars::{DirtyView, VarRef};

/// Bundle identifier: the index into the solution's bundle registry.
pub type BundleId = usize;

/// Object-safe view of a bundle, parameterized by the generated core type.
///
/// This is the surface the scheduler, stages, and the dependency graph use;
/// the concrete program type is erased here and recovered only inside
/// [`BundleDriver`]'s monomorphized kernel dispatch.
pub trait Bundle<C>: Send + Sync {
    fn id(&self) -> BundleId;
    fn name(&self) -> &str;
    fn is_scratch(&self) -> bool;

    fn scalar_fp_ops(&self) -> i64;
    fn scalar_points_read(&self) -> i64;
    fn scalar_points_written(&self) -> i64;

    fn bb(&self) -> &BoundingBox;
    fn bb_list(&self) -> &BBList;

    fn depends_on(&self) -> &IndexSet<BundleId>;
    fn add_dep(&mut self, id: BundleId);
    fn scratch_children(&self) -> &[BundleId];
    fn add_scratch_child(&mut self, id: BundleId);

    /// Scratch children in eval order, then self.
    fn reqd_bundles(&self) -> Vec<BundleId>;

    /// Non-scratch output vars.
    fn output_vars(&self) -> &[VarRef];
    /// Non-scratch input vars.
    fn input_vars(&self) -> &[VarRef];
    /// Output vars including the canonical (slot-0) scratch outputs.
    fn canonical_output_vars(&self) -> Vec<VarRef>;
    /// Input vars including the canonical (slot-0) scratch inputs.
    fn canonical_input_vars(&self) -> Vec<VarRef>;

    /// Max write halos (left, right) per domain dim.
    fn write_halos(&self) -> (&Indices, &Indices);
    fn set_write_halos(&mut self, lh: Indices, rh: Indices);

    fn is_sub_domain_expr(&self) -> bool;
    fn domain_description(&self) -> String;
    fn is_step_cond_expr(&self) -> bool;
    fn step_cond_description(&self) -> String;

    fn is_in_valid_domain(&self, ctx: &SolutionContext<C>, pt: &Indices) -> bool;
    fn is_in_valid_step(&self, ctx: &SolutionContext<C>, step: Idx) -> bool;
    fn output_step_index(&self, input_step: Idx) -> Option<Idx>;

    fn find_bounding_boxes(&mut self, ctx: &SolutionContext<C>);
    fn copy_bounding_boxes(&mut self, src: &dyn Bundle<C>);

    /// Expand a span by this scratch bundle's write halos, clamped to the
    /// rank's extended box, and re-origin its scratch vars.
    fn adjust_scratch_span(&self, outer_thread_idx: usize, idxs: &ScanIndices, ctx: &SolutionContext<C>)
        -> ScanIndices;

    /// Reference scalar evaluation over an arbitrary tile, gated per point
    /// on the valid domain.
    fn calc_in_domain(&self, ctx: &SolutionContext<C>, scratch_var_idx: usize, misc_idxs: &ScanIndices);

    /// Evaluate one nano-block (the hot path; see [`crate::tiling`]).
    fn calc_nano_block(
        &self,
        ctx: &SolutionContext<C>,
        outer_thread_idx: usize,
        inner_thread_idx: usize,
        settings: &KernelSettings,
        micro_block_idxs: &ScanIndices,
    );

    /// Mark output vars dirty and advance valid-step watermarks after an
    /// evaluation at `step`.
    fn update_var_info(
        &self,
        whose: DirtyView,
        step: Idx,
        mark_extern_dirty: bool,
        mod_dev_data: bool,
        update_valid_step: bool,
    );
}

/// Concrete bundle state around a generated program.
pub struct BundleDriver<P> {
    id: BundleId,
    pub(crate) program: P,
    depends_on: IndexSet<BundleId>,
    scratch_children: Vec<BundleId>,

    /// Overall bounding box; may contain invalid points.
    bundle_bb: BoundingBox,
    /// Disjoint cover of the valid sub-domain, all inside `bundle_bb`.
    bb_list: BBList,

    /// Max write halos for scratch expansion, per domain dim.
    max_lh: Indices,
    max_rh: Indices,

    output_vars: Vec<VarRef>,
    input_vars: Vec<VarRef>,
    /// One slot per outer thread: the scratch vars written/read by that
    /// thread's evaluations.
    output_scratch: Vec<Vec<VarRef>>,
    input_scratch: Vec<Vec<VarRef>>,
}

impl<P: BundleProgram> BundleDriver<P> {
    pub fn new(id: BundleId, nddims: usize, program: P) -> Self {
        Self {
            id,
            program,
            depends_on: IndexSet::new(),
            scratch_children: Vec::new(),
            bundle_bb: BoundingBox::new(nddims),
            bb_list: BBList::new(),
            max_lh: Indices::new(nddims),
            max_rh: Indices::new(nddims),
            output_vars: Vec::new(),
            input_vars: Vec::new(),
            output_scratch: Vec::new(),
            input_scratch: Vec::new(),
        }
    }

    pub fn add_output_var(&mut self, var: VarRef) {
        self.output_vars.push(var);
    }

    pub fn add_input_var(&mut self, var: VarRef) {
        self.input_vars.push(var);
    }

    /// Append one outer thread's scratch-var slot.
    pub fn push_scratch_slot(&mut self, output: Vec<VarRef>, input: Vec<VarRef>) {
        self.output_scratch.push(output);
        self.input_scratch.push(input);
    }

    fn scratch_slot(&self, outer_thread_idx: usize) -> (&[VarRef], &[VarRef]) {
        let out = self.output_scratch.get(outer_thread_idx).map(Vec::as_slice).unwrap_or(&[]);
        let inp = self.input_scratch.get(outer_thread_idx).map(Vec::as_slice).unwrap_or(&[]);
        (out, inp)
    }
}

impl<P: BundleProgram> Bundle<P::Core> for BundleDriver<P> {
    fn id(&self) -> BundleId {
        self.id
    }

    fn name(&self) -> &str {
        self.program.name()
    }

    fn is_scratch(&self) -> bool {
        self.program.is_scratch()
    }

    fn scalar_fp_ops(&self) -> i64 {
        self.program.scalar_fp_ops()
    }

    fn scalar_points_read(&self) -> i64 {
        self.program.scalar_points_read()
    }

    fn scalar_points_written(&self) -> i64 {
        self.program.scalar_points_written()
    }

    fn bb(&self) -> &BoundingBox {
        &self.bundle_bb
    }

    fn bb_list(&self) -> &BBList {
        &self.bb_list
    }

    fn depends_on(&self) -> &IndexSet<BundleId> {
        &self.depends_on
    }

    fn add_dep(&mut self, id: BundleId) {
        self.depends_on.insert(id);
    }

    fn scratch_children(&self) -> &[BundleId] {
        &self.scratch_children
    }

    fn add_scratch_child(&mut self, id: BundleId) {
        self.scratch_children.push(id);
    }

    fn reqd_bundles(&self) -> Vec<BundleId> {
        let mut ids = self.scratch_children.clone();
        ids.push(self.id);
        ids
    }

    fn output_vars(&self) -> &[VarRef] {
        &self.output_vars
    }

    fn input_vars(&self) -> &[VarRef] {
        &self.input_vars
    }

    fn canonical_output_vars(&self) -> Vec<VarRef> {
        let mut vars = self.output_vars.clone();
        if let Some(slot) = self.output_scratch.first() {
            vars.extend(slot.iter().cloned());
        }
        vars
    }

    fn canonical_input_vars(&self) -> Vec<VarRef> {
        let mut vars = self.input_vars.clone();
        if let Some(slot) = self.input_scratch.first() {
            vars.extend(slot.iter().cloned());
        }
        vars
    }

    fn write_halos(&self) -> (&Indices, &Indices) {
        (&self.max_lh, &self.max_rh)
    }

    fn set_write_halos(&mut self, lh: Indices, rh: Indices) {
        debug_assert_eq!(lh.rank(), self.max_lh.rank());
        debug_assert_eq!(rh.rank(), self.max_rh.rank());
        self.max_lh = lh;
        self.max_rh = rh;
    }

    fn is_sub_domain_expr(&self) -> bool {
        self.program.is_sub_domain_expr()
    }

    fn domain_description(&self) -> String {
        self.program.domain_description()
    }

    fn is_step_cond_expr(&self) -> bool {
        self.program.is_step_cond_expr()
    }

    fn step_cond_description(&self) -> String {
        self.program.step_cond_description()
    }

    fn is_in_valid_domain(&self, ctx: &SolutionContext<P::Core>, pt: &Indices) -> bool {
        self.program.is_in_valid_domain(&ctx.core, pt)
    }

    fn is_in_valid_step(&self, ctx: &SolutionContext<P::Core>, step: Idx) -> bool {
        !ctx.check_step_conds || self.program.is_in_valid_step(&ctx.core, step)
    }

    fn output_step_index(&self, input_step: Idx) -> Option<Idx> {
        self.program.output_step_index(input_step)
    }

    fn find_bounding_boxes(&mut self, ctx: &SolutionContext<P::Core>) {
        let (bb, list) = scan_bounding_boxes(&self.program, ctx);
        debug!(
            bundle = self.program.name(),
            bb = %bb,
            boxes = list.len(),
            "bounding boxes found"
        );
        self.bundle_bb = bb;
        self.bb_list = list;
    }

    fn copy_bounding_boxes(&mut self, src: &dyn Bundle<P::Core>) {
        self.bundle_bb = src.bb().clone();
        self.bb_list = src.bb_list().clone();
    }

    fn adjust_scratch_span(
        &self,
        outer_thread_idx: usize,
        idxs: &ScanIndices,
        ctx: &SolutionContext<P::Core>,
    ) -> ScanIndices {
        let mut adj = idxs.clone();
        for j in 0..ctx.nddims() {
            let i = j + 1;
            adj.begin[i] = (idxs.begin[i] - self.max_lh[j]).max(ctx.ext_bb.begin[j]);
            adj.end[i] = (idxs.end[i] + self.max_rh[j]).min(ctx.ext_bb.end[j]);
            adj.start[i] = adj.begin[i];
            adj.stop[i] = adj.end[i];
            adj.align_ofs[i] = adj.begin[i];
        }
        // Re-origin this thread's scratch vars so the expanded span indexes
        // inside their allocations.
        let origin = Indices::from_slice(&adj.begin.as_slice()[1..]);
        let (out_slot, in_slot) = self.scratch_slot(outer_thread_idx);
        for var in out_slot.iter().chain(in_slot) {
            var.set_local_origin(&origin);
        }
        adj
    }

    fn calc_in_domain(&self, ctx: &SolutionContext<P::Core>, scratch_var_idx: usize, misc_idxs: &ScanIndices) {
        // Stride is always 1 on the reference path.
        let mut scan = misc_idxs.clone();
        scan.stride.set_all(1);
        scan.for_each_point(&mut |pt| {
            if self.program.is_in_valid_domain(&ctx.core, pt) {
                self.program.calc_scalar(&ctx.core, scratch_var_idx, pt);
            }
        });
    }

    fn calc_nano_block(
        &self,
        ctx: &SolutionContext<P::Core>,
        outer_thread_idx: usize,
        inner_thread_idx: usize,
        settings: &KernelSettings,
        micro_block_idxs: &ScanIndices,
    ) {
        if settings.force_scalar {
            self.calc_nano_block_dbg(ctx, outer_thread_idx, inner_thread_idx, micro_block_idxs);
        } else {
            self.calc_nano_block_opt(ctx, outer_thread_idx, inner_thread_idx, settings, micro_block_idxs);
        }
    }

    fn update_var_info(
        &self,
        whose: DirtyView,
        step: Idx,
        mark_extern_dirty: bool,
        mod_dev_data: bool,
        update_valid_step: bool,
    ) {
        let out_step = self.program.output_step_index(step);
        let eff_step = out_step.unwrap_or(step);
        for var in &self.output_vars {
            var.set_dirty(whose, eff_step, true);
            if mark_extern_dirty {
                var.set_dirty(whose.mirror(), eff_step, true);
            }
            if mod_dev_data {
                var.set_mod_dev_data(true);
            }
            if update_valid_step && out_step.is_some() {
                var.update_valid_step(eff_step);
            }
        }
    }
}

/// Scan the rank's extended domain and build a bundle's bounding boxes.
///
/// The scan runs in vector-fold strides: validity is probed once per fold
/// tile (the compiler guarantees sub-domain conditions are uniform within a
/// fold). The cover is built by extruding runs along the lowest domain dim,
/// then merging adjacent equal runs along each higher dim in order.
fn scan_bounding_boxes<P: BundleProgram>(
    program: &P,
    ctx: &SolutionContext<P::Core>,
) -> (BoundingBox, BBList) {
    let nd = ctx.nddims();
    let ext = &ctx.ext_bb;

    // No sub-domain condition: the whole extended box is valid.
    if !program.is_sub_domain_expr() {
        let mut bb = ext.clone();
        bb.is_full = true;
        let mut list = BBList::new();
        list.push(bb.clone());
        return (bb, list);
    }

    // Probe each fold tile. Points are probed at step index 0; step
    // conditions are a separate mechanism.
    let mut valid_tiles: Vec<Indices> = Vec::new();
    let mut scan = ScanIndices::new(nd + 1);
    scan.start[0] = 0;
    scan.stop[0] = 1;
    for j in 0..nd {
        scan.start[j + 1] = ext.begin[j];
        scan.stop[j + 1] = ext.end[j];
        scan.stride[j + 1] = ctx.geometry.fold_pts(j);
    }
    scan.for_each_point(&mut |pt| {
        if program.is_in_valid_domain(&ctx.core, pt) {
            valid_tiles.push(Indices::from_slice(&pt.as_slice()[1..]));
        }
    });

    if valid_tiles.is_empty() {
        return (BoundingBox::new(nd), BBList::new());
    }

    // Extrude runs along dim 0: consecutive valid tiles in the same row
    // become one box. Sort so each row's tiles are adjacent, dim 0 last.
    let fold0 = ctx.geometry.fold_pts(0);
    let mut tiles = valid_tiles;
    tiles.sort_by(|a, b| a.as_slice()[1..].cmp(&b.as_slice()[1..]).then(a[0].cmp(&b[0])));

    let mut boxes: Vec<BoundingBox> = Vec::new();
    let mut run: Option<(Indices, Idx, Idx)> = None; // (tile begin, run begin0, run end0)
    for t in &tiles {
        match &mut run {
            Some((first, _bgn0, end0)) if first.as_slice()[1..] == t.as_slice()[1..] && *end0 == t[0] => {
                *end0 += fold0;
            }
            _ => {
                if let Some(r) = run.take() {
                    boxes.push(run_to_box(&r, ctx));
                }
                run = Some((t.clone(), t[0], t[0] + fold0));
            }
        }
    }
    if let Some(r) = run.take() {
        boxes.push(run_to_box(&r, ctx));
    }

    // Merge adjacent equal boxes along each higher dim in order.
    for d in 1..nd {
        let mut merged = true;
        while merged {
            merged = false;
            'outer: for a in 0..boxes.len() {
                for b in 0..boxes.len() {
                    if a == b {
                        continue;
                    }
                    if boxes_mergeable(&boxes[a], &boxes[b], d) {
                        let end = boxes[b].end[d];
                        boxes[a].end[d] = end;
                        boxes[a].update_lengths();
                        boxes.remove(b);
                        merged = true;
                        break 'outer;
                    }
                }
            }
        }
    }

    let mut bundle_bb = BoundingBox::new(nd);
    for bb in &boxes {
        bundle_bb.union_with(bb);
    }
    bundle_bb.is_full = boxes.len() == 1 && boxes[0].begin == bundle_bb.begin && boxes[0].end == bundle_bb.end;

    let mut list = BBList::new();
    for mut bb in boxes {
        bb.is_full = true;
        bb.update_lengths();
        list.push(bb);
    }
    debug_assert!(list.is_disjoint());
    (bundle_bb, list)
}

/// A run of fold tiles along dim 0 becomes one box, clamped to the rank's
/// extended bounds (the last fold tile may hang past the domain edge).
fn run_to_box<C>(run: &(Indices, Idx, Idx), ctx: &SolutionContext<C>) -> BoundingBox {
    let (first, bgn0, end0) = run;
    let nd = ctx.nddims();
    let mut begin = first.clone();
    let mut end = Indices::new(nd);
    begin[0] = *bgn0;
    end[0] = (*end0).min(ctx.ext_bb.end[0]);
    for j in 1..nd {
        end[j] = (first[j] + ctx.geometry.fold_pts(j)).min(ctx.ext_bb.end[j]);
    }
    BoundingBox::from_begin_end(begin, end)
}

/// Two boxes merge along dim `d` when they agree in every other dim and are
/// flush in `d`.
fn boxes_mergeable(a: &BoundingBox, b: &BoundingBox, d: usize) -> bool {
    for j in 0..a.ndims() {
        if j == d {
            continue;
        }
        if a.begin[j] != b.begin[j] || a.end[j] != b.end[j] {
            return false;
        }
    }
    a.end[d] == b.begin[d]
}

/// Determine max write halos for every scratch bundle.
///
/// A scratch bundle must write far enough past each consumer's region to
/// cover that consumer's reads, so its halos are the max read halos of its
/// output vars as seen by every consumer, per domain dim. Vars are matched
/// by name across per-thread scratch copies.
pub fn find_write_halos<C>(bundles: &mut [Box<dyn Bundle<C>>]) {
    let n = bundles.len();
    let mut updates: Vec<(usize, Indices, Indices)> = Vec::new();

    for s in 0..n {
        if !bundles[s].is_scratch() {
            continue;
        }
        let nd = bundles[s].write_halos().0.rank();
        let mut lh = Indices::new(nd);
        let mut rh = Indices::new(nd);
        let written: Vec<String> = bundles[s].canonical_output_vars().iter().map(|v| v.name().to_string()).collect();

        for c in 0..n {
            if c == s {
                continue;
            }
            for var in bundles[c].canonical_input_vars() {
                if !written.iter().any(|w| w == var.name()) {
                    continue;
                }
                for j in 0..nd {
                    lh[j] = lh[j].max(var.left_halo(j));
                    rh[j] = rh[j].max(var.right_halo(j));
                }
            }
        }
        updates.push((s, lh, rh));
    }

    for (s, lh, rh) in updates {
        bundles[s].set_write_halos(lh, rh);
    }
}
