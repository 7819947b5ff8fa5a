//! Stages: barrier-delimited groups of independent bundles.
//!
//! A stage is an ordered set of bundles sharing one step condition. The
//! scheduler may interleave a stage's bundles in any order consistent with
//! the dependency DAG; the stage itself only carries the shared condition,
//! the union bounding box, timing, and per-step work counters.

use std::time::{Duration, Instant};

use snafu::ensure;

use lattica_geom::{BoundingBox, Idx};

use crate::bundle::{Bundle, BundleId};
use crate::context::SolutionContext;
use crate::error::{EmptyStageSnafu, InconsistentStepConditionsSnafu, Result, UnknownBundleSnafu};

/// Simple start/stop wall-clock accumulator.
#[derive(Debug, Default)]
pub struct Timer {
    total: Duration,
    started: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        if let Some(t0) = self.started.take() {
            self.total += t0.elapsed();
        }
    }

    /// Accumulated time across all start/stop pairs.
    pub fn elapsed(&self) -> Duration {
        self.total
    }
}

/// Work done per step across this rank, and summed across all ranks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkStats {
    pub num_reads_per_step: i64,
    pub num_writes_per_step: i64,
    pub num_fpops_per_step: i64,
    pub tot_reads_per_step: i64,
    pub tot_writes_per_step: i64,
    pub tot_fpops_per_step: i64,
}

/// An ordered collection of bundles sharing a step condition.
#[derive(Debug)]
pub struct Stage {
    name: String,
    members: Vec<BundleId>,
    /// Union of member bounding boxes (non-scratch members only).
    stage_bb: BoundingBox,

    pub timer: Timer,
    pub steps_done: i64,
    pub stats: WorkStats,
}

impl Stage {
    /// Build a stage and verify its step-condition invariant: every
    /// non-scratch member must carry the same condition.
    pub fn new<C>(name: impl Into<String>, members: Vec<BundleId>, bundles: &[Box<dyn Bundle<C>>]) -> Result<Self> {
        let name = name.into();

        let mut first: Option<&dyn Bundle<C>> = None;
        for &id in &members {
            let bp = match bundles.get(id) {
                Some(b) if b.id() == id => b.as_ref(),
                _ => return UnknownBundleSnafu { id }.fail(),
            };
            if bp.is_scratch() {
                continue;
            }
            match first {
                None => first = Some(bp),
                Some(f) => {
                    let same = f.is_step_cond_expr() == bp.is_step_cond_expr()
                        && f.step_cond_description() == bp.step_cond_description();
                    ensure!(
                        same,
                        InconsistentStepConditionsSnafu {
                            stage: name.clone(),
                            first: f.name().to_string(),
                            first_cond: f.step_cond_description(),
                            offending: bp.name().to_string(),
                            offending_cond: bp.step_cond_description(),
                        }
                    );
                }
            }
        }
        ensure!(first.is_some(), EmptyStageSnafu { stage: name.clone() });

        let ndims = first.map(|b| b.bb().ndims()).unwrap_or(0);
        Ok(Self {
            name,
            members,
            stage_bb: BoundingBox::new(ndims),
            timer: Timer::new(),
            steps_done: 0,
            stats: WorkStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[BundleId] {
        &self.members
    }

    pub fn bb(&self) -> &BoundingBox {
        &self.stage_bb
    }

    /// Whether the stage runs at `step`. All non-scratch members share one
    /// condition, so the first one answers for the stage.
    pub fn is_in_valid_step<C>(&self, ctx: &SolutionContext<C>, bundles: &[Box<dyn Bundle<C>>], step: Idx) -> bool {
        self.members
            .iter()
            .filter_map(|&id| bundles.get(id))
            .find(|b| !b.is_scratch())
            .is_some_and(|b| b.is_in_valid_step(ctx, step))
    }

    /// Recompute the union bounding box and the per-step work counters from
    /// the members' bounding boxes. Call after `find_bounding_boxes`.
    pub fn init_work_stats<C>(&mut self, bundles: &[Box<dyn Bundle<C>>]) {
        self.stage_bb = BoundingBox::new(self.stage_bb.ndims());
        self.stats = WorkStats::default();
        for &id in &self.members {
            let Some(b) = bundles.get(id) else { continue };
            if b.is_scratch() {
                continue;
            }
            self.stage_bb.union_with(b.bb());
            let npts: i64 = b.bb_list().num_points();
            self.stats.num_reads_per_step += npts * b.scalar_points_read();
            self.stats.num_writes_per_step += npts * b.scalar_points_written();
            self.stats.num_fpops_per_step += npts * b.scalar_fp_ops();
        }
    }

    /// Fold another rank's per-step counters into the all-rank totals.
    pub fn add_rank_stats(&mut self, other: &WorkStats) {
        self.stats.tot_reads_per_step += other.num_reads_per_step;
        self.stats.tot_writes_per_step += other.num_writes_per_step;
        self.stats.tot_fpops_per_step += other.num_fpops_per_step;
    }

    pub fn add_steps(&mut self, num_steps: i64) {
        self.steps_done += num_steps;
    }
}
