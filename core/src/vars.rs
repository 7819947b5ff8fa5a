//! The contract with the variable storage layer, plus dirty-flag plumbing.
//!
//! The storage layer itself (folded N-D arrays with halos and layouts) is an
//! external collaborator; the core only needs the narrow surface below:
//! halo extents for scratch expansion, movable local origins for scratch
//! vars, and the host/device dirty flags updated after every evaluation.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use lattica_geom::{Idx, Indices};

/// Which copy of a var a dirty flag refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirtyView {
    Host,
    Device,
}

impl DirtyView {
    /// The other view.
    pub fn mirror(self) -> Self {
        match self {
            DirtyView::Host => DirtyView::Device,
            DirtyView::Device => DirtyView::Host,
        }
    }
}

/// Storage-layer surface the core depends on.
///
/// Dirty flags are keyed by step index so a var holding several time levels
/// can track them independently. Implementations must make flag updates
/// thread-safe; the scheduler guarantees at most one updater per bundle
/// evaluation (see the shared-resource policy in the crate docs).
pub trait StencilVar: Send + Sync {
    fn name(&self) -> &str;

    /// Left/right halo extent in domain dim `j`.
    fn left_halo(&self, j: usize) -> Idx;
    fn right_halo(&self, j: usize) -> Idx;

    fn set_dirty(&self, whose: DirtyView, step: Idx, flag: bool);
    fn is_dirty(&self, whose: DirtyView, step: Idx) -> bool;

    /// Record that device-side data was modified.
    fn set_mod_dev_data(&self, flag: bool);

    /// Raise the last-valid-step watermark to at least `step`.
    fn update_valid_step(&self, step: Idx);

    /// Move the var's rank-local origin (scratch vars only; others may
    /// ignore this). `origin` is over the domain dims, global coordinates.
    fn set_local_origin(&self, origin: &Indices);
}

/// Shared handle to a var.
pub type VarRef = Arc<dyn StencilVar>;

/// Ready-made dirty-flag state for [`StencilVar`] implementations.
///
/// Tracks the dirty step sets for both views, the device-modified bit, and
/// the last-valid-step watermark.
#[derive(Default)]
pub struct DirtyFlags {
    host: RwLock<HashSet<Idx>>,
    device: RwLock<HashSet<Idx>>,
    mod_dev_data: Mutex<bool>,
    valid_step: Mutex<Option<Idx>>,
}

impl DirtyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, whose: DirtyView, step: Idx, flag: bool) {
        let mut set = match whose {
            DirtyView::Host => self.host.write(),
            DirtyView::Device => self.device.write(),
        };
        if flag {
            set.insert(step);
        } else {
            set.remove(&step);
        }
    }

    pub fn get(&self, whose: DirtyView, step: Idx) -> bool {
        match whose {
            DirtyView::Host => self.host.read().contains(&step),
            DirtyView::Device => self.device.read().contains(&step),
        }
    }

    pub fn set_mod_dev_data(&self, flag: bool) {
        *self.mod_dev_data.lock() = flag;
    }

    pub fn mod_dev_data(&self) -> bool {
        *self.mod_dev_data.lock()
    }

    pub fn update_valid_step(&self, step: Idx) {
        let mut cur = self.valid_step.lock();
        *cur = Some(cur.map_or(step, |s| s.max(step)));
    }

    pub fn valid_step(&self) -> Option<Idx> {
        *self.valid_step.lock()
    }
}
