//! Execution core for compiled stencil solutions.
//!
//! The stencil compiler turns a stencil description into per-point scalar,
//! masked-vector, and unrolled-cluster kernels; this crate is the engine
//! that drives them. Given a nano-block (the smallest iteration region the
//! outer scheduler produces), it decomposes the region into vector-aligned
//! sub-regions, builds the lane mask for every ragged boundary, and invokes
//! the right kernel for each piece, so that every point in the region is
//! written exactly once.
//!
//! # Module Organization
//!
//! - [`program`] - the contract generated kernels implement
//! - [`bundle`] - bundle state: dependencies, scratch children, bounding boxes
//! - [`tiling`] - the nano-block decomposition (the hot path)
//! - [`stage`] - barrier-delimited groups of bundles with one step condition
//! - [`dispatch`] - micro-block orchestration and outer-thread fan-out
//! - [`vars`] - the storage-layer contract and dirty tracking
//! - [`settings`] / [`context`] - tuning knobs and per-rank shared state
//!
//! # Dispatch Design
//!
//! Kernel calls are monomorphized over the concrete generated program type
//! (`BundleDriver<P>`); only the dependency graph and stage iteration use
//! dynamic dispatch (`dyn Bundle<C>`). The hot loop never allocates and
//! never takes a lock.
//!
//! # Concurrency Model
//!
//! Two cooperative levels: outer threads partition independent nano-blocks
//! and own a private slice of every scratch var; inner threads parallelize
//! within one nano-block and belong to the generated code. Stages are
//! barriers; within a stage, bundles reorder freely subject to the
//! dependency DAG and scratch-child-before-parent ordering.

pub mod bundle;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod program;
pub mod settings;
pub mod stage;
pub mod tiling;
pub mod vars;

#[cfg(test)]
pub mod test;

pub use bundle::{find_write_halos, Bundle, BundleDriver, BundleId};
pub use context::SolutionContext;
pub use dispatch::{calc_micro_block, nano_block_loop, run_micro_blocks};
pub use error::{Error, Result};
pub use program::BundleProgram;
pub use settings::KernelSettings;
pub use stage::{Stage, Timer, WorkStats};
pub use vars::{DirtyFlags, DirtyView, StencilVar, VarRef};
