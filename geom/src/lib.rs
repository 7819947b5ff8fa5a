//! Geometry primitives for the lattica stencil engine.
//!
//! Everything in this crate is element-granular integer math: signed index
//! tuples, floor-division helpers that stay correct inside halos (negative
//! coordinates), rectilinear bounding boxes, the `ScanIndices` carrier that
//! drives tiled traversal, and the SIMD fold/cluster geometry that the
//! execution core tiles against.
//!
//! # Module Organization
//!
//! - [`indices`] - `Indices` tuples, floor math, lane-mask and dim-set helpers
//! - [`bbox`] - `BoundingBox` and `BBList` covers
//! - [`scan`] - `ScanIndices` and tiled point traversal
//! - [`fold`] - vector fold / cluster shapes and lane enumeration

pub mod bbox;
pub mod error;
pub mod fold;
pub mod indices;
pub mod scan;

pub use bbox::{BBList, BoundingBox};
pub use error::{Error, Result};
pub use fold::FoldGeometry;
pub use indices::{
    dim_combos, idiv_flr, imod_flr, is_bit_set, round_down_flr, round_up_flr, set_bit, DimSet, Idx, Indices, LaneMask,
    ALL_LANES,
};
pub use scan::ScanIndices;
