//! Tunable settings handed to every bundle evaluation.

use bon::bon;

use lattica_geom::{Idx, Indices};

/// Per-run tuning knobs for the tiling and dispatch layers.
///
/// All size tuples carry the full stencil rank (step dim first). Sizes in
/// element units; they do not need to be fold multiples.
#[derive(Debug, Clone)]
pub struct KernelSettings {
    /// Stride sizes within a nano-block (pico-blocks).
    pub pico_block_sizes: Indices,
    /// Edge lengths of the nano-blocks a micro-block is cut into.
    pub nano_block_sizes: Indices,
    /// Tile sizes inside one nano-block.
    pub nano_block_tile_sizes: Indices,
    /// Route every evaluation through the scalar reference path.
    pub force_scalar: bool,
    /// Upper bound on inner threads handed to generated kernels; 0 means no limit.
    pub thread_limit: usize,
}

#[bon]
impl KernelSettings {
    /// Build settings for a solution of the given stencil rank.
    ///
    /// Unset size tuples default to "no subdivision": pico blocks of one
    /// element and effectively unbounded nano blocks/tiles.
    #[builder]
    pub fn new(
        rank: usize,
        pico_block_sizes: Option<Indices>,
        nano_block_sizes: Option<Indices>,
        nano_block_tile_sizes: Option<Indices>,
        #[builder(default = false)] force_scalar: bool,
        #[builder(default = 0)] thread_limit: usize,
    ) -> Self {
        Self {
            pico_block_sizes: pico_block_sizes.unwrap_or_else(|| Indices::splat(rank, 1)),
            nano_block_sizes: nano_block_sizes.unwrap_or_else(|| Indices::splat(rank, Idx::MAX)),
            nano_block_tile_sizes: nano_block_tile_sizes.unwrap_or_else(|| Indices::splat(rank, Idx::MAX)),
            force_scalar,
            thread_limit,
        }
    }
}
