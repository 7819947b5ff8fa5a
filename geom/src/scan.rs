//! The `ScanIndices` carrier that drives tiled iteration.
//!
//! A carrier describes one level of a tiled sweep: `begin`/`end` bound the
//! whole sweep, `start`/`stop` bound the tile currently being visited,
//! `stride` is the step per iteration, `tile_size` groups points into tiles,
//! and `align`/`align_ofs` define the grid that `start` is rounded onto.
//! Nested levels are seeded with [`ScanIndices::create_inner`]: the child's
//! sweep is exactly the parent's current tile.

use std::fmt;

use crate::indices::{round_down_flr, Idx, Indices};

/// Index carrier for one level of a tiled N-D sweep.
///
/// All eight tuples have the full stencil rank (step dim at position 0).
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ScanIndices {
    /// First index of the whole sweep, per dim.
    pub begin: Indices,
    /// One past the last index of the whole sweep, per dim.
    pub end: Indices,
    /// First index of the current tile, per dim.
    pub start: Indices,
    /// One past the last index of the current tile, per dim.
    pub stop: Indices,
    /// Step per iteration, per dim.
    pub stride: Indices,
    /// Tile edge lengths subdividing the sweep, per dim.
    pub tile_size: Indices,
    /// Alignment grid, per dim.
    pub align: Indices,
    /// Offset of the alignment grid, per dim.
    pub align_ofs: Indices,
}

impl ScanIndices {
    /// New carrier of the given rank: empty bounds, unit stride/tile/align.
    pub fn new(rank: usize) -> Self {
        Self {
            begin: Indices::new(rank),
            end: Indices::new(rank),
            start: Indices::new(rank),
            stop: Indices::new(rank),
            stride: Indices::splat(rank, 1),
            tile_size: Indices::splat(rank, 1),
            align: Indices::splat(rank, 1),
            align_ofs: Indices::new(rank),
        }
    }

    /// Carrier spanning `[begin, end)` in one tile with unit stride.
    pub fn from_range(begin: Indices, end: Indices) -> Self {
        let rank = begin.rank();
        let mut si = Self::new(rank);
        si.begin = begin.clone();
        si.end = end.clone();
        si.start = begin;
        si.stop = end;
        for d in 0..rank {
            si.stride[d] = (si.end[d] - si.begin[d]).max(1);
            si.tile_size[d] = si.stride[d];
        }
        si
    }

    /// Number of dims.
    pub fn rank(&self) -> usize {
        self.begin.rank()
    }

    /// Seed a child sweep over this carrier's current tile.
    ///
    /// The child's `begin/end` are this carrier's `start/stop`; its stride
    /// and tile span the whole child range (callers narrow them as needed);
    /// alignment is inherited.
    pub fn create_inner(&self) -> Self {
        let rank = self.rank();
        let mut inner = Self::new(rank);
        inner.begin = self.start.clone();
        inner.end = self.stop.clone();
        inner.start = self.start.clone();
        inner.stop = self.stop.clone();
        for d in 0..rank {
            inner.stride[d] = (inner.end[d] - inner.begin[d]).max(1);
            inner.tile_size[d] = inner.stride[d];
        }
        inner.align = self.align.clone();
        inner.align_ofs = self.align_ofs.clone();
        inner
    }

    /// Set per-dim strides to `inner_sizes * mult`, clamped to at least 1.
    pub fn set_strides_from_inner(&mut self, inner_sizes: &Indices, mult: Idx) {
        debug_assert_eq!(inner_sizes.rank(), self.rank());
        for d in 0..self.rank() {
            self.stride[d] = (inner_sizes[d] * mult).max(1);
        }
    }

    /// Round `start` down onto the alignment grid, but not below `begin`.
    pub fn align_start(&mut self) {
        for d in 0..self.rank() {
            let ofs = self.align_ofs[d];
            let aligned = round_down_flr(self.start[d] - ofs, self.align[d]) + ofs;
            self.start[d] = aligned.max(self.begin[d]);
        }
    }

    /// Visit every lattice point in `[start, stop)` with the carrier's
    /// stride, in lexicographic dim order (dim 0 outermost).
    ///
    /// The body sees each point exactly once; `tile_size` grouping is
    /// applied by [`ScanIndices::for_each_tile`], not here.
    pub fn for_each_point(&self, f: &mut impl FnMut(&Indices)) {
        let rank = self.rank();
        let mut pt = self.start.clone();
        self.walk_dim(0, rank, &mut pt, f);
    }

    fn walk_dim(&self, d: usize, rank: usize, pt: &mut Indices, f: &mut impl FnMut(&Indices)) {
        if d == rank {
            f(pt);
            return;
        }
        let mut v = self.start[d];
        while v < self.stop[d] {
            pt[d] = v;
            self.walk_dim(d + 1, rank, pt, f);
            v = v.saturating_add(self.stride[d]);
        }
    }

    /// Visit `[start, stop)` tile by tile. Each call of the body receives a
    /// child carrier whose `start/stop` bound one tile of `tile_size`.
    ///
    /// Tiles are visited in lexicographic order; traversal order inside a
    /// tile is up to the body.
    pub fn for_each_tile(&self, f: &mut impl FnMut(&ScanIndices)) {
        let rank = self.rank();
        let mut tile = self.clone();
        self.walk_tiles(0, rank, &mut tile, f);
    }

    fn walk_tiles(&self, d: usize, rank: usize, tile: &mut ScanIndices, f: &mut impl FnMut(&ScanIndices)) {
        if d == rank {
            f(tile);
            return;
        }
        let size = self.tile_size[d].max(1);
        let mut v = self.start[d];
        while v < self.stop[d] {
            tile.start[d] = v;
            tile.stop[d] = v.saturating_add(size).min(self.stop[d]);
            self.walk_tiles(d + 1, rank, tile, f);
            v = v.saturating_add(size);
        }
    }

    /// Render `[start..stop)` (or `[begin..end)`) for trace output.
    pub fn make_range_str(&self, cur_tile: bool) -> String {
        if cur_tile {
            format!("[{}..{})", self.start, self.stop)
        } else {
            format!("[{}..{})", self.begin, self.end)
        }
    }
}

impl fmt::Display for ScanIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.make_range_str(true))
    }
}

impl fmt::Debug for ScanIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanIndices {{ sweep {} cur {} stride {} tile {} }}", self.make_range_str(false), self.make_range_str(true), self.stride, self.tile_size)
    }
}
