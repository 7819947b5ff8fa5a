//! Signed index tuples and the integer helpers behind tiling math.
//!
//! Stencil coordinates are signed: a nano-block that reaches into a halo has
//! negative begin indices, so every rounding helper here uses floor-division
//! semantics (`div_euclid`) rather than truncation. Getting this wrong shifts
//! vector-aligned boundaries by one whole fold on the low side of the domain.

use std::fmt;
use std::ops::{Index, IndexMut};

use itertools::Itertools;
use smallvec::SmallVec;

/// Element index type. Signed so halo coordinates stay representable.
pub type Idx = i64;

/// One bit per lane of the N-D vector fold.
///
/// Fold geometry is validated to at most 64 lanes, so a `u64` always fits.
pub type LaneMask = u64;

/// Mask with every lane active.
pub const ALL_LANES: LaneMask = !0;

/// A set of domain dims, one bit per dim.
pub type DimSet = u64;

/// Floor division: rounds toward negative infinity. `b` must be positive.
#[inline]
pub fn idiv_flr(a: Idx, b: Idx) -> Idx {
    debug_assert!(b > 0, "idiv_flr divisor must be positive, got {b}");
    a.div_euclid(b)
}

/// Floor modulus: result is in `[0, b)`. `b` must be positive.
#[inline]
pub fn imod_flr(a: Idx, b: Idx) -> Idx {
    debug_assert!(b > 0, "imod_flr divisor must be positive, got {b}");
    a.rem_euclid(b)
}

/// Round `a` down to a multiple of `mult` (toward negative infinity).
#[inline]
pub fn round_down_flr(a: Idx, mult: Idx) -> Idx {
    a - imod_flr(a, mult)
}

/// Round `a` up to a multiple of `mult` (toward positive infinity).
#[inline]
pub fn round_up_flr(a: Idx, mult: Idx) -> Idx {
    round_down_flr(a + mult - 1, mult)
}

/// Set bit `pos` in a dim set.
#[inline]
pub fn set_bit(bits: &mut DimSet, pos: usize) {
    *bits |= 1 << pos;
}

/// Test bit `pos` in a dim set.
#[inline]
pub fn is_bit_set(bits: DimSet, pos: usize) -> bool {
    bits & (1 << pos) != 0
}

/// Enumerate every `k`-subset of `n` dims as a [`DimSet`].
///
/// Subsets are produced in lexicographic order of their member dims, so the
/// boundary-region walk in the core is deterministic.
pub fn dim_combos(n: usize, k: usize) -> Vec<DimSet> {
    (0..n).combinations(k).map(|dims| dims.into_iter().fold(0, |set, d| set | (1 << d))).collect()
}

/// A fixed-length tuple of signed indices, one per stencil dim.
///
/// The length equals the rank fixed at solution construction: the step dim
/// at position 0 followed by the domain dims. Backed by a `SmallVec` so the
/// common ranks (≤ 4 domain dims) never touch the heap.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Indices {
    vals: SmallVec<[Idx; 5]>,
}

impl Indices {
    /// All-zero tuple of the given rank.
    pub fn new(rank: usize) -> Self {
        Self { vals: SmallVec::from_elem(0, rank) }
    }

    /// Tuple of the given rank with every element set to `val`.
    pub fn splat(rank: usize, val: Idx) -> Self {
        Self { vals: SmallVec::from_elem(val, rank) }
    }

    pub fn from_slice(vals: &[Idx]) -> Self {
        Self { vals: SmallVec::from_slice(vals) }
    }

    /// Number of dims in this tuple.
    pub fn rank(&self) -> usize {
        self.vals.len()
    }

    pub fn as_slice(&self) -> &[Idx] {
        &self.vals
    }

    /// Overwrite every element with `val`.
    pub fn set_all(&mut self, val: Idx) {
        self.vals.iter_mut().for_each(|v| *v = val);
    }

    /// Element-wise sum.
    pub fn add_elements(&self, other: &Self) -> Self {
        debug_assert_eq!(self.rank(), other.rank());
        Self { vals: self.vals.iter().zip(&other.vals).map(|(a, b)| a + b).collect() }
    }

    /// Element-wise difference.
    pub fn sub_elements(&self, other: &Self) -> Self {
        debug_assert_eq!(self.rank(), other.rank());
        Self { vals: self.vals.iter().zip(&other.vals).map(|(a, b)| a - b).collect() }
    }

    /// Element-wise minimum.
    pub fn min_elements(&self, other: &Self) -> Self {
        debug_assert_eq!(self.rank(), other.rank());
        Self { vals: self.vals.iter().zip(&other.vals).map(|(a, b)| (*a).min(*b)).collect() }
    }

    /// Element-wise maximum.
    pub fn max_elements(&self, other: &Self) -> Self {
        debug_assert_eq!(self.rank(), other.rank());
        Self { vals: self.vals.iter().zip(&other.vals).map(|(a, b)| (*a).max(*b)).collect() }
    }

    /// Product of all elements.
    pub fn product(&self) -> Idx {
        self.vals.iter().product()
    }
}

impl Index<usize> for Indices {
    type Output = Idx;

    #[inline]
    fn index(&self, i: usize) -> &Idx {
        &self.vals[i]
    }
}

impl IndexMut<usize> for Indices {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut Idx {
        &mut self.vals[i]
    }
}

impl From<Vec<Idx>> for Indices {
    fn from(vals: Vec<Idx>) -> Self {
        Self { vals: SmallVec::from_vec(vals) }
    }
}

impl<const N: usize> From<[Idx; N]> for Indices {
    fn from(vals: [Idx; N]) -> Self {
        Self::from_slice(&vals)
    }
}

// Index tuples show up in traces constantly; Debug matches Display instead
// of the derive's struct form.
impl fmt::Debug for Indices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Indices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.vals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}
