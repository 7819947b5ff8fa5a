//! Rectilinear bounding boxes over the domain dims.
//!
//! A bundle carries one outer box plus a list of non-overlapping interior
//! boxes covering its valid sub-domain. Boxes use exclusive `end` indices;
//! the derived fields (`len`, `num_points`, `is_valid`) are recomputed by
//! [`BoundingBox::update_lengths`] after any mutation of the bounds.

use std::fmt;

use crate::indices::{Idx, Indices};

/// An axis-aligned box over the domain dims. `end` is exclusive.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub begin: Indices,
    pub end: Indices,
    pub len: Indices,
    pub num_points: Idx,
    /// Whether every point inside the box is in the valid sub-domain.
    pub is_full: bool,
    /// True iff every length is non-negative.
    pub is_valid: bool,
}

impl BoundingBox {
    /// An empty (zero-size) box of the given domain rank.
    pub fn new(ndims: usize) -> Self {
        let mut bb =
            Self { begin: Indices::new(ndims), end: Indices::new(ndims), len: Indices::new(ndims), num_points: 0, is_full: false, is_valid: false };
        bb.update_lengths();
        bb
    }

    pub fn from_begin_end(begin: Indices, end: Indices) -> Self {
        debug_assert_eq!(begin.rank(), end.rank());
        let mut bb = Self { begin, end, len: Indices::default(), num_points: 0, is_full: false, is_valid: false };
        bb.update_lengths();
        bb
    }

    /// Number of domain dims.
    pub fn ndims(&self) -> usize {
        self.begin.rank()
    }

    /// Recompute `len`, `num_points`, and `is_valid` from the bounds.
    pub fn update_lengths(&mut self) {
        self.len = self.end.sub_elements(&self.begin);
        self.is_valid = self.len.as_slice().iter().all(|&l| l >= 0);
        self.num_points = if self.is_valid { self.len.product() } else { 0 };
    }

    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// Whether `pt` (domain dims) lies inside this box.
    pub fn contains(&self, pt: &Indices) -> bool {
        debug_assert_eq!(pt.rank(), self.ndims());
        (0..self.ndims()).all(|j| pt[j] >= self.begin[j] && pt[j] < self.end[j])
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        (0..self.ndims()).all(|j| other.begin[j] >= self.begin[j] && other.end[j] <= self.end[j])
    }

    /// Whether this box and `other` share at least one point.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        (0..self.ndims()).all(|j| self.begin[j] < other.end[j] && other.begin[j] < self.end[j])
    }

    /// Grow this box to enclose `other`. An empty box takes `other`'s bounds.
    pub fn union_with(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.begin = other.begin.clone();
            self.end = other.end.clone();
        } else {
            self.begin = self.begin.min_elements(&other.begin);
            self.end = self.end.max_elements(&other.end);
        }
        self.update_lengths();
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.begin, self.end)
    }
}

impl fmt::Debug for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A list of pairwise-disjoint boxes covering a bundle's valid sub-domain.
#[derive(Clone, Debug, Default)]
pub struct BBList(pub Vec<BoundingBox>);

impl BBList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoundingBox> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, bb: BoundingBox) {
        self.0.push(bb);
    }

    /// Total points across all boxes. With the disjointness invariant this
    /// is the size of the covered set.
    pub fn num_points(&self) -> Idx {
        self.0.iter().map(|bb| bb.num_points).sum()
    }

    /// Check the pairwise-disjointness invariant. Quadratic; test-time use.
    pub fn is_disjoint(&self) -> bool {
        for (i, a) in self.0.iter().enumerate() {
            for b in &self.0[i + 1..] {
                if a.intersects(b) {
                    return false;
                }
            }
        }
        true
    }
}

impl<'a> IntoIterator for &'a BBList {
    type Item = &'a BoundingBox;
    type IntoIter = std::slice::Iter<'a, BoundingBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
