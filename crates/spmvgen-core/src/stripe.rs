//! Nonzero-balanced row stripes, one per execution lane
//
// Generated-code cost scales with nonzeros rather than rows, so stripe boundaries are
// placed at the row boundary closest to each `t * nnz / lanes` target. Rows are never
// split: a stripe is a contiguous row range plus the value range those rows own.

use crate::csr::Csr;
use crate::error::{MatrixError, Result};
use std::ops::Range;

/// One lane's share of the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StripeInfo {
    pub row_begin: usize,
    pub row_end: usize,
    pub val_begin: usize,
    pub val_end: usize,
}

impl StripeInfo {
    #[inline]
    #[must_use]
    pub const fn rows(&self) -> Range<usize> {
        self.row_begin..self.row_end
    }

    #[inline]
    #[must_use]
    pub const fn vals(&self) -> Range<usize> {
        self.val_begin..self.val_end
    }

    #[inline]
    #[must_use]
    pub const fn nrows(&self) -> usize {
        self.row_end - self.row_begin
    }

    #[inline]
    #[must_use]
    pub const fn nnz(&self) -> usize {
        self.val_end - self.val_begin
    }

    /// A stripe with no rows still gets a (no-op) generated function.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.row_begin == self.row_end
    }
}

#[inline]
fn offset(indptr: &[i32], row: usize) -> usize {
    usize::try_from(indptr[row]).unwrap_or(0)
}

/// First row boundary at or after `lo` whose offset reaches `goal`, nudged back one row
/// when the previous boundary lands closer to the goal.
fn split_point(indptr: &[i32], lo: usize, goal: usize) -> usize {
    let k = indptr[lo..].partition_point(|&p| usize::try_from(p).unwrap_or(0) < goal);
    let mut r = (lo + k).min(indptr.len() - 1);
    if r > lo {
        let below = goal - offset(indptr, r - 1);
        let above = offset(indptr, r).saturating_sub(goal);
        if below < above {
            r -= 1;
        }
    }
    r
}

/// Split `a` into exactly `lanes` stripes balanced by nonzero count.
///
/// Stripes cover `[0, nrows)` and `[0, nnz)` exactly once, in order. When there are
/// fewer rows than lanes the surplus stripes are empty.
pub fn partition(a: &Csr<f64, i32>, lanes: usize) -> Result<Vec<StripeInfo>> {
    if lanes == 0 {
        return Err(MatrixError::ZeroLanes);
    }
    let n = a.nrows;
    let nnz = a.nnz();
    let mut stripes = Vec::with_capacity(lanes);
    let mut row_begin = 0usize;
    for t in 0..lanes {
        let row_end = if t + 1 == lanes {
            n
        } else {
            let goal = nnz * (t + 1) / lanes;
            split_point(&a.indptr, row_begin, goal)
        };
        stripes.push(StripeInfo {
            row_begin,
            row_end,
            val_begin: offset(&a.indptr, row_begin),
            val_end: offset(&a.indptr, row_end),
        });
        row_begin = row_end;
    }
    Ok(stripes)
}

impl Csr<f64, i32> {
    /// See [`partition`].
    pub fn stripes(&self, lanes: usize) -> Result<Vec<StripeInfo>> {
        partition(self, lanes)
    }
}
