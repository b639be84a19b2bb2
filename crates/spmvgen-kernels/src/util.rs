//! Index conversions and disjoint-slice helpers shared by the specializer stages
//
// Matrices are validated to fit 32-bit signed indices before any stage runs, so the
// narrowing conversions here only debug-assert their range.

use std::ops::Range;

/// Minimum nonzero count per task for the reference kernel's parallel path
pub const ROW_RANGE_TARGET_NNZ: usize = 128 * 1024;
/// Below this many nonzeros the reference kernel stays sequential
pub const SMALL_NNZ_LIMIT: usize = 32 * 1024;

/// Convert i32 to usize, asserting non-negativity.
#[inline]
#[must_use]
pub fn i32_to_usize(x: i32) -> usize {
    debug_assert!(x >= 0);
    #[allow(clippy::cast_sign_loss)]
    {
        x as usize
    }
}

/// Convert usize to i32, asserting the value fits.
#[inline]
#[must_use]
pub fn usize_to_i32(x: usize) -> i32 {
    debug_assert!(i32::try_from(x).is_ok());
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    {
        x as i32
    }
}

/// Split `data` into consecutive mutable pieces, one per range.
///
/// Ranges must be contiguous and start at 0; their union must not exceed `data`.
#[must_use]
pub fn split_by_ranges<'a, T, It>(mut data: &'a mut [T], ranges: It) -> Vec<&'a mut [T]>
where
    It: IntoIterator<Item = Range<usize>>,
{
    let mut parts = Vec::new();
    let mut consumed = 0usize;
    for r in ranges {
        debug_assert_eq!(r.start, consumed, "ranges must be contiguous");
        let (head, tail) = std::mem::take(&mut data).split_at_mut(r.end - r.start);
        parts.push(head);
        data = tail;
        consumed = r.end;
    }
    parts
}

/// Row ranges whose nonzero counts reach `target`, used to spread the reference
/// kernel over rayon tasks.
#[must_use]
pub fn nnz_row_ranges(indptr: &[i32], target: usize) -> Vec<(usize, usize)> {
    let nrows = indptr.len().saturating_sub(1);
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut acc = 0usize;
    let mut r0 = 0usize;
    for i in 0..nrows {
        let row_nnz = i32_to_usize(indptr[i + 1]) - i32_to_usize(indptr[i]);
        if acc == 0 {
            r0 = i;
        }
        acc += row_nnz;
        if acc >= target {
            ranges.push((r0, i + 1));
            acc = 0;
        }
    }
    if acc > 0 {
        ranges.push((r0, nrows));
    }
    ranges
}
