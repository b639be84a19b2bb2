//! Generic-loop CSR multiply used to verify generated code.
//
// Accumulation order matches the row-length functions (row sum first, then one add into
// `w`), so their results agree bit for bit.

#![allow(
    clippy::many_single_char_names,
    reason = "Math kernels conventionally use i/j/p to denote indices and pointers"
)]

use crate::error::{Result, SpecializeError};
use crate::util::{i32_to_usize, nnz_row_ranges, ROW_RANGE_TARGET_NNZ, SMALL_NNZ_LIMIT};
use rayon::prelude::*;
use spmvgen_core::Csr;

pub(crate) fn check_lengths(nrows: usize, ncols: usize, v: &[f64], w: &[f64]) -> Result<()> {
    if v.len() < ncols {
        return Err(SpecializeError::VectorLength { which: "v", expected: ncols, got: v.len() });
    }
    if w.len() < nrows {
        return Err(SpecializeError::VectorLength { which: "w", expected: nrows, got: w.len() });
    }
    Ok(())
}

#[inline]
fn row_dot(a: &Csr, v: &[f64], i: usize) -> f64 {
    let mut sum = 0.0f64;
    for p in a.row_range(i) {
        let j = i32_to_usize(a.indices[p]);
        sum += a.data[p] * v[j];
    }
    sum
}

/// `w += A v`, one row at a time.
pub fn multiply(a: &Csr, v: &[f64], w: &mut [f64]) -> Result<()> {
    check_lengths(a.nrows, a.ncols, v, w)?;
    for (i, wi) in w.iter_mut().enumerate().take(a.nrows) {
        *wi += row_dot(a, v, i);
    }
    Ok(())
}

/// `w += A v` with rows spread over rayon tasks of roughly equal nonzero count.
pub fn multiply_parallel(a: &Csr, v: &[f64], w: &mut [f64]) -> Result<()> {
    if a.nnz() <= SMALL_NNZ_LIMIT {
        return multiply(a, v, w);
    }
    check_lengths(a.nrows, a.ncols, v, w)?;
    let ranges = nnz_row_ranges(&a.indptr, ROW_RANGE_TARGET_NNZ);
    let w_addr = w.as_mut_ptr() as usize;
    ranges.into_par_iter().for_each(|(r0, r1)| {
        let w_ptr = w_addr as *mut f64;
        for i in r0..r1 {
            let sum = row_dot(a, v, i);
            // SAFETY: row ranges are disjoint and within `w` (checked above).
            unsafe {
                *w_ptr.add(i) += sum;
            }
        }
    });
    Ok(())
}
