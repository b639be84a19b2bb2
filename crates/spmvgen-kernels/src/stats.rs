//! Structural statistics of a matrix: row-length distribution and stripe balance
//
// Row lengths are reduced in parallel chunks; mean and deviation come from a SIMD
// sum / sum-of-squares pass and distinct lengths from per-thread sets merged at the end.

use rayon::prelude::*;
use spmvgen_core::{Csr, StripeInfo};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use thread_local::ThreadLocal;
use wide::f64x4;

const STATS_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixStats {
    pub nrows: usize,
    pub ncols: usize,
    pub nnz: usize,
    pub empty_rows: usize,
    pub min_row_len: usize,
    pub max_row_len: usize,
    pub mean_row_len: f64,
    /// Population standard deviation of the row lengths.
    pub std_row_len: f64,
    pub distinct_row_lens: usize,
    pub stripe_nnz: Vec<usize>,
}

#[inline]
fn chunk_sum_sum2(chunk: &[f64]) -> (f64, f64) {
    let mut acc = f64x4::from([0.0; 4]);
    let mut acc2 = f64x4::from([0.0; 4]);
    let mut i = 0usize;
    let limit4 = chunk.len() & !3;
    while i < limit4 {
        let v = f64x4::from([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]]);
        acc += v;
        acc2 += v * v;
        i += 4;
    }
    let arr = acc.to_array();
    let mut s = arr[0] + arr[1] + arr[2] + arr[3];
    let arr2 = acc2.to_array();
    let mut s2 = arr2[0] + arr2[1] + arr2[2] + arr2[3];
    while i < chunk.len() {
        let x = chunk[i];
        s += x;
        s2 += x * x;
        i += 1;
    }
    (s, s2)
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn matrix_stats(a: &Csr, stripes: &[StripeInfo]) -> MatrixStats {
    let lens: Vec<usize> = a.row_lengths().collect();
    let lens_f: Vec<f64> = lens.iter().map(|&l| l as f64).collect();

    let (s, s2) = lens_f
        .par_chunks(STATS_CHUNK)
        .map(chunk_sum_sum2)
        .reduce(|| (0.0, 0.0), |x, y| (x.0 + y.0, x.1 + y.1));
    let (min_row_len, max_row_len, empty_rows) = lens
        .par_iter()
        .map(|&l| (l, l, usize::from(l == 0)))
        .reduce(
            || (usize::MAX, 0, 0),
            |x, y| (x.0.min(y.0), x.1.max(y.1), x.2 + y.2),
        );

    let tls: ThreadLocal<RefCell<BTreeSet<usize>>> = ThreadLocal::new();
    lens.par_chunks(STATS_CHUNK).for_each(|chunk| {
        let mut seen = tls.get_or(|| RefCell::new(BTreeSet::new())).borrow_mut();
        seen.extend(chunk.iter().copied());
    });
    let mut distinct = BTreeSet::new();
    for cell in tls {
        distinct.append(&mut cell.into_inner());
    }

    let n = a.nrows;
    let (mean, std) = if n == 0 {
        (0.0, 0.0)
    } else {
        let nf = n as f64;
        let mean = s / nf;
        let var = (s2 / nf - mean * mean).max(0.0);
        (mean, var.sqrt())
    };

    MatrixStats {
        nrows: n,
        ncols: a.ncols,
        nnz: a.nnz(),
        empty_rows,
        min_row_len: if n == 0 { 0 } else { min_row_len },
        max_row_len,
        mean_row_len: mean,
        std_row_len: std,
        distinct_row_lens: distinct.len(),
        stripe_nnz: stripes.iter().map(StripeInfo::nnz).collect(),
    }
}

impl fmt::Display for MatrixStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rows:            {}", self.nrows)?;
        writeln!(f, "columns:         {}", self.ncols)?;
        writeln!(f, "nonzeros:        {}", self.nnz)?;
        writeln!(f, "empty rows:      {}", self.empty_rows)?;
        writeln!(
            f,
            "row length:      min {} max {} mean {:.3} std {:.3}",
            self.min_row_len, self.max_row_len, self.mean_row_len, self.std_row_len
        )?;
        writeln!(f, "distinct lengths: {}", self.distinct_row_lens)?;
        write!(f, "stripe nonzeros: {:?}", self.stripe_nnz)
    }
}
