//! Converted matrix: the source CSR data re-laid out per stripe in analyzer group order
//
// Each stripe owns disjoint windows of the three output arrays, so conversion runs one
// rayon task per stripe with no synchronization.

use crate::strategy::{Extent, Strategy, StripeSlices};
use crate::util::split_by_ranges;
use rayon::prelude::*;
use spmvgen_core::{Csr, StripeInfo};
use std::fmt;
use std::ops::Range;

/// Where one stripe's data sits in the converted arrays.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StripeLayout {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
    pub vals: Range<usize>,
}

/// Matrix data in the exact order the generated functions walk it.
///
/// For row-length grouping `rows` holds one original row index per row and `cols`/`vals`
/// hold the row's entries. For block-pattern grouping `rows`/`cols` hold one
/// `(top row, left column)` pair per block and `vals` the populated cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConvertedMatrix {
    nrows: usize,
    ncols: usize,
    rows: Vec<i32>,
    cols: Vec<i32>,
    vals: Vec<f64>,
    layouts: Vec<StripeLayout>,
}

impl ConvertedMatrix {
    #[must_use]
    pub const fn nrows(&self) -> usize {
        self.nrows
    }

    #[must_use]
    pub const fn ncols(&self) -> usize {
        self.ncols
    }

    #[must_use]
    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    #[must_use]
    pub fn rows(&self) -> &[i32] {
        &self.rows
    }

    #[must_use]
    pub fn cols(&self) -> &[i32] {
        &self.cols
    }

    #[must_use]
    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    #[must_use]
    pub fn layouts(&self) -> &[StripeLayout] {
        &self.layouts
    }
}

fn ranges(extents: &[Extent], pick: impl Fn(&Extent) -> usize) -> Vec<Range<usize>> {
    let mut start = 0usize;
    extents
        .iter()
        .map(|e| {
            let r = start..start + pick(e);
            start = r.end;
            r
        })
        .collect()
}

/// Lay out every stripe's data with `s`, one rayon task per stripe.
pub(crate) fn convert_all<S: Strategy>(
    s: &S,
    a: &Csr,
    stripes: &[StripeInfo],
    groups: &[S::Groups],
) -> ConvertedMatrix {
    let extents: Vec<Extent> =
        stripes.iter().zip(groups).map(|(stripe, g)| s.extent(stripe, g)).collect();
    let row_ranges = ranges(&extents, |e| e.rows);
    let col_ranges = ranges(&extents, |e| e.cols);
    let val_ranges = ranges(&extents, |e| e.vals);

    let total = |r: &[Range<usize>]| r.last().map_or(0, |r| r.end);
    let mut rows = vec![0i32; total(&row_ranges)];
    let mut cols = vec![0i32; total(&col_ranges)];
    let mut vals = vec![0.0f64; total(&val_ranges)];

    let row_parts = split_by_ranges(&mut rows, row_ranges.iter().cloned());
    let col_parts = split_by_ranges(&mut cols, col_ranges.iter().cloned());
    let val_parts = split_by_ranges(&mut vals, val_ranges.iter().cloned());
    groups
        .par_iter()
        .zip(row_parts)
        .zip(col_parts)
        .zip(val_parts)
        .for_each(|(((g, rows), cols), vals)| {
            s.convert(a, g, StripeSlices { rows, cols, vals });
        });

    let layouts = row_ranges
        .into_iter()
        .zip(col_ranges)
        .zip(val_ranges)
        .map(|((rows, cols), vals)| StripeLayout { rows, cols, vals })
        .collect();
    ConvertedMatrix { nrows: a.nrows, ncols: a.ncols, rows, cols, vals, layouts }
}

impl fmt::Display for ConvertedMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "converted matrix {}x{}, {} values, {} stripes",
            self.nrows,
            self.ncols,
            self.vals.len(),
            self.layouts.len()
        )?;
        for (t, l) in self.layouts.iter().enumerate() {
            writeln!(f, "stripe {t}: rows {:?} cols {:?} vals {:?}", l.rows, l.cols, l.vals)?;
            writeln!(f, "  rows: {:?}", &self.rows[l.rows.clone()])?;
            writeln!(f, "  cols: {:?}", &self.cols[l.cols.clone()])?;
            writeln!(f, "  vals: {:?}", &self.vals[l.vals.clone()])?;
        }
        Ok(())
    }
}
