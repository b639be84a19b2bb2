//! COO format used as an assembly buffer before conversion to CSR

use crate::csr::Csr;
use crate::error::{MatrixError, Result};

#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct Coo<T = f64, I = i32> {
    pub data: Vec<T>,
    pub row: Vec<I>, // length nnz
    pub col: Vec<I>, // length nnz
    pub ncols: usize,
    pub nrows: usize,
}

impl<T, I> Coo<T, I> {
    #[inline]
    #[must_use]
    pub const fn nnz(&self) -> usize {
        self.data.len()
    }
    #[inline]
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }
}

impl Coo<f64, i32> {
    #[inline]
    #[must_use]
    pub fn with_capacity(nrows: usize, ncols: usize, cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
            row: Vec::with_capacity(cap),
            col: Vec::with_capacity(cap),
            ncols,
            nrows,
        }
    }

    /// Append one entry after bounds-checking it against the shape.
    pub fn push(&mut self, row: i64, col: i64, val: f64) -> Result<()> {
        let ok_i = usize::try_from(row).is_ok_and(|i| i < self.nrows);
        let ok_j = usize::try_from(col).is_ok_and(|j| j < self.ncols);
        if !ok_i || !ok_j {
            return Err(MatrixError::EntryOutOfBounds {
                row,
                col,
                nrows: self.nrows,
                ncols: self.ncols,
            });
        }
        let (Ok(r), Ok(c)) = (i32::try_from(row), i32::try_from(col)) else {
            return Err(MatrixError::IndexOverflow {
                what: "entry index",
                value: usize::try_from(row.max(col)).unwrap_or(usize::MAX),
            });
        };
        self.row.push(r);
        self.col.push(c);
        self.data.push(val);
        Ok(())
    }

    /// Row of entry `k` after checking both of its coordinates against the shape.
    fn entry_row(&self, k: usize) -> Result<usize> {
        let (i, j) = (self.row[k], self.col[k]);
        match (usize::try_from(i), usize::try_from(j)) {
            (Ok(r), Ok(c)) if r < self.nrows && c < self.ncols => Ok(r),
            _ => Err(MatrixError::EntryOutOfBounds {
                row: i64::from(i),
                col: i64::from(j),
                nrows: self.nrows,
                ncols: self.ncols,
            }),
        }
    }

    /// Convert to CSR with rows bucketed by a counting pass, columns sorted within each
    /// row and duplicate coordinates summed in insertion order.
    pub fn to_csr(&self) -> Result<Csr<f64, i32>> {
        let nrows = self.nrows;
        let nnz = self.nnz();
        for len in [self.row.len(), self.col.len()] {
            if len != nnz {
                return Err(MatrixError::LengthMismatch { indices: len, data: nnz });
            }
        }
        // reject before sizing anything from the shape
        for (what, value) in [("nrows", nrows), ("ncols", self.ncols), ("nnz", nnz)] {
            if i32::try_from(value).is_err() {
                return Err(MatrixError::IndexOverflow { what, value });
            }
        }

        let mut counts = vec![0usize; nrows + 1];
        for k in 0..nnz {
            counts[self.entry_row(k)? + 1] += 1;
        }
        for r in 0..nrows {
            counts[r + 1] += counts[r];
        }

        let mut next = counts.clone();
        let mut order = vec![0usize; nnz];
        for k in 0..nnz {
            let slot = &mut next[self.entry_row(k)?];
            order[*slot] = k;
            *slot += 1;
        }

        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut data = Vec::with_capacity(nnz);
        indptr.push(0i32);
        for r in 0..nrows {
            let bucket = &mut order[counts[r]..counts[r + 1]];
            // stable, so duplicates are summed in the order they were pushed
            bucket.sort_by_key(|&k| self.col[k]);
            let mut last_col = None;
            for &k in bucket.iter() {
                let j = self.col[k];
                if last_col == Some(j) {
                    if let Some(acc) = data.last_mut() {
                        *acc += self.data[k];
                    }
                } else {
                    indices.push(j);
                    data.push(self.data[k]);
                    last_col = Some(j);
                }
            }
            let end = i32::try_from(data.len())
                .map_err(|_| MatrixError::IndexOverflow { what: "nnz", value: data.len() })?;
            indptr.push(end);
        }

        Csr::from_parts(nrows, self.ncols, indptr, indices, data, true)
    }
}
