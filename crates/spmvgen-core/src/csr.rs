//! CSR format definitions, constructors and structural validation

use crate::error::{MatrixError, Result};

/// Compressed sparse row matrix.
///
/// `indptr` has `nrows + 1` entries; row `i` owns `indices[indptr[i]..indptr[i + 1]]`
/// and the matching slice of `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct Csr<T = f64, I = i32> {
    pub nrows: usize,
    pub ncols: usize,
    pub indptr: Vec<I>,
    pub indices: Vec<I>,
    pub data: Vec<T>,
}

impl<T, I> Csr<T, I> {
    pub fn shape(&self) -> (usize, usize) { (self.nrows, self.ncols) }
    pub fn nnz(&self) -> usize { self.data.len() }
}

#[inline]
fn i32_to_usize(x: i32) -> usize {
    debug_assert!(x >= 0);
    #[allow(clippy::cast_sign_loss)]
    {
        x as usize
    }
}

#[inline]
fn to_i32(what: &'static str, value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| MatrixError::IndexOverflow { what, value })
}

#[inline]
fn fits_i32(what: &'static str, value: usize) -> Result<()> {
    to_i32(what, value).map(|_| ())
}

impl Csr<f64, i32> {
    /// Build a matrix from raw parts.
    ///
    /// Shape-level invariants (lengths, `indptr[0] == 0`, `indptr[n] == nnz`) are always
    /// checked. With `check` set, every row is also checked for monotone offsets and
    /// strictly increasing, in-bounds column indices.
    pub fn from_parts(
        nrows: usize,
        ncols: usize,
        indptr: Vec<i32>,
        indices: Vec<i32>,
        data: Vec<f64>,
        check: bool,
    ) -> Result<Self> {
        let csr = Csr { nrows, ncols, indptr, indices, data };
        csr.check_shape()?;
        if check {
            csr.check_rows()?;
        }
        Ok(csr)
    }

    #[must_use]
    pub const fn from_parts_unchecked(
        nrows: usize,
        ncols: usize,
        indptr: Vec<i32>,
        indices: Vec<i32>,
        data: Vec<f64>,
    ) -> Self {
        Csr { nrows, ncols, indptr, indices, data }
    }

    /// Build a CSR matrix from a row-major dense buffer, dropping exact zeros.
    pub fn from_dense(nrows: usize, ncols: usize, dense: &[f64]) -> Result<Self> {
        let expected = nrows.saturating_mul(ncols);
        if dense.len() != expected {
            return Err(MatrixError::DenseShape { expected, got: dense.len() });
        }
        fits_i32("ncols", ncols)?;
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0i32);
        for row in dense.chunks(ncols.max(1)).take(nrows) {
            for (j, &x) in row.iter().enumerate() {
                if x != 0.0 {
                    indices.push(to_i32("column", j)?);
                    data.push(x);
                }
            }
            indptr.push(to_i32("nnz", data.len())?);
        }
        // zero-column matrices never enter the loop above
        indptr.resize(nrows + 1, 0);
        Self::from_parts(nrows, ncols, indptr, indices, data, true)
    }

    /// Run every structural check. The specializer calls this before any offset
    /// arithmetic is derived from the matrix.
    pub fn validate(&self) -> Result<()> {
        self.check_shape()?;
        self.check_rows()
    }

    fn check_shape(&self) -> Result<()> {
        fits_i32("nrows", self.nrows)?;
        fits_i32("ncols", self.ncols)?;
        fits_i32("nnz", self.indices.len())?;
        if self.indptr.len() != self.nrows + 1 {
            return Err(MatrixError::IndptrLength {
                expected: self.nrows + 1,
                got: self.indptr.len(),
            });
        }
        if self.indices.len() != self.data.len() {
            return Err(MatrixError::LengthMismatch {
                indices: self.indices.len(),
                data: self.data.len(),
            });
        }
        let first = self.indptr[0];
        if first != 0 {
            return Err(MatrixError::IndptrStart(first));
        }
        let last = self.indptr[self.nrows];
        if usize::try_from(last).ok() != Some(self.nnz()) {
            return Err(MatrixError::NnzMismatch { last, nnz: self.nnz() });
        }
        Ok(())
    }

    fn check_rows(&self) -> Result<()> {
        for (row, w) in self.indptr.windows(2).enumerate() {
            if w[0] > w[1] {
                return Err(MatrixError::NotMonotonic { row, start: w[0], end: w[1] });
            }
        }
        for row in 0..self.nrows {
            let mut prev_col = -1i32;
            for &j in self.row_indices(row) {
                if j < 0 || i32_to_usize(j) >= self.ncols {
                    return Err(MatrixError::ColumnOutOfBounds { row, col: j, ncols: self.ncols });
                }
                if j <= prev_col {
                    return Err(MatrixError::UnsortedColumns { row });
                }
                prev_col = j;
            }
        }
        Ok(())
    }

    /// Offsets of row `i` into `indices`/`data`.
    #[inline]
    #[must_use]
    pub fn row_range(&self, i: usize) -> std::ops::Range<usize> {
        i32_to_usize(self.indptr[i])..i32_to_usize(self.indptr[i + 1])
    }

    #[inline]
    #[must_use]
    pub fn row_len(&self, i: usize) -> usize {
        let r = self.row_range(i);
        r.end - r.start
    }

    #[inline]
    #[must_use]
    pub fn row_indices(&self, i: usize) -> &[i32] {
        &self.indices[self.row_range(i)]
    }

    #[inline]
    #[must_use]
    pub fn row_data(&self, i: usize) -> &[f64] {
        &self.data[self.row_range(i)]
    }

    /// Nonzero count of every row, in row order.
    pub fn row_lengths(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.indptr.windows(2).map(|w| i32_to_usize(w[1]) - i32_to_usize(w[0]))
    }
}
