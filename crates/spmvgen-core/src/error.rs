//! Error type for matrix construction and partitioning

use thiserror::Error;

/// Result alias for fallible matrix operations.
pub type Result<T> = std::result::Result<T, MatrixError>;

/// Structural problems detected in a sparse matrix or a partitioning request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("indptr length must be nrows + 1 (expected {expected}, got {got})")]
    IndptrLength { expected: usize, got: usize },

    #[error("indices and data must have equal length ({indices} vs {data})")]
    LengthMismatch { indices: usize, data: usize },

    #[error("indptr first element must be 0, got {0}")]
    IndptrStart(i32),

    #[error("indptr last element must equal nnz (last = {last}, nnz = {nnz})")]
    NnzMismatch { last: i32, nnz: usize },

    #[error("indptr must be non-decreasing (row {row}: {start} > {end})")]
    NotMonotonic { row: usize, start: i32, end: i32 },

    #[error("column index {col} out of bounds for {ncols} columns (row {row})")]
    ColumnOutOfBounds { row: usize, col: i32, ncols: usize },

    #[error("column indices must be strictly increasing within each row (row {row})")]
    UnsortedColumns { row: usize },

    #[error("entry ({row}, {col}) out of bounds for a {nrows}x{ncols} matrix")]
    EntryOutOfBounds {
        row: i64,
        col: i64,
        nrows: usize,
        ncols: usize,
    },

    #[error("{what} = {value} does not fit a 32-bit signed index")]
    IndexOverflow { what: &'static str, value: usize },

    #[error("dense input has {got} values, expected {expected}")]
    DenseShape { expected: usize, got: usize },

    #[error("lane count must be at least 1")]
    ZeroLanes,
}
