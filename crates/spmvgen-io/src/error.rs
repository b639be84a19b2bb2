//! Error type for Matrix Market IO

use spmvgen_core::MatrixError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MtxError>;

#[derive(Debug, Error)]
pub enum MtxError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("missing or malformed %%MatrixMarket banner")]
    Banner,

    #[error("unsupported Matrix Market {what} '{value}'")]
    Unsupported { what: &'static str, value: String },

    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("expected {expected} entries, found {got}")]
    EntryCount { expected: usize, got: usize },

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}
