//! Error type for the specialization pipeline

use spmvgen_core::MatrixError;
use thiserror::Error;

/// Result alias for specializer operations.
pub type Result<T> = std::result::Result<T, SpecializeError>;

/// Everything that can make `specialize()` fail. There is no partial success: any
/// error leaves no usable generated function behind.
#[derive(Debug, Error)]
pub enum SpecializeError {
    #[error("malformed matrix: {0}")]
    Matrix(#[from] MatrixError),

    #[error("unknown specialization method '{0}'")]
    UnknownMethod(String),

    #[error("block shape {rows}x{cols} must have between 1 and 64 cells")]
    InvalidBlockShape { rows: usize, cols: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("native code generation is not supported on {0}")]
    UnsupportedTarget(&'static str),

    #[error("{what} = {value} does not fit the instruction encoding")]
    EncodingOverflow { what: &'static str, value: i64 },

    #[error("branch to label L{0} which is never bound")]
    UnboundLabel(u32),

    #[error("failed to map {size} bytes of executable memory")]
    JitAlloc {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to make {size} bytes of generated code executable")]
    JitProtect {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("{which} has {got} entries, expected at least {expected}")]
    VectorLength {
        which: &'static str,
        expected: usize,
        got: usize,
    },
}
