//! Matrix Market (`.mtx`) reading and writing for spmvgen

pub mod error;
pub mod mtx;

pub use error::{MtxError, Result};
pub use mtx::{read_matrix_market, read_matrix_market_path, write_matrix_market, write_matrix_market_path};
