//! Core data structures for spmvgen: CSR storage, COO assembly and stripe partitioning

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod coo;
pub mod csr;
pub mod error;
pub mod stripe;

pub use coo::Coo;
pub use csr::Csr;
pub use error::{MatrixError, Result};
pub use stripe::{partition, StripeInfo};
