//! Matrix-specialized SpMV: native multiply functions generated per matrix and stripe

pub mod block_pattern;
pub mod config;
pub mod convert;
pub mod error;
pub mod ir;
pub mod jit;
pub mod method;
pub mod reference;
pub mod row_length;
pub mod specializer;
pub mod stats;
mod strategy;
pub mod util;
pub mod x86_64;

pub use block_pattern::{group_blocks, BlockPattern, PatternGroup, PatternGroups};
pub use config::{SpecializerConfig, Unroll};
pub use convert::{ConvertedMatrix, StripeLayout};
pub use error::{Result, SpecializeError};
pub use ir::{native_backend, Backend, Program};
pub use jit::MultByMFn;
pub use method::{BlockShape, Method};
pub use row_length::{group_rows, LengthGroup, LengthGroups};
pub use specializer::{Analysis, MultByM, SpecializedKernel, Specializer};
pub use stats::{matrix_stats, MatrixStats};
