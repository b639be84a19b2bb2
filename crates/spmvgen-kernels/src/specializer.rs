//! Specializer: partition, analyze, convert, emit and JIT one matrix into native
//! multiply functions, one per stripe.
//!
//! ```no_run
//! use spmvgen_core::Csr;
//! use spmvgen_kernels::{Method, Specializer, SpecializerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let a = Csr::from_dense(2, 2, &[1.0, 2.0, 0.0, 3.0])?;
//! let kernel = Specializer::new(&a, Method::CsrByNz, SpecializerConfig::new(2))?.specialize()?;
//! let v = [1.0, 1.0];
//! let mut w = [0.0, 0.0];
//! kernel.multiply(&v, &mut w)?;
//! assert_eq!(w, [3.0, 3.0]);
//! # Ok(())
//! # }
//! ```

use crate::block_pattern::{ByBlockPattern, PatternGroups};
use crate::config::SpecializerConfig;
use crate::convert::{convert_all, ConvertedMatrix};
use crate::error::Result;
use crate::ir::{native_backend, Program};
use crate::jit::{ExecutableMemory, MultByMFn};
use crate::method::{BlockShape, Method};
use crate::reference::check_lengths;
use crate::row_length::{ByRowLength, LengthGroups};
use crate::strategy::{analyze_all, emit_all};
use rayon::prelude::*;
use spmvgen_core::{partition, Csr, StripeInfo};
use std::marker::PhantomData;
use std::sync::OnceLock;
use tracing::{debug, info, instrument};

/// Per-stripe analyzer output.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    RowLength(Vec<LengthGroups>),
    BlockPattern { shape: BlockShape, groups: Vec<PatternGroups> },
}

impl Analysis {
    /// Number of groups, and so of loops emitted, in each stripe.
    #[must_use]
    pub fn group_counts(&self) -> Vec<usize> {
        match self {
            Analysis::RowLength(g) => g.iter().map(LengthGroups::len).collect(),
            Analysis::BlockPattern { groups, .. } => groups.iter().map(PatternGroups::len).collect(),
        }
    }
}

/// Builds a [`SpecializedKernel`] for one matrix. Analysis and conversion run at most
/// once and are cached.
#[derive(Debug)]
pub struct Specializer<'a> {
    source: &'a Csr,
    method: Method,
    config: SpecializerConfig,
    stripes: Vec<StripeInfo>,
    analysis: OnceLock<Analysis>,
    matrix: OnceLock<ConvertedMatrix>,
}

impl<'a> Specializer<'a> {
    /// Validate `source` and `config` and split the matrix into `config.lanes` stripes.
    #[instrument(skip_all, fields(method = %method, lanes = config.lanes))]
    pub fn new(source: &'a Csr, method: Method, config: SpecializerConfig) -> Result<Self> {
        config.validate()?;
        source.validate()?;
        let stripes = partition(source, config.lanes)?;
        info!(
            nrows = source.nrows,
            ncols = source.ncols,
            nnz = source.nnz(),
            "partitioned matrix"
        );
        for (t, s) in stripes.iter().enumerate() {
            debug!(stripe = t, rows = ?s.rows(), vals = ?s.vals(), "stripe");
        }
        Ok(Self {
            source,
            method,
            config,
            stripes,
            analysis: OnceLock::new(),
            matrix: OnceLock::new(),
        })
    }

    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub const fn config(&self) -> &SpecializerConfig {
        &self.config
    }

    #[must_use]
    pub const fn source(&self) -> &'a Csr {
        self.source
    }

    #[must_use]
    pub fn stripes(&self) -> &[StripeInfo] {
        &self.stripes
    }

    /// Group every stripe, in parallel.
    pub fn analysis(&self) -> &Analysis {
        self.analysis.get_or_init(|| {
            let analysis = match self.method {
                Method::CsrByNz => {
                    Analysis::RowLength(analyze_all(&ByRowLength, self.source, &self.stripes))
                }
                Method::GenOski(shape) => Analysis::BlockPattern {
                    shape,
                    groups: analyze_all(&ByBlockPattern(shape), self.source, &self.stripes),
                },
            };
            debug!(groups = ?analysis.group_counts(), "analyzed stripes");
            analysis
        })
    }

    /// The matrix re-laid out in group order.
    pub fn matrix(&self) -> &ConvertedMatrix {
        self.matrix.get_or_init(|| self.convert())
    }

    fn convert(&self) -> ConvertedMatrix {
        match self.analysis() {
            Analysis::RowLength(groups) => {
                convert_all(&ByRowLength, self.source, &self.stripes, groups)
            }
            Analysis::BlockPattern { shape, groups } => {
                convert_all(&ByBlockPattern(*shape), self.source, &self.stripes, groups)
            }
        }
    }

    /// One instruction list per stripe.
    pub fn programs(&self) -> Result<Vec<Program>> {
        let layouts = self.matrix().layouts();
        let unroll = self.config.unroll;
        match self.analysis() {
            Analysis::RowLength(groups) => emit_all(&ByRowLength, groups, layouts, unroll),
            Analysis::BlockPattern { shape, groups } => {
                emit_all(&ByBlockPattern(*shape), groups, layouts, unroll)
            }
        }
    }

    /// Run the whole pipeline. Either every stripe gets a function or nothing is kept.
    #[instrument(skip_all, fields(method = %self.method, lanes = self.stripes.len()))]
    pub fn specialize(mut self) -> Result<SpecializedKernel> {
        let backend = native_backend()?;
        let programs = self.programs()?;
        let code = programs
            .par_iter()
            .enumerate()
            .map(|(t, program)| {
                let bytes = backend.lower(program)?;
                debug!(
                    stripe = t,
                    insts = program.len(),
                    terms = program.mul_adds(),
                    bytes = bytes.len(),
                    backend = backend.name(),
                    "lowered stripe"
                );
                ExecutableMemory::new(&bytes)
            })
            .collect::<Result<Vec<_>>>()?;
        let total: usize = code.iter().map(ExecutableMemory::len).sum();
        info!(functions = code.len(), code_bytes = total, "specialized");

        let matrix = match self.matrix.take() {
            Some(m) => m,
            None => self.convert(),
        };
        Ok(SpecializedKernel { code, matrix, method: self.method })
    }
}

/// Finalized native functions plus the converted matrix they read.
#[derive(Debug)]
pub struct SpecializedKernel {
    // dropped before the matrix it indexes
    code: Vec<ExecutableMemory>,
    matrix: ConvertedMatrix,
    method: Method,
}

impl SpecializedKernel {
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The converted matrix whose arrays every generated function must be given.
    #[must_use]
    pub const fn matrix(&self) -> &ConvertedMatrix {
        &self.matrix
    }

    /// Number of generated functions (one per stripe).
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Machine code of one stripe's function.
    #[must_use]
    pub fn code(&self, stripe: usize) -> Option<&[u8]> {
        self.code.get(stripe).map(ExecutableMemory::bytes)
    }

    /// Callable handles, in stripe order. Each borrows this kernel.
    #[must_use]
    pub fn functions(&self) -> Vec<MultByM<'_>> {
        self.code
            .iter()
            .enumerate()
            .map(|(stripe, mem)| MultByM {
                // SAFETY: produced by the native backend; the handle borrows `self`.
                f: unsafe { mem.entry() },
                stripe,
                matrix: &self.matrix,
                _code: PhantomData,
            })
            .collect()
    }

    /// `w += M v`, running the stripes one after another.
    pub fn multiply(&self, v: &[f64], w: &mut [f64]) -> Result<()> {
        check_lengths(self.matrix.nrows(), self.matrix.ncols(), v, w)?;
        for f in self.functions() {
            // SAFETY: lengths checked above.
            unsafe { f.call_raw(v.as_ptr(), w.as_mut_ptr()) };
        }
        Ok(())
    }

    /// `w += M v` with one rayon task per stripe.
    pub fn multiply_parallel(&self, v: &[f64], w: &mut [f64]) -> Result<()> {
        check_lengths(self.matrix.nrows(), self.matrix.ncols(), v, w)?;
        let w_addr = w.as_mut_ptr() as usize;
        self.functions().par_iter().for_each(|f| {
            // SAFETY: lengths checked above; stripes write disjoint rows of `w`.
            unsafe { f.call_raw(v.as_ptr(), w_addr as *mut f64) };
        });
        Ok(())
    }
}

/// Handle to one stripe's generated function.
#[derive(Clone, Copy)]
pub struct MultByM<'k> {
    f: MultByMFn,
    stripe: usize,
    matrix: &'k ConvertedMatrix,
    _code: PhantomData<&'k ExecutableMemory>,
}

impl std::fmt::Debug for MultByM<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultByM")
            .field("f", &(self.f as *const ()))
            .field("stripe", &self.stripe)
            .finish_non_exhaustive()
    }
}

impl MultByM<'_> {
    #[must_use]
    pub const fn stripe(&self) -> usize {
        self.stripe
    }

    /// The raw function. It must be called with the converted matrix's `rows`, `cols`
    /// and `vals` base pointers, a `v` of at least `ncols` and a `w` of at least `nrows`
    /// entries, and only while the owning kernel is alive.
    #[must_use]
    pub const fn as_fn(&self) -> MultByMFn {
        self.f
    }

    /// `w[stripe rows] += M[stripe rows] v`
    pub fn call(&self, v: &[f64], w: &mut [f64]) -> Result<()> {
        check_lengths(self.matrix.nrows(), self.matrix.ncols(), v, w)?;
        // SAFETY: lengths checked above.
        unsafe { self.call_raw(v.as_ptr(), w.as_mut_ptr()) };
        Ok(())
    }

    /// # Safety
    /// `v` must point to at least `ncols` readable values and `w` to at least `nrows`
    /// writable values not concurrently written for this stripe's rows.
    pub unsafe fn call_raw(&self, v: *const f64, w: *mut f64) {
        let m = self.matrix;
        // SAFETY: upheld by the caller; the matrix arrays match the generated code.
        unsafe {
            (self.f)(v, w, m.rows().as_ptr(), m.cols().as_ptr(), m.vals().as_ptr());
        }
    }
}
