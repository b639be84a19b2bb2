//! Pairing of analyzer, converter and emitter behind one trait, plus the parallel drivers
//! that run a strategy over every stripe.

use crate::config::Unroll;
use crate::convert::StripeLayout;
use crate::error::Result;
use crate::ir::{bytes64, Gpr, Program};
use rayon::prelude::*;
use spmvgen_core::{Csr, StripeInfo};

/// Element counts one stripe contributes to each converted array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Extent {
    pub rows: usize,
    pub cols: usize,
    pub vals: usize,
}

/// A stripe's disjoint windows into the converted arrays.
pub(crate) struct StripeSlices<'a> {
    pub rows: &'a mut [i32],
    pub cols: &'a mut [i32],
    pub vals: &'a mut [f64],
}

pub(crate) struct EmitContext<'a> {
    pub layout: &'a StripeLayout,
    pub unroll: Unroll,
}

pub(crate) trait Strategy: Sync {
    type Groups: Send + Sync;

    fn analyze(&self, a: &Csr, stripe: &StripeInfo) -> Self::Groups;

    fn extent(&self, stripe: &StripeInfo, groups: &Self::Groups) -> Extent;

    /// Write the stripe's data in group order. `out` is exactly [`Strategy::extent`] long.
    fn convert(&self, a: &Csr, groups: &Self::Groups, out: StripeSlices<'_>);

    fn emit(&self, groups: &Self::Groups, ctx: &EmitContext<'_>) -> Result<Program>;
}

pub(crate) fn analyze_all<S: Strategy>(s: &S, a: &Csr, stripes: &[StripeInfo]) -> Vec<S::Groups> {
    stripes.par_iter().map(|stripe| s.analyze(a, stripe)).collect()
}

pub(crate) fn emit_all<S: Strategy>(
    s: &S,
    groups: &[S::Groups],
    layouts: &[StripeLayout],
    unroll: Unroll,
) -> Result<Vec<Program>> {
    groups
        .par_iter()
        .zip(layouts.par_iter())
        .map(|(g, layout)| s.emit(g, &EmitContext { layout, unroll }))
        .collect()
}

/// Move the three data cursors from the start of the converted arrays to the stripe's
/// own subranges.
pub(crate) fn seek(p: &mut Program, layout: &StripeLayout) -> Result<()> {
    p.advance(Gpr::Rows, bytes64("row offset", layout.rows.start, 4)?);
    p.advance(Gpr::Cols, bytes64("column offset", layout.cols.start, 4)?);
    p.advance(Gpr::Vals, bytes64("value offset", layout.vals.start, 8)?);
    Ok(())
}
