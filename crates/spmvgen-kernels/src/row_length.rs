//! Row-length grouping (`CSRbyNZ`): rows with the same nonzero count share one loop
//! whose body is a fixed run of multiply-adds.

use crate::config::Unroll;
use crate::error::Result;
use crate::ir::{bytes64, disp32, trips32, Gpr, Inst, Program};
use crate::strategy::{seek, EmitContext, Extent, Strategy, StripeSlices};
use crate::util::usize_to_i32;
use spmvgen_core::{Csr, StripeInfo};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Longest straight-line run emitted without a cursor advance. Keeps every displacement
/// well inside 32 bits.
pub const MAX_STRAIGHT_TERMS: usize = 1 << 24;

/// Rows of one stripe sharing a nonzero count, in original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthGroup {
    pub len: usize,
    pub rows: Vec<usize>,
}

/// A stripe's row groups, longest length first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LengthGroups {
    groups: Vec<LengthGroup>,
}

impl LengthGroups {
    #[must_use]
    pub fn groups(&self) -> &[LengthGroup] {
        &self.groups
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LengthGroup> {
        self.groups.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[must_use]
    pub fn get(&self, len: usize) -> Option<&LengthGroup> {
        self.groups.iter().find(|g| g.len == len)
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }

    #[must_use]
    pub fn nnz(&self) -> usize {
        self.groups.iter().map(|g| g.len * g.rows.len()).sum()
    }
}

impl<'a> IntoIterator for &'a LengthGroups {
    type Item = &'a LengthGroup;
    type IntoIter = std::slice::Iter<'a, LengthGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

/// Group the rows of `stripe` by nonzero count, keys strictly descending, rows in
/// ascending order within each key.
#[must_use]
pub fn group_rows(a: &Csr, stripe: &StripeInfo) -> LengthGroups {
    let mut by_len: BTreeMap<Reverse<usize>, Vec<usize>> = BTreeMap::new();
    for row in stripe.rows() {
        by_len.entry(Reverse(a.row_len(row))).or_default().push(row);
    }
    LengthGroups {
        groups: by_len
            .into_iter()
            .map(|(Reverse(len), rows)| LengthGroup { len, rows })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ByRowLength;

impl Strategy for ByRowLength {
    type Groups = LengthGroups;

    fn analyze(&self, a: &Csr, stripe: &StripeInfo) -> LengthGroups {
        group_rows(a, stripe)
    }

    fn extent(&self, stripe: &StripeInfo, _groups: &LengthGroups) -> Extent {
        Extent { rows: stripe.nrows(), cols: stripe.nnz(), vals: stripe.nnz() }
    }

    fn convert(&self, a: &Csr, groups: &LengthGroups, out: StripeSlices<'_>) {
        let mut k = 0usize;
        let mut p = 0usize;
        for group in groups {
            for &row in &group.rows {
                out.rows[k] = usize_to_i32(row);
                k += 1;
                let src = a.row_range(row);
                let n = src.len();
                out.cols[p..p + n].copy_from_slice(&a.indices[src.clone()]);
                out.vals[p..p + n].copy_from_slice(&a.data[src]);
                p += n;
            }
        }
        debug_assert_eq!(k, out.rows.len());
        debug_assert_eq!(p, out.vals.len());
    }

    fn emit(&self, groups: &LengthGroups, ctx: &EmitContext<'_>) -> Result<Program> {
        let mut p = Program::new();
        p.push(Inst::Prologue);
        seek(&mut p, ctx.layout)?;
        for group in groups {
            let count = group.rows.len();
            if group.len == 0 {
                // empty rows: nothing to add, just skip their row slots
                p.advance(Gpr::Rows, bytes64("row cursor", count, 4)?);
                continue;
            }
            let head = p.loop_head(Gpr::Counter);
            p.push(Inst::ClearAcc);
            emit_terms(&mut p, group.len, ctx.unroll)?;
            p.push(Inst::LoadIndex { dst: Gpr::Row, base: Gpr::Rows, disp: 0 });
            p.push(Inst::StoreAdd { row: Gpr::Row, disp: 0 });
            p.advance(Gpr::Rows, 4);
            p.loop_back(Gpr::Counter, trips32(count)?, head);
        }
        p.push(Inst::Epilogue);
        Ok(p)
    }
}

/// Accumulate `n` consecutive entries into `acc` and step past them.
fn emit_terms(p: &mut Program, n: usize, unroll: Unroll) -> Result<()> {
    let chunk = match unroll {
        Unroll::Full => MAX_STRAIGHT_TERMS,
        Unroll::Chunked(k) => usize::try_from(k).map_or(MAX_STRAIGHT_TERMS, |k| k.clamp(1, MAX_STRAIGHT_TERMS)),
    };
    let full = n / chunk;
    match full {
        0 => {}
        1 => straight_terms(p, chunk)?,
        _ if unroll == Unroll::Full => {
            for _ in 0..full {
                straight_terms(p, chunk)?;
            }
        }
        _ => {
            let head = p.loop_head(Gpr::Inner);
            straight_terms(p, chunk)?;
            p.loop_back(Gpr::Inner, trips32(full)?, head);
        }
    }
    straight_terms(p, n % chunk)
}

fn straight_terms(p: &mut Program, n: usize) -> Result<()> {
    for t in 0..n {
        p.push(Inst::LoadIndex { dst: Gpr::Col, base: Gpr::Cols, disp: disp32("column offset", t, 4)? });
        p.push(Inst::MulAdd { val_disp: disp32("value offset", t, 8)?, col: Gpr::Col, v_disp: 0 });
    }
    p.advance(Gpr::Cols, bytes64("column cursor", n, 4)?);
    p.advance(Gpr::Vals, bytes64("value cursor", n, 8)?);
    Ok(())
}
