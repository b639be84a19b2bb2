//! Block-pattern grouping (`genOSKI`): fixed-shape register blocks grouped by which of
//! their cells hold nonzeros, so every block of a pattern runs the same code.

use crate::error::Result;
use crate::ir::{bytes64, disp32, trips32, Gpr, Inst, Program};
use crate::method::BlockShape;
use crate::strategy::{seek, EmitContext, Extent, Strategy, StripeSlices};
use crate::util::{i32_to_usize, usize_to_i32};
use spmvgen_core::{Csr, StripeInfo};
use std::collections::BTreeMap;

/// Occupancy signature of a block: bit `i * cols + j` is set when cell `(i, j)` holds a
/// nonzero. Ordered by `(rows, cols, mask)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPattern {
    pub rows: u8,
    pub cols: u8,
    pub mask: u64,
}

impl BlockPattern {
    /// The single-element pattern used for nonzeros outside any complete block.
    pub const DEGENERATE: Self = Self { rows: 1, cols: 1, mask: 1 };

    /// Number of populated cells.
    #[must_use]
    pub const fn cells(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// Populated cells of block row `i`, bit `j` for column `j`.
    #[must_use]
    pub const fn row_bits(&self, i: usize) -> u64 {
        let cols = self.cols as usize;
        let row_mask = if cols >= 64 { u64::MAX } else { (1u64 << cols) - 1 };
        (self.mask >> (i * cols)) & row_mask
    }

    #[must_use]
    pub const fn is_set(&self, i: usize, j: usize) -> bool {
        (self.row_bits(i) >> j) & 1 == 1
    }
}

/// All blocks of one pattern: `(top row, left column)` per block in scan order, and
/// their populated values in row-major cell order, block after block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatternGroup {
    pub blocks: Vec<(usize, usize)>,
    pub vals: Vec<f64>,
}

/// A stripe's block registrations keyed by pattern.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatternGroups {
    groups: BTreeMap<BlockPattern, PatternGroup>,
}

impl PatternGroups {
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, BlockPattern, PatternGroup> {
        self.groups.iter()
    }

    #[must_use]
    pub fn get(&self, pattern: &BlockPattern) -> Option<&PatternGroup> {
        self.groups.get(pattern)
    }

    /// Number of distinct patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[must_use]
    pub fn nblocks(&self) -> usize {
        self.groups.values().map(|g| g.blocks.len()).sum()
    }

    #[must_use]
    pub fn nnz(&self) -> usize {
        self.groups.values().map(|g| g.vals.len()).sum()
    }

    fn register(&mut self, pattern: BlockPattern, top: usize, left: usize, vals: &[f64]) {
        let group = self.groups.entry(pattern).or_default();
        group.blocks.push((top, left));
        group.vals.extend_from_slice(vals);
    }
}

impl<'a> IntoIterator for &'a PatternGroups {
    type Item = (&'a BlockPattern, &'a PatternGroup);
    type IntoIter = std::collections::btree_map::Iter<'a, BlockPattern, PatternGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

struct Cell {
    bcol: usize,
    i: usize,
    j: usize,
    val: f64,
}

/// Tile `stripe` into `shape` blocks anchored at its first row and at column multiples
/// of `shape.cols()`, and register every nonempty block under its pattern.
///
/// Blocks cut short by the stripe's last rows or the matrix's last columns are split
/// into degenerate single-element registrations.
#[must_use]
pub fn group_blocks(a: &Csr, stripe: &StripeInfo, shape: BlockShape) -> PatternGroups {
    let (br, bc) = (shape.rows(), shape.cols());
    let full_bcols = a.ncols / bc;
    let mut out = PatternGroups::default();
    let mut cells = Vec::new();
    let mut vals = Vec::with_capacity(br * bc);

    let mut top = stripe.row_begin;
    while top < stripe.row_end {
        let bottom = (top + br).min(stripe.row_end);
        let complete_rows = bottom - top == br;

        cells.clear();
        for row in top..bottom {
            for (&col, &val) in a.row_indices(row).iter().zip(a.row_data(row)) {
                let col = i32_to_usize(col);
                cells.push(Cell { bcol: col / bc, i: row - top, j: col % bc, val });
            }
        }
        // stable: cells of one block stay in row-major order
        cells.sort_by_key(|c| c.bcol);

        for block in cells.chunk_by(|x, y| x.bcol == y.bcol) {
            let left = block[0].bcol * bc;
            if complete_rows && block[0].bcol < full_bcols {
                let mut mask = 0u64;
                vals.clear();
                for c in block {
                    mask |= 1u64 << (c.i * bc + c.j);
                    vals.push(c.val);
                }
                #[allow(clippy::cast_possible_truncation)]
                let pattern = BlockPattern { rows: br as u8, cols: bc as u8, mask };
                out.register(pattern, top, left, &vals);
            } else {
                for c in block {
                    out.register(BlockPattern::DEGENERATE, top + c.i, left + c.j, &[c.val]);
                }
            }
        }
        top = bottom;
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ByBlockPattern(pub BlockShape);

impl Strategy for ByBlockPattern {
    type Groups = PatternGroups;

    fn analyze(&self, a: &Csr, stripe: &StripeInfo) -> PatternGroups {
        group_blocks(a, stripe, self.0)
    }

    fn extent(&self, stripe: &StripeInfo, groups: &PatternGroups) -> Extent {
        let blocks = groups.nblocks();
        debug_assert_eq!(groups.nnz(), stripe.nnz());
        Extent { rows: blocks, cols: blocks, vals: stripe.nnz() }
    }

    fn convert(&self, _a: &Csr, groups: &PatternGroups, out: StripeSlices<'_>) {
        let mut k = 0usize;
        let mut p = 0usize;
        for (_, group) in groups {
            for &(top, left) in &group.blocks {
                out.rows[k] = usize_to_i32(top);
                out.cols[k] = usize_to_i32(left);
                k += 1;
            }
            out.vals[p..p + group.vals.len()].copy_from_slice(&group.vals);
            p += group.vals.len();
        }
        debug_assert_eq!(k, out.rows.len());
        debug_assert_eq!(p, out.vals.len());
    }

    fn emit(&self, groups: &PatternGroups, ctx: &EmitContext<'_>) -> Result<Program> {
        let mut p = Program::new();
        p.push(Inst::Prologue);
        seek(&mut p, ctx.layout)?;
        for (pattern, group) in groups {
            let head = p.loop_head(Gpr::Counter);
            p.push(Inst::LoadIndex { dst: Gpr::Row, base: Gpr::Rows, disp: 0 });
            p.push(Inst::LoadIndex { dst: Gpr::Col, base: Gpr::Cols, disp: 0 });
            let mut k = 0usize;
            for i in 0..usize::from(pattern.rows) {
                let bits = pattern.row_bits(i);
                if bits == 0 {
                    continue;
                }
                p.push(Inst::ClearAcc);
                for j in (0..usize::from(pattern.cols)).filter(|&j| (bits >> j) & 1 == 1) {
                    p.push(Inst::MulAdd {
                        val_disp: disp32("value offset", k, 8)?,
                        col: Gpr::Col,
                        v_disp: disp32("column offset", j, 8)?,
                    });
                    k += 1;
                }
                p.push(Inst::StoreAdd { row: Gpr::Row, disp: disp32("row offset", i, 8)? });
            }
            p.advance(Gpr::Rows, 4);
            p.advance(Gpr::Cols, 4);
            p.advance(Gpr::Vals, bytes64("value cursor", k, 8)?);
            p.loop_back(Gpr::Counter, trips32(group.blocks.len())?, head);
        }
        p.push(Inst::Epilogue);
        Ok(p)
    }
}
