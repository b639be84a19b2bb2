//! Matrix Market coordinate format
//
// Supported: `matrix coordinate {real|double|integer|pattern} {general|symmetric}`.
// Indices are 1-based on disk. Pattern entries read as 1.0, symmetric files are expanded
// to both triangles and duplicate coordinates are summed.

use crate::error::{MtxError, Result};
use spmvgen_core::{Coo, Csr, MatrixError};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Real,
    Integer,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symmetry {
    General,
    Symmetric,
}

fn parse_banner(line: &str) -> Result<(Field, Symmetry)> {
    let tokens: Vec<String> = line.split_whitespace().map(str::to_ascii_lowercase).collect();
    let [banner, object, format, field, symmetry] = tokens.as_slice() else {
        return Err(MtxError::Banner);
    };
    if banner != "%%matrixmarket" {
        return Err(MtxError::Banner);
    }
    if object != "matrix" {
        return Err(MtxError::Unsupported { what: "object", value: object.clone() });
    }
    if format != "coordinate" {
        return Err(MtxError::Unsupported { what: "format", value: format.clone() });
    }
    let field = match field.as_str() {
        "real" | "double" => Field::Real,
        "integer" => Field::Integer,
        "pattern" => Field::Pattern,
        other => return Err(MtxError::Unsupported { what: "field", value: other.to_string() }),
    };
    let symmetry = match symmetry.as_str() {
        "general" => Symmetry::General,
        "symmetric" => Symmetry::Symmetric,
        other => return Err(MtxError::Unsupported { what: "symmetry", value: other.to_string() }),
    };
    Ok((field, symmetry))
}

fn parse_num<T: std::str::FromStr>(tok: Option<&str>, line: usize, what: &str) -> Result<T> {
    let tok = tok.ok_or_else(|| MtxError::Parse { line, msg: format!("missing {what}") })?;
    tok.parse()
        .map_err(|_| MtxError::Parse { line, msg: format!("invalid {what} '{tok}'") })
}

/// Largest number of entries reserved up front from an untrusted size line.
const MAX_RESERVE: usize = 1 << 20;

fn reserve_hint(declared: usize, nrows: usize, ncols: usize, symmetry: Symmetry) -> usize {
    let stored = match symmetry {
        Symmetry::General => declared,
        Symmetry::Symmetric => declared.saturating_mul(2),
    };
    stored.min(nrows.saturating_mul(ncols)).min(MAX_RESERVE)
}

fn zero_based(index: i64, line: usize) -> Result<i64> {
    index
        .checked_sub(1)
        .ok_or_else(|| MtxError::Parse { line, msg: format!("index {index} out of range") })
}

/// Read a coordinate Matrix Market stream into a validated CSR matrix.
pub fn read_matrix_market<R: BufRead>(reader: R) -> Result<Csr> {
    let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));

    let (_, banner) = lines.next().ok_or(MtxError::Banner)?;
    let (field, symmetry) = parse_banner(&banner?)?;

    let mut size = None;
    let mut coo = Coo::default();
    let mut declared = 0usize;
    let mut seen = 0usize;
    for (line_no, line) in lines {
        let line = line?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('%') {
            continue;
        }
        let mut toks = text.split_whitespace();
        if size.is_none() {
            let nrows: usize = parse_num(toks.next(), line_no, "row count")?;
            let ncols: usize = parse_num(toks.next(), line_no, "column count")?;
            declared = parse_num(toks.next(), line_no, "entry count")?;
            for (what, value) in [("nrows", nrows), ("ncols", ncols)] {
                if i32::try_from(value).is_err() {
                    return Err(MatrixError::IndexOverflow { what, value }.into());
                }
            }
            coo = Coo::with_capacity(nrows, ncols, reserve_hint(declared, nrows, ncols, symmetry));
            size = Some((nrows, ncols));
            continue;
        }
        if seen == declared {
            return Err(MtxError::Parse { line: line_no, msg: "more entries than declared".into() });
        }
        let i: i64 = parse_num(toks.next(), line_no, "row index")?;
        let j: i64 = parse_num(toks.next(), line_no, "column index")?;
        let x = match field {
            Field::Pattern => 1.0,
            Field::Integer => parse_num::<i64>(toks.next(), line_no, "value")? as f64,
            Field::Real => parse_num::<f64>(toks.next(), line_no, "value")?,
        };
        let (i, j) = (zero_based(i, line_no)?, zero_based(j, line_no)?);
        coo.push(i, j, x)?;
        if symmetry == Symmetry::Symmetric && i != j {
            coo.push(j, i, x)?;
        }
        seen += 1;
    }

    let Some((nrows, ncols)) = size else {
        return Err(MtxError::Parse { line: 0, msg: "missing size line".into() });
    };
    if seen != declared {
        return Err(MtxError::EntryCount { expected: declared, got: seen });
    }
    let csr = coo.to_csr()?;
    debug!(nrows, ncols, entries = seen, nnz = csr.nnz(), ?field, ?symmetry, "read matrix market");
    Ok(csr)
}

pub fn read_matrix_market_path(path: impl AsRef<Path>) -> Result<Csr> {
    let file = File::open(path.as_ref())?;
    read_matrix_market(BufReader::new(file))
}

/// Write `a` as `matrix coordinate real general`, one entry per stored value.
pub fn write_matrix_market<W: Write>(a: &Csr, mut out: W) -> Result<()> {
    writeln!(out, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(out, "{} {} {}", a.nrows, a.ncols, a.nnz())?;
    for i in 0..a.nrows {
        for (&j, &x) in a.row_indices(i).iter().zip(a.row_data(i)) {
            writeln!(out, "{} {} {}", i + 1, j + 1, x)?;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn write_matrix_market_path(a: &Csr, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_matrix_market(a, BufWriter::new(file))
}
