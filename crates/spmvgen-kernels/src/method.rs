//! Closed set of specialization strategies and their names

use crate::error::{Result, SpecializeError};
use std::fmt;
use std::str::FromStr;

/// Largest block area; occupancy patterns are stored as a 64-bit mask.
pub const MAX_BLOCK_CELLS: usize = 64;

/// Register-block shape `rows x cols` for block-pattern grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockShape {
    rows: u8,
    cols: u8,
}

impl BlockShape {
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        let cells = rows.saturating_mul(cols);
        if rows == 0 || cols == 0 || cells > MAX_BLOCK_CELLS {
            return Err(SpecializeError::InvalidBlockShape { rows, cols });
        }
        let (Ok(rows), Ok(cols)) = (u8::try_from(rows), u8::try_from(cols)) else {
            return Err(SpecializeError::InvalidBlockShape { rows, cols });
        };
        Ok(Self { rows, cols })
    }

    #[inline]
    #[must_use]
    pub const fn rows(self) -> usize {
        self.rows as usize
    }

    #[inline]
    #[must_use]
    pub const fn cols(self) -> usize {
        self.cols as usize
    }
}

/// Which structural key the specializer groups rows by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Group rows by nonzero count (`CSRbyNZ`).
    CsrByNz,
    /// Group dense-block registrations by occupancy pattern (`genOSKI`).
    GenOski(BlockShape),
}

impl Method {
    pub fn gen_oski(rows: usize, cols: usize) -> Result<Self> {
        Ok(Method::GenOski(BlockShape::new(rows, cols)?))
    }
}

impl FromStr for Method {
    type Err = SpecializeError;

    /// Accepts `CSRbyNZ` and `genOSKI{r}{c}` with single-digit block dimensions
    /// (`genOSKI33`, `genOSKI44`, `genOSKI55`, ...).
    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("csrbynz") {
            return Ok(Method::CsrByNz);
        }
        let unknown = || SpecializeError::UnknownMethod(s.to_string());
        let prefix = s.get(..7).ok_or_else(unknown)?;
        if !prefix.eq_ignore_ascii_case("genoski") {
            return Err(unknown());
        }
        let dims: Vec<usize> = s[7..]
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as usize))
            .collect::<Option<_>>()
            .ok_or_else(unknown)?;
        match dims.as_slice() {
            [r, c] => Method::gen_oski(*r, *c),
            _ => Err(unknown()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::CsrByNz => f.write_str("CSRbyNZ"),
            Method::GenOski(shape) => write!(f, "genOSKI{}{}", shape.rows(), shape.cols()),
        }
    }
}
