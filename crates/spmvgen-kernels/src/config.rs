//! Specializer configuration: lane count and unroll policy
//
// Defaults match a single-lane run with every fixed-length row body fully unrolled.
// `from_env` lets a driver pick these up without its own flag plumbing.

use crate::error::{Result, SpecializeError};
use std::fmt;
use std::str::FromStr;

/// Environment variable read by [`SpecializerConfig::from_env`] for the lane count.
pub const LANES_ENV: &str = "SPMVGEN_LANES";
/// Environment variable read by [`SpecializerConfig::from_env`] for the unroll policy.
pub const UNROLL_ENV: &str = "SPMVGEN_UNROLL";

/// How the multiply-accumulate run of one fixed-length row is laid out in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unroll {
    /// One straight-line multiply-add per term.
    #[default]
    Full,
    /// A counted loop over chunks of this many straight-line terms, followed by the
    /// remainder. Caps code growth for very long rows.
    Chunked(u32),
}

impl FromStr for Unroll {
    type Err = SpecializeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("full") {
            return Ok(Unroll::Full);
        }
        match s.parse::<u32>() {
            Ok(0) | Err(_) => Err(SpecializeError::Config(format!(
                "unroll must be 'full' or a positive chunk size, got '{s}'"
            ))),
            Ok(k) => Ok(Unroll::Chunked(k)),
        }
    }
}

impl fmt::Display for Unroll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unroll::Full => f.write_str("full"),
            Unroll::Chunked(k) => write!(f, "{k}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecializerConfig {
    /// Number of stripes, and so of generated functions.
    pub lanes: usize,
    pub unroll: Unroll,
}

impl Default for SpecializerConfig {
    fn default() -> Self {
        Self { lanes: 1, unroll: Unroll::Full }
    }
}

impl SpecializerConfig {
    #[must_use]
    pub fn new(lanes: usize) -> Self {
        Self { lanes, ..Self::default() }
    }

    #[must_use]
    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes;
        self
    }

    #[must_use]
    pub fn with_unroll(mut self, unroll: Unroll) -> Self {
        self.unroll = unroll;
        self
    }

    /// Defaults overridden by `SPMVGEN_LANES` / `SPMVGEN_UNROLL` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(LANES_ENV) {
            config.lanes = raw.trim().parse().map_err(|_| {
                SpecializeError::Config(format!("{LANES_ENV} must be a positive integer, got '{raw}'"))
            })?;
        }
        if let Ok(raw) = std::env::var(UNROLL_ENV) {
            config.unroll = raw.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lanes == 0 {
            return Err(SpecializeError::Config("lane count must be at least 1".into()));
        }
        if self.unroll == Unroll::Chunked(0) {
            return Err(SpecializeError::Config("unroll chunk size must be at least 1".into()));
        }
        Ok(())
    }
}
