//! Architecture-neutral instruction list for generated multiply kernels
//!
//! Emitters describe a stripe's function as a flat [`Program`] of [`Inst`]s over a
//! fixed set of register roles ([`Gpr`]); a [`Backend`] lowers it to machine code.
//! Every generated function has the signature
//! `fn(v: *const f64, w: *mut f64, rows: *const i32, cols: *const i32, vals: *const f64)`.
//!
//! Two floating-point roles exist implicitly: the row accumulator `acc` and the
//! product scratch `term`.

use crate::error::{Result, SpecializeError};
use std::fmt;

/// General-purpose register roles.
///
/// | role      | meaning                                           |
/// |-----------|---------------------------------------------------|
/// | `V`       | input vector base (argument 0, never moves)        |
/// | `W`       | output vector base (argument 1, never moves)       |
/// | `Rows`    | cursor into the converted row-index array (arg 2)  |
/// | `Cols`    | cursor into the converted column array (arg 3)     |
/// | `Vals`    | cursor into the converted value array (arg 4)      |
/// | `Counter` | trip counter of the per-group loop                 |
/// | `Inner`   | trip counter of the chunk loop inside a long row   |
/// | `Row`     | current row index, sign-extended                   |
/// | `Col`     | current column index, sign-extended                |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gpr {
    V,
    W,
    Rows,
    Cols,
    Vals,
    Counter,
    Inner,
    Row,
    Col,
}

impl Gpr {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Gpr::V => "v",
            Gpr::W => "w",
            Gpr::Rows => "rows",
            Gpr::Cols => "cols",
            Gpr::Vals => "vals",
            Gpr::Counter => "counter",
            Gpr::Inner => "inner",
            Gpr::Row => "row",
            Gpr::Col => "col",
        }
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Branch target, allocated by [`Program::new_label`] and placed by [`Inst::Bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inst {
    /// Save callee-owned registers. Arguments are already in their roles.
    Prologue,
    /// Restore callee-owned registers and return.
    Epilogue,
    /// `reg += bytes`
    Advance { reg: Gpr, bytes: i64 },
    /// `reg = 0`
    Zero(Gpr),
    /// Pad with no-ops up to a multiple of the given byte count.
    Align(u8),
    Bind(Label),
    /// `dst = sign_extend(*(i32*)(base + disp))`
    LoadIndex { dst: Gpr, base: Gpr, disp: i32 },
    /// `acc = 0.0`
    ClearAcc,
    /// `term = *(f64*)(vals + val_disp); term *= v[col + v_disp / 8]; acc += term`
    MulAdd { val_disp: i32, col: Gpr, v_disp: i32 },
    /// `acc += w[row + disp / 8]; w[row + disp / 8] = acc`
    StoreAdd { row: Gpr, disp: i32 },
    /// `counter += 1; if counter != trips goto target`
    LoopBack { counter: Gpr, trips: u32, target: Label },
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Inst::Prologue => f.write_str("    prologue"),
            Inst::Epilogue => f.write_str("    epilogue"),
            Inst::Advance { reg, bytes } => write!(f, "    {reg} += {bytes}"),
            Inst::Zero(reg) => write!(f, "    {reg} = 0"),
            Inst::Align(n) => write!(f, "    .align {n}"),
            Inst::Bind(label) => write!(f, "{label}:"),
            Inst::LoadIndex { dst, base, disp } => write!(f, "    {dst} = i32[{base} + {disp}]"),
            Inst::ClearAcc => f.write_str("    acc = 0.0"),
            Inst::MulAdd { val_disp, col, v_disp } => {
                write!(f, "    acc += f64[vals + {val_disp}] * v[{col} * 8 + {v_disp}]")
            }
            Inst::StoreAdd { row, disp } => write!(f, "    w[{row} * 8 + {disp}] += acc"),
            Inst::LoopBack { counter, trips, target } => {
                write!(f, "    if ++{counter} != {trips} goto {target}")
            }
        }
    }
}

/// One generated function, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    insts: Vec<Inst>,
    labels: u32,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels);
        self.labels += 1;
        label
    }

    pub fn push(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    /// Cursor bump; a zero-byte advance emits nothing.
    pub fn advance(&mut self, reg: Gpr, bytes: i64) {
        if bytes != 0 {
            self.insts.push(Inst::Advance { reg, bytes });
        }
    }

    pub fn bind(&mut self, label: Label) {
        self.insts.push(Inst::Bind(label));
    }

    /// Open a counted loop: zero `counter`, align, and bind a fresh head label.
    pub fn loop_head(&mut self, counter: Gpr) -> Label {
        self.push(Inst::Zero(counter));
        self.push(Inst::Align(16));
        let head = self.new_label();
        self.bind(head);
        head
    }

    pub fn loop_back(&mut self, counter: Gpr, trips: u32, target: Label) {
        self.push(Inst::LoopBack { counter, trips, target });
    }

    #[must_use]
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    #[must_use]
    pub const fn label_count(&self) -> u32 {
        self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Number of multiply-accumulate instructions, i.e. the static term count.
    #[must_use]
    pub fn mul_adds(&self) -> usize {
        self.insts.iter().filter(|i| matches!(i, Inst::MulAdd { .. })).count()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for inst in &self.insts {
            writeln!(f, "{inst}")?;
        }
        Ok(())
    }
}

/// Lowers a [`Program`] to machine code for one target.
pub trait Backend: Sync {
    fn name(&self) -> &'static str;

    fn lower(&self, program: &Program) -> Result<Vec<u8>>;
}

/// The backend for the machine this process runs on.
#[cfg(target_arch = "x86_64")]
pub fn native_backend() -> Result<&'static dyn Backend> {
    Ok(&crate::x86_64::X86_64)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn native_backend() -> Result<&'static dyn Backend> {
    Err(SpecializeError::UnsupportedTarget(std::env::consts::ARCH))
}

/// Byte displacement `index * scale`, checked against the 32-bit encoding limit.
pub(crate) fn disp32(what: &'static str, index: usize, scale: usize) -> Result<i32> {
    index
        .checked_mul(scale)
        .and_then(|d| i32::try_from(d).ok())
        .ok_or(SpecializeError::EncodingOverflow {
            what,
            value: i64::try_from(index.saturating_mul(scale)).unwrap_or(i64::MAX),
        })
}

/// Byte count `count * scale` as a cursor advance.
pub(crate) fn bytes64(what: &'static str, count: usize, scale: usize) -> Result<i64> {
    count
        .checked_mul(scale)
        .and_then(|d| i64::try_from(d).ok())
        .ok_or(SpecializeError::EncodingOverflow { what, value: i64::MAX })
}

/// Loop trip count as an instruction immediate.
pub(crate) fn trips32(count: usize) -> Result<u32> {
    u32::try_from(count)
        .ok()
        .filter(|&t| i32::try_from(t).is_ok())
        .ok_or(SpecializeError::EncodingOverflow {
            what: "loop trip count",
            value: i64::try_from(count).unwrap_or(i64::MAX),
        })
}
