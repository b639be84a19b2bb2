//! x86-64 (System V) lowering of the kernel instruction list
//
// Register map: v=rdi w=rsi rows=rdx cols=rcx vals=r8 are the five SysV argument
// registers, so the prologue only has to save rbx (counter). inner=r9, row=rax, col=r10
// and r11 (immediate scratch) are caller-saved. acc=xmm0, term=xmm1.
//
// Only the handful of encodings the emitters need are implemented; every memory operand
// is `[base + index*8 + disp]` or `[base + disp]`.

use crate::error::{Result, SpecializeError};
use crate::ir::{Backend, Gpr, Inst, Label, Program};

const RAX: u8 = 0;
const RCX: u8 = 1;
const RDX: u8 = 2;
const RBX: u8 = 3;
const RSI: u8 = 6;
const RDI: u8 = 7;
const R8: u8 = 8;
const R9: u8 = 9;
const R10: u8 = 10;
const R11: u8 = 11;

const XMM_ACC: u8 = 0;
const XMM_TERM: u8 = 1;

const fn reg(r: Gpr) -> u8 {
    match r {
        Gpr::V => RDI,
        Gpr::W => RSI,
        Gpr::Rows => RDX,
        Gpr::Cols => RCX,
        Gpr::Vals => R8,
        Gpr::Counter => RBX,
        Gpr::Inner => R9,
        Gpr::Row => RAX,
        Gpr::Col => R10,
    }
}

/// The x86-64 System V backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86_64;

impl Backend for X86_64 {
    fn name(&self) -> &'static str {
        "x86_64-sysv"
    }

    fn lower(&self, program: &Program) -> Result<Vec<u8>> {
        let mut asm = Assembler::new(program.label_count());
        for inst in program.insts() {
            asm.inst(inst)?;
        }
        asm.finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct Mem {
    base: u8,
    index: Option<u8>,
    disp: i32,
}

impl Mem {
    const fn base(base: u8, disp: i32) -> Self {
        Self { base, index: None, disp }
    }

    /// `[base + index*8 + disp]`
    const fn indexed(base: u8, index: u8, disp: i32) -> Self {
        Self { base, index: Some(index), disp }
    }
}

struct Assembler {
    buf: Vec<u8>,
    bound: Vec<Option<usize>>,
    // (position of rel32, label)
    fixups: Vec<(usize, Label)>,
}

impl Assembler {
    fn new(labels: u32) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            bound: vec![None; labels as usize],
            fixups: Vec::new(),
        }
    }

    fn inst(&mut self, inst: &Inst) -> Result<()> {
        match *inst {
            Inst::Prologue => self.byte(0x50 + RBX), // push rbx
            Inst::Epilogue => {
                self.byte(0x58 + RBX); // pop rbx
                self.byte(0xC3);
            }
            Inst::Advance { reg: r, bytes } => self.add_imm(reg(r), bytes),
            Inst::Zero(r) => self.xor32(reg(r)),
            Inst::Align(n) => {
                let n = usize::from(n.max(1));
                while self.buf.len() % n != 0 {
                    self.byte(0x90);
                }
            }
            Inst::Bind(label) => {
                let slot = self
                    .bound
                    .get_mut(label.0 as usize)
                    .ok_or(SpecializeError::UnboundLabel(label.0))?;
                *slot = Some(self.buf.len());
            }
            Inst::LoadIndex { dst, base, disp } => {
                // movsxd dst, dword [base + disp]
                self.mem_op(None, true, &[0x63], reg(dst), Mem::base(reg(base), disp));
            }
            Inst::ClearAcc => {
                // xorpd xmm0, xmm0
                self.bytes(&[0x66, 0x0F, 0x57]);
                self.modrm(0b11, XMM_ACC, XMM_ACC);
            }
            Inst::MulAdd { val_disp, col, v_disp } => {
                // movsd xmm1, [vals + val_disp]
                self.mem_op(Some(0xF2), false, &[0x0F, 0x10], XMM_TERM, Mem::base(R8, val_disp));
                // mulsd xmm1, [v + col*8 + v_disp]
                self.mem_op(
                    Some(0xF2),
                    false,
                    &[0x0F, 0x59],
                    XMM_TERM,
                    Mem::indexed(RDI, reg(col), v_disp),
                );
                // addsd xmm0, xmm1
                self.bytes(&[0xF2, 0x0F, 0x58]);
                self.modrm(0b11, XMM_ACC, XMM_TERM);
            }
            Inst::StoreAdd { row, disp } => {
                let slot = Mem::indexed(RSI, reg(row), disp);
                // addsd xmm0, [w + row*8 + disp]; movsd [w + row*8 + disp], xmm0
                self.mem_op(Some(0xF2), false, &[0x0F, 0x58], XMM_ACC, slot);
                self.mem_op(Some(0xF2), false, &[0x0F, 0x11], XMM_ACC, slot);
            }
            Inst::LoopBack { counter, trips, target } => {
                let r = reg(counter);
                self.add_imm(r, 1);
                let trips = i32::try_from(trips).map_err(|_| SpecializeError::EncodingOverflow {
                    what: "loop trip count",
                    value: i64::from(trips),
                })?;
                self.cmp_imm(r, trips);
                self.jne(target)?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        for &(pos, label) in &self.fixups {
            let target = self
                .bound
                .get(label.0 as usize)
                .copied()
                .flatten()
                .ok_or(SpecializeError::UnboundLabel(label.0))?;
            let rel = rel32(target, pos + 4)?;
            self.buf[pos..pos + 4].copy_from_slice(&rel.to_le_bytes());
        }
        Ok(self.buf)
    }

    #[inline]
    fn byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    #[inline]
    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    #[inline]
    fn modrm(&mut self, md: u8, reg: u8, rm: u8) {
        self.byte((md << 6) | ((reg & 7) << 3) | (rm & 7));
    }

    fn rex(&mut self, w: bool, r: u8, x: u8, b: u8) {
        let rex = 0x40 | (u8::from(w) << 3) | ((r >> 3) << 2) | ((x >> 3) << 1) | (b >> 3);
        if rex != 0x40 {
            self.byte(rex);
        }
    }

    /// `[prefix] [REX] opcode modrm [sib] [disp]` with `reg` in the ModRM reg field.
    fn mem_op(&mut self, prefix: Option<u8>, w: bool, opcode: &[u8], reg: u8, mem: Mem) {
        if let Some(p) = prefix {
            self.byte(p);
        }
        self.rex(w, reg, mem.index.unwrap_or(0), mem.base);
        self.bytes(opcode);

        let md = if mem.disp == 0 && mem.base & 7 != 5 {
            0b00
        } else if i8::try_from(mem.disp).is_ok() {
            0b01
        } else {
            0b10
        };
        match mem.index {
            Some(index) => {
                debug_assert_ne!(index, 4, "rsp cannot be an index register");
                self.modrm(md, reg, 0b100);
                // scale 8
                self.byte((0b11 << 6) | ((index & 7) << 3) | (mem.base & 7));
            }
            None if mem.base & 7 == 4 => {
                self.modrm(md, reg, 0b100);
                self.byte((0b100 << 3) | (mem.base & 7));
            }
            None => self.modrm(md, reg, mem.base),
        }
        match md {
            0b01 => self.bytes(&mem.disp.to_le_bytes()[..1]),
            0b10 => self.bytes(&mem.disp.to_le_bytes()),
            _ => {}
        }
    }

    /// `add r64, imm`, going through r11 when the immediate exceeds 32 bits.
    fn add_imm(&mut self, r: u8, imm: i64) {
        if imm == 0 {
            return;
        }
        if let Ok(imm8) = i8::try_from(imm) {
            self.rex(true, 0, 0, r);
            self.byte(0x83);
            self.modrm(0b11, 0, r);
            self.bytes(&imm8.to_le_bytes());
        } else if let Ok(imm32) = i32::try_from(imm) {
            self.rex(true, 0, 0, r);
            self.byte(0x81);
            self.modrm(0b11, 0, r);
            self.bytes(&imm32.to_le_bytes());
        } else {
            // mov r11, imm64
            self.rex(true, 0, 0, R11);
            self.byte(0xB8 + (R11 & 7));
            self.bytes(&imm.to_le_bytes());
            // add r, r11
            self.rex(true, R11, 0, r);
            self.byte(0x01);
            self.modrm(0b11, R11, r);
        }
    }

    /// `cmp r64, imm`
    fn cmp_imm(&mut self, r: u8, imm: i32) {
        self.rex(true, 0, 0, r);
        if let Ok(imm8) = i8::try_from(imm) {
            self.byte(0x83);
            self.modrm(0b11, 7, r);
            self.bytes(&imm8.to_le_bytes());
        } else {
            self.byte(0x81);
            self.modrm(0b11, 7, r);
            self.bytes(&imm.to_le_bytes());
        }
    }

    /// `xor r32, r32`, which also clears the upper half.
    fn xor32(&mut self, r: u8) {
        self.rex(false, r, 0, r);
        self.byte(0x31);
        self.modrm(0b11, r, r);
    }

    fn jne(&mut self, target: Label) -> Result<()> {
        let bound = self
            .bound
            .get(target.0 as usize)
            .ok_or(SpecializeError::UnboundLabel(target.0))?;
        if let Some(dest) = *bound {
            let here = self.buf.len();
            if let Ok(rel) = i8::try_from(dest as i64 - (here as i64 + 2)) {
                self.byte(0x75);
                self.bytes(&rel.to_le_bytes());
            } else {
                self.bytes(&[0x0F, 0x85]);
                let rel = rel32(dest, here + 6)?;
                self.bytes(&rel.to_le_bytes());
            }
        } else {
            self.bytes(&[0x0F, 0x85]);
            self.fixups.push((self.buf.len(), target));
            self.bytes(&[0; 4]);
        }
        Ok(())
    }
}

fn rel32(target: usize, next: usize) -> Result<i32> {
    let rel = target as i64 - next as i64;
    i32::try_from(rel).map_err(|_| SpecializeError::EncodingOverflow { what: "branch offset", value: rel })
}
