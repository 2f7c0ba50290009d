//! Minimal x86-32 instruction-length classifier.
//!
//! This is not a disassembler. The scanner only ever needs to know how far
//! to step to stay on instruction boundaries inside a handful of known
//! function shapes, so the table below covers the instruction classes those
//! functions can contain: register/memory moves, ALU with immediates, x87
//! loads and stores, pushes, near branches, and little else. Anything
//! outside the table is a hard error; a guessed length would silently
//! desynchronize every later step of a scan.

use crate::error::{Error, Result};
use crate::memory::CodeAddress;

/// Opcode constants the matchers key on.
pub mod op {
    /// `call rel32`.
    pub const CALL_REL32: u8 = 0xE8;
    /// `jmp rel32`.
    pub const JMP_REL32: u8 = 0xE9;
    /// `mov r32, r/m32`.
    pub const MOV_R32_RM32: u8 = 0x8B;
    /// Group-1 ALU `r/m32, imm8` (sign-extended); reg field selects the op.
    pub const ALU_RM32_IMM8: u8 = 0x83;
    /// x87 escape D9 (single-precision load/store block).
    pub const FLT_BLK2: u8 = 0xD9;
    /// Prefix that shrinks immediate-bearing operands to 16 bits.
    pub const OPSIZE_PREFIX: u8 = 0x66;
}

/// Build a ModRM byte from its three fields.
pub const fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    (mode << 6) | (reg << 3) | rm
}

/// Mask selecting the reg field of a ModRM byte.
pub const MODRM_REG_MASK: u8 = 0x38;

/// Byte length of `call rel32` / `jmp rel32`.
pub const CALL_LEN: usize = 5;

/// One classified instruction: where it starts and how many bytes it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionSpan {
    /// Offset from the start of the scan buffer.
    pub offset: usize,
    /// Absolute address of the first byte.
    pub addr: CodeAddress,
    /// Total length including prefixes, ModRM/SIB, displacement, immediate.
    pub len: usize,
}

/// Bytes consumed by a ModRM byte plus its SIB and displacement, for 32-bit
/// addressing. `None` if the buffer ends mid-operand.
fn modrm_span(bytes: &[u8]) -> Option<usize> {
    let m = *bytes.first()?;
    let mode = m >> 6;
    let rm = m & 7;
    if mode == 3 {
        return Some(1);
    }
    let mut n = 1;
    if rm == 4 {
        let sib = *bytes.get(1)?;
        n += 1;
        if mode == 0 && (sib & 7) == 5 {
            n += 4;
        }
    }
    match mode {
        0 if rm == 5 => n += 4,
        1 => n += 1,
        2 => n += 4,
        _ => {}
    }
    Some(n)
}

/// Length in bytes of the instruction at the start of `bytes`.
///
/// `addr` is the absolute address of `bytes[0]`, used only for diagnostics.
/// Unknown or unhandled opcodes fail loudly; the caller must abort its scan.
pub fn insn_len(bytes: &[u8], addr: CodeAddress) -> Result<usize> {
    let truncated = |need: usize| Error::MemoryRead { addr, len: need };

    let mut pos = 0usize;
    let mut osize = 4usize;
    while *bytes.get(pos).ok_or_else(|| truncated(pos + 1))? == op::OPSIZE_PREFIX {
        osize = 2;
        pos += 1;
    }
    let b = bytes[pos];
    let tail = &bytes[pos + 1..];
    let modrm_only = || modrm_span(tail).ok_or_else(|| truncated(pos + 2));

    let body = match b {
        // ALU op r/m,r and r,r/m forms (add/or/adc/sbb/and/sub/xor/cmp)
        0x00..=0x03 | 0x08..=0x0B | 0x10..=0x13 | 0x18..=0x1B | 0x20..=0x23 | 0x28..=0x2B
        | 0x30..=0x33 | 0x38..=0x3B => 1 + modrm_only()?,
        // ALU al, imm8
        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => 2,
        // ALU eAX, imm
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => 1 + osize,
        // push/pop r32
        0x50..=0x5F => 1,
        // push imm
        0x68 => 1 + osize,
        0x6A => 2,
        // imul r, r/m, imm
        0x69 => 1 + modrm_only()? + osize,
        0x6B => 1 + modrm_only()? + 1,
        // jcc rel8
        0x70..=0x7F => 2,
        // group-1 ALU with immediate
        0x80 => 1 + modrm_only()? + 1,
        0x81 => 1 + modrm_only()? + osize,
        0x83 => 1 + modrm_only()? + 1,
        // test/xchg/mov r/m, lea
        0x84..=0x8B | 0x8D => 1 + modrm_only()?,
        // nop / xchg eax,r32 / cwde / cdq
        0x90..=0x99 => 1,
        // mov eAX, [moffs32] and back (address size is always 4 here)
        0xA1 | 0xA3 => 5,
        // test al/eAX, imm
        0xA8 => 2,
        0xA9 => 1 + osize,
        // mov r8/r32, imm
        0xB0..=0xB7 => 2,
        0xB8..=0xBF => 1 + osize,
        // ret / ret imm16 / leave
        0xC2 => 3,
        0xC3 | 0xC9 => 1,
        // mov r/m, imm
        0xC6 => 1 + modrm_only()? + 1,
        0xC7 => 1 + modrm_only()? + osize,
        // x87 escape block: ModRM encodes the memory operand (or a
        // register op when mode == 3); never carries an immediate
        0xD8..=0xDF => 1 + modrm_only()?,
        // call/jmp rel32 (branch displacement stays 32-bit regardless of 66)
        0xE8 | 0xE9 => 5,
        0xEB => 2,
        // group-3: test r/m, imm carries the immediate, the rest don't
        0xF6 | 0xF7 => {
            let m = modrm_only()?;
            let reg = (tail[0] >> 3) & 7;
            let imm = if reg <= 1 {
                if b == 0xF6 { 1 } else { osize }
            } else {
                0
            };
            1 + m + imm
        }
        // group-5: inc/dec/call/jmp/push r/m
        0xFF => 1 + modrm_only()?,
        // two-byte escape
        0x0F => {
            let b2 = *tail.first().ok_or_else(|| truncated(pos + 2))?;
            let tail2 = &tail[1..];
            let modrm2 = || modrm_span(tail2).ok_or_else(|| truncated(pos + 3));
            match b2 {
                // jcc rel32
                0x80..=0x8F => 2 + 4,
                // setcc
                0x90..=0x9F => 2 + modrm2()?,
                // long nop
                0x1F => 2 + modrm2()?,
                // imul / movzx / movsx
                0xAF | 0xB6 | 0xB7 | 0xBE | 0xBF => 2 + modrm2()?,
                _ => {
                    return Err(Error::UnknownInstruction {
                        opcode: b2,
                        addr: addr.add(pos as u64),
                    });
                }
            }
        }
        _ => {
            return Err(Error::UnknownInstruction {
                opcode: b,
                addr: addr.add(pos as u64),
            });
        }
    };
    Ok(pos + body)
}

/// Steps over a byte buffer one instruction at a time.
///
/// Only instructions *starting* before `bound` are yielded; the buffer may
/// carry a few slack bytes past the bound so an instruction straddling it
/// still decodes. Exhausting the bound yields `None`; the caller decides
/// whether that is a pattern-not-found failure.
pub struct Cursor<'a> {
    buf: &'a [u8],
    base: CodeAddress,
    bound: usize,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8], base: CodeAddress, bound: usize) -> Self {
        Cursor {
            buf,
            base,
            bound: bound.min(buf.len()),
            pos: 0,
        }
    }

    /// Classify the instruction at the current position and step past it.
    pub fn next_span(&mut self) -> Result<Option<InstructionSpan>> {
        if self.pos >= self.bound {
            return Ok(None);
        }
        let addr = self.base.add(self.pos as u64);
        let len = insn_len(&self.buf[self.pos..], addr)?;
        let span = InstructionSpan {
            offset: self.pos,
            addr,
            len,
        };
        self.pos += len;
        Ok(Some(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn len(bytes: &[u8]) -> Result<usize> {
        insn_len(bytes, CodeAddress::new(0x1000))
    }

    #[test]
    fn test_simple_lengths() {
        assert_eq!(len(&[0x55]).unwrap(), 1); // push ebp
        assert_eq!(len(&[0xC3]).unwrap(), 1); // ret
        assert_eq!(len(&[0xC2, 0x08, 0x00]).unwrap(), 3); // ret 8
        assert_eq!(len(&[0xE8, 1, 2, 3, 4]).unwrap(), 5); // call rel32
        assert_eq!(len(&[0xEB, 0x10]).unwrap(), 2); // jmp rel8
        assert_eq!(len(&[0x6A, 0x01]).unwrap(), 2); // push 1
        assert_eq!(len(&[0xB8, 1, 2, 3, 4]).unwrap(), 5); // mov eax, imm32
    }

    #[test]
    fn test_modrm_addressing_forms() {
        // mov ecx, [disp32]
        assert_eq!(len(&[0x8B, 0x0D, 1, 2, 3, 4]).unwrap(), 6);
        // mov eax, ecx (mode 3)
        assert_eq!(len(&[0x8B, 0xC1]).unwrap(), 2);
        // mov eax, [ebp+8] (disp8)
        assert_eq!(len(&[0x8B, 0x45, 0x08]).unwrap(), 3);
        // mov eax, [esi+disp32]
        assert_eq!(len(&[0x8B, 0x86, 1, 2, 3, 4]).unwrap(), 6);
        // mov eax, [eax*4+disp32]: SIB with base=101, mode 0
        assert_eq!(len(&[0x8B, 0x04, 0x85, 1, 2, 3, 4]).unwrap(), 7);
        // mov eax, [esp+8]: SIB, disp8
        assert_eq!(len(&[0x8B, 0x44, 0x24, 0x08]).unwrap(), 4);
    }

    #[test]
    fn test_x87_forms() {
        // fld dword [disp32]
        assert_eq!(len(&[0xD9, 0x05, 1, 2, 3, 4]).unwrap(), 6);
        // fld dword [ebp+8]
        assert_eq!(len(&[0xD9, 0x45, 0x08]).unwrap(), 3);
        // fstp dword [esp] (SIB)
        assert_eq!(len(&[0xD9, 0x1C, 0x24]).unwrap(), 3);
        // fld st(0) (mode 3)
        assert_eq!(len(&[0xD9, 0xC0]).unwrap(), 2);
    }

    #[test]
    fn test_immediates_and_prefix() {
        // cmp eax, 2
        assert_eq!(len(&[0x83, 0xF8, 0x02]).unwrap(), 3);
        // cmp dword [ebp-4], 2
        assert_eq!(len(&[0x83, 0x7D, 0xFC, 0x02]).unwrap(), 4);
        // sub esp, imm32
        assert_eq!(len(&[0x81, 0xEC, 1, 2, 3, 4]).unwrap(), 6);
        // mov word-sized immediate under the 66 prefix
        assert_eq!(len(&[0x66, 0xB8, 0x01, 0x00]).unwrap(), 4);
        // test r/m32, imm32 vs not r/m32
        assert_eq!(len(&[0xF7, 0xC0, 1, 2, 3, 4]).unwrap(), 6);
        assert_eq!(len(&[0xF7, 0xD0]).unwrap(), 2);
    }

    #[test]
    fn test_two_byte_opcodes() {
        // jz rel32
        assert_eq!(len(&[0x0F, 0x84, 1, 2, 3, 4]).unwrap(), 6);
        // movzx eax, byte [ecx]
        assert_eq!(len(&[0x0F, 0xB6, 0x01]).unwrap(), 3);
    }

    #[test]
    fn test_unknown_opcode_fails_loudly() {
        let err = len(&[0x0F, 0x05]).unwrap_err(); // syscall: not in our set
        assert!(matches!(err, Error::UnknownInstruction { opcode: 0x05, .. }));
        let err = len(&[0xF4]).unwrap_err(); // hlt
        assert!(matches!(err, Error::UnknownInstruction { opcode: 0xF4, .. }));
    }

    #[test]
    fn test_truncated_operand_fails() {
        assert!(len(&[0x8B]).is_err());
        assert!(len(&[]).is_err());
    }

    #[test]
    fn test_cursor_stops_at_bound() {
        // push ebp; mov ebp,esp; call; ret = 1 + 2 + 5 + 1 bytes
        let buf = [0x55, 0x8B, 0xEC, 0xE8, 0, 0, 0, 0, 0xC3];
        let mut cur = Cursor::new(&buf, CodeAddress::new(0x400000), 4);
        let spans: Vec<_> = std::iter::from_fn(|| cur.next_span().unwrap()).collect();
        // bound 4 admits offsets 0, 1 and 3; the ret at offset 8 is out
        assert_eq!(
            spans.iter().map(|s| (s.offset, s.len)).collect::<Vec<_>>(),
            vec![(0, 1), (1, 2), (3, 5)]
        );
        assert_eq!(spans[2].addr, CodeAddress::new(0x400003));
    }
}
