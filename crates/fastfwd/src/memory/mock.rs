//! Fake target image for tests.
//!
//! `MockImage` backs the whole stack, from scanner to hook installer to
//! time-skip controller, with a plain byte buffer, and records protection flips and
//! icache flushes so tests can assert on patch ordering. `Asm` is a tiny
//! emitter for the handful of instruction shapes the scanner recognizes.

use std::cell::RefCell;

use super::{CodeAddress, CodeImage, CodeWrite, PatchCode};
use crate::error::{Error, Result};

pub struct MockImage {
    base: u64,
    bytes: RefCell<Vec<u8>>,
    unprotected: RefCell<Vec<(u64, usize)>>,
    flushed: RefCell<Vec<(u64, usize)>>,
}

impl MockImage {
    fn span(&self, addr: CodeAddress, len: usize, write: bool) -> Result<std::ops::Range<usize>> {
        let err = || {
            if write {
                Error::MemoryWrite { addr, len }
            } else {
                Error::MemoryRead { addr, len }
            }
        };
        let start = addr.value().checked_sub(self.base).ok_or_else(err)? as usize;
        let end = start.checked_add(len).ok_or_else(err)?;
        if end > self.bytes.borrow().len() {
            return Err(err());
        }
        Ok(start..end)
    }

    pub fn unprotected(&self) -> Vec<(u64, usize)> {
        self.unprotected.borrow().clone()
    }

    pub fn flushed(&self) -> Vec<(u64, usize)> {
        self.flushed.borrow().clone()
    }

    pub fn bytes_at(&self, addr: CodeAddress, len: usize) -> Vec<u8> {
        self.read_bytes(addr, len).expect("in-range read")
    }
}

impl CodeImage for MockImage {
    fn read_bytes(&self, addr: CodeAddress, len: usize) -> Result<Vec<u8>> {
        let span = self.span(addr, len, false)?;
        Ok(self.bytes.borrow()[span].to_vec())
    }

    fn read_up_to(&self, addr: CodeAddress, len: usize) -> Result<Vec<u8>> {
        let avail = self
            .bytes
            .borrow()
            .len()
            .saturating_sub(addr.value().saturating_sub(self.base) as usize);
        if avail == 0 {
            return Err(Error::MemoryRead { addr, len });
        }
        self.read_bytes(addr, len.min(avail))
    }
}

impl CodeWrite for MockImage {
    fn write_bytes(&self, addr: CodeAddress, bytes: &[u8]) -> Result<()> {
        let span = self.span(addr, bytes.len(), true)?;
        self.bytes.borrow_mut()[span].copy_from_slice(bytes);
        Ok(())
    }
}

impl PatchCode for MockImage {
    fn unprotect(&self, addr: CodeAddress, len: usize) -> Result<()> {
        self.unprotected.borrow_mut().push((addr.value(), len));
        Ok(())
    }

    fn flush_icache(&self, addr: CodeAddress, len: usize) {
        self.flushed.borrow_mut().push((addr.value(), len));
    }
}

pub struct MockImageBuilder {
    base: u64,
    bytes: Vec<u8>,
}

impl MockImageBuilder {
    /// Zero-filled image of `size` bytes based at `base`.
    pub fn new(base: CodeAddress, size: usize) -> Self {
        MockImageBuilder {
            base: base.value(),
            bytes: vec![0u8; size],
        }
    }

    pub fn write(mut self, addr: CodeAddress, bytes: &[u8]) -> Self {
        let start = (addr.value() - self.base) as usize;
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn write_u32(self, addr: CodeAddress, value: u32) -> Self {
        self.write(addr, &value.to_le_bytes())
    }

    pub fn write_f32(self, addr: CodeAddress, value: f32) -> Self {
        self.write(addr, &value.to_bits().to_le_bytes())
    }

    /// Lay out an assembled snippet at the address it was assembled for.
    pub fn place(self, asm: &Asm) -> Self {
        self.write(CodeAddress::new(asm.start), &asm.bytes)
    }

    pub fn build(self) -> MockImage {
        MockImage {
            base: self.base,
            bytes: RefCell::new(self.bytes),
            unprotected: RefCell::new(Vec::new()),
            flushed: RefCell::new(Vec::new()),
        }
    }
}

/// Position-aware emitter for synthetic x86-32 instruction streams.
pub struct Asm {
    start: u64,
    bytes: Vec<u8>,
}

impl Asm {
    pub fn new(at: CodeAddress) -> Self {
        Asm {
            start: at.value(),
            bytes: Vec::new(),
        }
    }

    /// Address of the next instruction to be emitted.
    pub fn here(&self) -> CodeAddress {
        CodeAddress::new(self.start + self.bytes.len() as u64)
    }

    pub fn emit(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// `call rel32` to an absolute target, displacement computed from here.
    pub fn call_to(&mut self, target: CodeAddress) -> &mut Self {
        let disp = target.distance_from(self.here().add(5)) as i32;
        self.emit(&[0xE8]);
        self.emit(&disp.to_le_bytes())
    }

    /// `jmp rel32` to an absolute target.
    pub fn jmp_to(&mut self, target: CodeAddress) -> &mut Self {
        let disp = target.distance_from(self.here().add(5)) as i32;
        self.emit(&[0xE9]);
        self.emit(&disp.to_le_bytes())
    }

    /// `fld dword [disp32]`, the accessor-stub / float-trigger shape.
    pub fn fld_global(&mut self, global: CodeAddress) -> &mut Self {
        self.emit(&[0xD9, 0x05]);
        self.emit(&(global.value() as u32).to_le_bytes())
    }

    /// `fld dword [ebp+8]`, the first-stack-arg load.
    pub fn fld_stack_arg(&mut self) -> &mut Self {
        self.emit(&[0xD9, 0x45, 0x08])
    }

    /// `mov ecx, [disp32]`, the this-pointer load of a known global object.
    pub fn mov_ecx_global(&mut self, global: CodeAddress) -> &mut Self {
        self.emit(&[0x8B, 0x0D]);
        self.emit(&(global.value() as u32).to_le_bytes())
    }

    /// `cmp eax, imm8`.
    pub fn cmp_eax_imm8(&mut self, imm: u8) -> &mut Self {
        self.emit(&[0x83, 0xF8, imm])
    }

    pub fn push_ebp(&mut self) -> &mut Self {
        self.emit(&[0x55])
    }

    /// `mov ebp, esp`.
    pub fn mov_ebp_esp(&mut self) -> &mut Self {
        self.emit(&[0x8B, 0xEC])
    }

    pub fn nops(&mut self, count: usize) -> &mut Self {
        self.bytes.extend(std::iter::repeat_n(0x90, count));
        self
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(&[0xC3])
    }
}
