//! Read/write access to target code and data.
//!
//! Everything that interprets raw target memory goes through these traits so
//! the scanner, the hook installer and the time-skip controller can all be
//! exercised against an in-memory fake instead of a live process.

use super::CodeAddress;
use crate::error::{Error, Result};

/// Width of a target pointer. The target is 32-bit x86 throughout.
pub const PTR_WIDTH: u64 = 4;

/// Read-only view of the target image.
pub trait CodeImage {
    /// Read exactly `len` bytes starting at `addr`.
    fn read_bytes(&self, addr: CodeAddress, len: usize) -> Result<Vec<u8>>;

    /// Read up to `len` bytes, stopping early at the end of the image.
    /// Live-process implementations have no known end and return `len` bytes.
    fn read_up_to(&self, addr: CodeAddress, len: usize) -> Result<Vec<u8>> {
        self.read_bytes(addr, len)
    }

    fn read_u8(&self, addr: CodeAddress) -> Result<u8> {
        Ok(self.read_bytes(addr, 1)?[0])
    }

    fn read_u32(&self, addr: CodeAddress) -> Result<u32> {
        let b = self.read_bytes(addr, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&self, addr: CodeAddress) -> Result<i32> {
        Ok(self.read_u32(addr)? as i32)
    }

    fn read_f32(&self, addr: CodeAddress) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32(addr)?))
    }

    /// Read a target pointer (4 bytes, little-endian).
    fn read_ptr(&self, addr: CodeAddress) -> Result<CodeAddress> {
        Ok(CodeAddress::new(self.read_u32(addr)? as u64))
    }

    /// Read entry `index` of the vtable of the object at `object`: one
    /// indirection to the table, then a slot-sized step into it.
    fn read_vtable_slot(&self, object: CodeAddress, index: usize) -> Result<CodeAddress> {
        let vtable = self.read_ptr(object)?;
        self.read_ptr(vtable.add(index as u64 * PTR_WIDTH))
    }
}

/// Mutable access to target data (the shared float globals).
pub trait CodeWrite: CodeImage {
    fn write_bytes(&self, addr: CodeAddress, bytes: &[u8]) -> Result<()>;

    fn write_f32(&self, addr: CodeAddress, value: f32) -> Result<()> {
        self.write_bytes(addr, &value.to_bits().to_le_bytes())
    }
}

/// Code patching on top of plain writes: page protection and instruction
/// cache maintenance. The 5-byte redirect must land in a single
/// `write_bytes` call so in-flight callers never see a torn prologue.
pub trait PatchCode: CodeWrite {
    fn unprotect(&self, addr: CodeAddress, len: usize) -> Result<()>;

    fn flush_icache(&self, addr: CodeAddress, len: usize);
}

/// A saved image region loaded from a dump file, rebased at `base`.
/// Used by the CLI and by every scanner test.
#[derive(Debug, Clone)]
pub struct DumpImage {
    base: CodeAddress,
    bytes: Vec<u8>,
}

impl DumpImage {
    pub fn new(base: CodeAddress, bytes: Vec<u8>) -> Self {
        DumpImage { base, bytes }
    }

    pub fn base(&self) -> CodeAddress {
        self.base
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn span(&self, addr: CodeAddress, len: usize) -> Result<std::ops::Range<usize>> {
        let start = addr
            .value()
            .checked_sub(self.base.value())
            .ok_or(Error::MemoryRead { addr, len })? as usize;
        let end = start.checked_add(len).ok_or(Error::MemoryRead { addr, len })?;
        if end > self.bytes.len() {
            return Err(Error::MemoryRead { addr, len });
        }
        Ok(start..end)
    }
}

impl CodeImage for DumpImage {
    fn read_bytes(&self, addr: CodeAddress, len: usize) -> Result<Vec<u8>> {
        Ok(self.bytes[self.span(addr, len)?].to_vec())
    }

    fn read_up_to(&self, addr: CodeAddress, len: usize) -> Result<Vec<u8>> {
        let start = addr
            .value()
            .checked_sub(self.base.value())
            .ok_or(Error::MemoryRead { addr, len })? as usize;
        if start >= self.bytes.len() {
            return Err(Error::MemoryRead { addr, len });
        }
        let end = (start + len).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }
}
