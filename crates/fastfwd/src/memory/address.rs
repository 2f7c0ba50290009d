//! Opaque code addresses.
//!
//! A `CodeAddress` points into the host program's mapped executable image.
//! It is never dereferenced directly; all reads and writes go through the
//! [`CodeImage`](super::CodeImage) family of traits, which keeps the unsafe
//! raw-memory surface confined to one module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An address inside the target image. The target is 32-bit x86, so values
/// always fit in a u32 for a live process; dumps may be rebased anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeAddress(u64);

impl CodeAddress {
    pub const fn new(addr: u64) -> Self {
        CodeAddress(addr)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Advance by an unsigned byte count.
    pub const fn add(self, bytes: u64) -> Self {
        CodeAddress(self.0 + bytes)
    }

    /// Apply a signed displacement, as encoded by relative branches.
    pub const fn offset(self, disp: i64) -> Self {
        CodeAddress(self.0.wrapping_add_signed(disp))
    }

    /// Byte distance from `other` to `self`, signed.
    pub const fn distance_from(self, other: CodeAddress) -> i64 {
        self.0.wrapping_sub(other.0) as i64
    }
}

impl fmt::Display for CodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl From<u64> for CodeAddress {
    fn from(addr: u64) -> Self {
        CodeAddress(addr)
    }
}
