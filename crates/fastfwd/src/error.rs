use thiserror::Error;

use crate::memory::CodeAddress;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing {name} interface")]
    InterfaceMissing { name: &'static str },

    #[error("no vtable index for {name} in this build's slot table")]
    SlotMissing { name: &'static str },

    #[error("couldn't find {what}")]
    PatternNotFound { what: String },

    #[error("unknown or invalid instruction {opcode:#04x} at {addr}")]
    UnknownInstruction { opcode: u8, addr: CodeAddress },

    #[error("failed to read {len} bytes at {addr}")]
    MemoryRead { addr: CodeAddress, len: usize },

    #[error("failed to write {len} bytes at {addr}")]
    MemoryWrite { addr: CodeAddress, len: usize },

    #[error("failed to make {len} bytes at {addr} writable")]
    Unprotect { addr: CodeAddress, len: usize },

    #[error("{addr} is already hooked")]
    AlreadyHooked { addr: CodeAddress },

    #[error("can't trampoline prologue at {addr}: {reason}")]
    UnsafePrologue {
        addr: CodeAddress,
        reason: &'static str,
    },

    #[error("out of trampoline space")]
    TrampolineSpace,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for the labelled scan-failure variant.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::PatternNotFound { what: what.into() }
    }
}
