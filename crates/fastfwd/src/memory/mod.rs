//! Target memory model: opaque addresses and checked access traits.

mod address;
mod image;
mod process;

#[cfg(test)]
pub mod mock;

pub use address::CodeAddress;
pub use image::{CodeImage, CodeWrite, DumpImage, PTR_WIDTH, PatchCode};
pub use process::{ARENA_SIZE, ProcessImage};
