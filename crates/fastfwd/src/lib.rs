//! # fastfwd
//!
//! Runtime pattern-scanning and inline hooking for the engine's frame
//! loop, built around one feature: a console-armed one-shot time skip.
//!
//! This crate provides:
//! - A bounds-checked model of target code memory (live process or dump)
//! - x86-32 instruction-length classification for safe linear scans
//! - Structural matchers and the fixed anchor chain down to the
//!   time-accumulation function
//! - An inline hook installer with exact prologue relocation
//! - The fast-forward feature itself: slot tables, interface lookup,
//!   the pending-skip hand-off, and the `fastforward` console command
//!
//! Everything above the [`memory`] traits is pure over bytes, so the whole
//! pipeline runs unchanged against a binary dump on any host.

pub mod command;
pub mod error;
pub mod feature;
pub mod gamedata;
pub mod globals;
pub mod hook;
pub mod memory;
#[cfg(target_arch = "x86")]
pub mod runtime;
pub mod scan;
pub mod timeskip;
pub mod x86;

pub use command::{Console, FastForwardCommand, parse_seconds};
pub use error::{Error, Result};
pub use feature::{ENGINE_TOOL_VERSION, FastForward, HLDS_API_VERSION, InterfaceFactory};
pub use gamedata::SlotTable;
pub use globals::{GlobalFloatSlot, TimeGlobals, recover_time_globals};
pub use hook::{HookInstaller, InstalledHook, PATCH_LEN, TrampolinePool};
pub use memory::{
    ARENA_SIZE, CodeAddress, CodeImage, CodeWrite, DumpImage, PTR_WIDTH, PatchCode, ProcessImage,
};
pub use scan::{ChainResolver, ResolvedChain};
pub use timeskip::{PendingSkip, TimeSkip};
