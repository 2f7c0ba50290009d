//! Recovery of the engine's float time globals.
//!
//! The engine tool interface exposes accessor virtuals that each compile to
//! a bare `fld dword [disp32]; ret` stub. Reading the displacement out of
//! the stub yields the address of the global the accessor returns, which is
//! how we locate `realtime` and `host_frametime` without any symbol
//! information.

use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{CodeAddress, CodeImage, CodeWrite};
use crate::scan::direct_float_load;

/// One float global in engine memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalFloatSlot {
    addr: CodeAddress,
}

impl GlobalFloatSlot {
    pub fn new(addr: CodeAddress) -> Self {
        GlobalFloatSlot { addr }
    }

    pub fn addr(&self) -> CodeAddress {
        self.addr
    }

    pub fn read<M: CodeImage>(&self, memory: &M) -> Result<f32> {
        memory.read_f32(self.addr)
    }

    /// Read-modify-write; the engine mutates these fields from the same
    /// thread the hook runs on, so this is not racy in practice.
    pub fn add<M: CodeWrite>(&self, memory: &M, delta: f32) -> Result<()> {
        let value = memory.read_f32(self.addr)?;
        memory.write_f32(self.addr, value + delta)
    }
}

/// The pair of globals a time skip advances together. Moving `realtime`
/// without `host_frametime` (or vice versa) desyncs the server frame loop.
#[derive(Debug, Clone, Copy)]
pub struct TimeGlobals {
    pub realtime: GlobalFloatSlot,
    pub host_frametime: GlobalFloatSlot,
}

fn accessor_global<M: CodeImage>(
    image: &M,
    tool_iface: CodeAddress,
    slot: usize,
    name: &str,
) -> Result<GlobalFloatSlot> {
    let accessor = image.read_vtable_slot(tool_iface, slot)?;
    let Some(global) = direct_float_load(image, accessor)? else {
        // accessor body changed shape; bail rather than dereference a guess
        return Err(Error::not_found(format!("{name} accessor stub")));
    };
    debug!("{name} accessor at {accessor} loads {global}");
    Ok(GlobalFloatSlot::new(global))
}

/// Resolve both time globals through the tool interface's accessor
/// virtuals.
pub fn recover_time_globals<M: CodeImage>(
    image: &M,
    tool_iface: CodeAddress,
    get_real_time_slot: usize,
    host_frame_time_slot: usize,
) -> Result<TimeGlobals> {
    let realtime = accessor_global(image, tool_iface, get_real_time_slot, "realtime")?;
    let host_frametime =
        accessor_global(image, tool_iface, host_frame_time_slot, "host_frametime")?;
    Ok(TimeGlobals {
        realtime,
        host_frametime,
    })
}
