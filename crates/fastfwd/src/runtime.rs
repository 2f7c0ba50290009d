//! Process-global runtime for the live hook.
//!
//! The patched engine function jumps to a bare `extern "C"` symbol, which
//! has no way to carry state, so the active feature lives in a process
//! global. 32-bit only: the displacement-based patches and the pointer
//! width assumptions hold nowhere else.

use std::sync::{Mutex, MutexGuard, OnceLock};

use tracing::error;

use crate::error::Result;
use crate::feature::{FastForward, InterfaceFactory};
use crate::gamedata::SlotTable;
use crate::memory::{ARENA_SIZE, CodeAddress, ProcessImage};

type AccumulateTimeFn = unsafe extern "C" fn(f32);

static RUNTIME: OnceLock<Mutex<FastForward<ProcessImage>>> = OnceLock::new();

fn feature() -> Option<MutexGuard<'static, FastForward<ProcessImage>>> {
    // a poisoned lock means a previous frame panicked through here; the
    // feature state is plain data, so keep going with it
    RUNTIME
        .get()
        .map(|m| m.lock().unwrap_or_else(|p| p.into_inner()))
}

/// Replacement body the hook redirects `Host_AccumulateTime` to. Runs on
/// the engine's frame thread; must never unwind into engine code.
pub extern "C" fn accumulate_time_hook(dt: f32) {
    let Some(ff) = feature() else { return };
    let trampoline = ff.trampoline();
    let outcome = ff.on_frame(dt, |dt| {
        if let Some(t) = trampoline {
            let original: AccumulateTimeFn =
                // SAFETY: the trampoline was built from this function's own
                // prologue and stays mapped for the process lifetime.
                unsafe { std::mem::transmute(t.value() as usize) };
            // SAFETY: same calling convention and signature as the target.
            unsafe { original(dt) };
        }
    });
    if let Err(err) = outcome {
        error!("time skip failed, frame dropped: {err}");
    }
}

/// Resolve everything and install the hook into the current process.
/// Call once, from plugin load, before the first engine frame.
pub fn install<F: InterfaceFactory>(slots: SlotTable, factory: &F) -> Result<bool> {
    if RUNTIME.get().is_some() {
        return Ok(false);
    }
    let memory = std::sync::Arc::new(
        // SAFETY: we are loaded into the engine process; its image stays
        // mapped for as long as this plugin is.
        unsafe { ProcessImage::new() },
    );
    let arena = memory.alloc_executable_arena()?;
    let replacement = CodeAddress::new(accumulate_time_hook as usize as u64);
    let mut ff = FastForward::new(memory, slots, replacement, arena, ARENA_SIZE);
    if !ff.should_install() {
        return Ok(false);
    }
    ff.init(factory)?;
    let _ = RUNTIME.set(Mutex::new(ff));
    Ok(true)
}

/// Remove the hook. Safe to call whether or not `install` succeeded.
pub fn shutdown() -> Result<()> {
    match feature() {
        Some(mut ff) => ff.shutdown(),
        None => Ok(()),
    }
}

/// Console entry point: arms the skip on the installed runtime.
pub fn run_command(args: &[&str], console: &impl crate::command::Console) {
    match feature() {
        Some(ff) => ff.command().run(args, console),
        None => console.warn("fastforward is not installed"),
    }
}
