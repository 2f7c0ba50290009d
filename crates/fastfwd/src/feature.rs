//! The fast-forward feature: end-to-end wiring and lifecycle.
//!
//! Order matters in `init`: interfaces, then the anchor chain, then the
//! time globals, and the hook installation strictly last. Everything
//! before the hook is read-only, so any failure leaves the host process
//! untouched; once the hook is in, `shutdown` is the only way out.

use std::sync::Arc;

use tracing::{info, warn};

use crate::command::FastForwardCommand;
use crate::error::{Error, Result};
use crate::gamedata::SlotTable;
use crate::globals::recover_time_globals;
use crate::hook::{HookInstaller, InstalledHook};
use crate::memory::{CodeAddress, PatchCode};
use crate::scan::{ChainResolver, ResolvedChain};
use crate::timeskip::{PendingSkip, TimeSkip};

/// Interface version string of the dedicated-server API.
pub const HLDS_API_VERSION: &str = "VENGINE_HLDS_API_VERSION002";

/// Interface version string of the engine tool API.
pub const ENGINE_TOOL_VERSION: &str = "VENGINETOOL003";

/// Engine-side interface broker: maps a version string to the interface
/// object it names, if this build exports it.
pub trait InterfaceFactory {
    fn lookup(&self, name: &'static str) -> Option<CodeAddress>;
}

fn require_interface<F: InterfaceFactory>(
    factory: &F,
    name: &'static str,
) -> Result<CodeAddress> {
    factory.lookup(name).ok_or(Error::InterfaceMissing { name })
}

struct Active<M: PatchCode> {
    hook: InstalledHook,
    skip: TimeSkip<M>,
    chain: ResolvedChain,
}

/// The whole feature. Inactive until [`init`](FastForward::init) succeeds.
pub struct FastForward<M: PatchCode> {
    memory: Arc<M>,
    slots: SlotTable,
    pending: Arc<PendingSkip>,
    replacement: CodeAddress,
    installer: HookInstaller<M>,
    active: Option<Active<M>>,
}

impl<M: PatchCode> FastForward<M> {
    /// `replacement` is the address engine threads will be redirected to;
    /// `arena` is executable scratch for the trampoline (see
    /// [`ARENA_SIZE`](crate::memory::ARENA_SIZE)).
    pub fn new(
        memory: Arc<M>,
        slots: SlotTable,
        replacement: CodeAddress,
        arena: CodeAddress,
        arena_len: usize,
    ) -> Self {
        FastForward {
            installer: HookInstaller::new(memory.clone(), arena, arena_len),
            memory,
            slots,
            pending: Arc::new(PendingSkip::new()),
            replacement,
            active: None,
        }
    }

    /// Gate run before any engine access: without a complete slot table for
    /// this build there is nothing to scan from, so the feature stays off.
    pub fn should_install(&self) -> bool {
        if !self.slots.is_complete() {
            warn!(
                "no complete slot table for build {:?}; fast-forward disabled",
                self.slots.build
            );
            return false;
        }
        true
    }

    /// Resolve everything and install the hook. On any error the host is
    /// left exactly as it was.
    pub fn init<F: InterfaceFactory>(&mut self, factory: &F) -> Result<()> {
        let server_api = require_interface(factory, HLDS_API_VERSION)?;
        let tool = require_interface(factory, ENGINE_TOOL_VERSION)?;

        let chain = ChainResolver::new(
            &*self.memory,
            self.slots.run_frame_slot()?,
            self.slots.frame_slot()?,
        )
        .resolve(server_api)?;

        let globals = recover_time_globals(
            &*self.memory,
            tool,
            self.slots.get_real_time_slot()?,
            self.slots.host_frame_time_slot()?,
        )?;

        // the only write in the whole sequence
        let hook = self
            .installer
            .install(chain.accumulate_time, self.replacement)?;
        info!(
            "fast-forward armed: Host_AccumulateTime at {} (trampoline {})",
            chain.accumulate_time,
            hook.trampoline()
        );

        let skip = TimeSkip::new(self.memory.clone(), self.pending.clone(), globals);
        self.active = Some(Active { hook, skip, chain });
        Ok(())
    }

    /// Remove the hook and restore the original bytes. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            self.installer.uninstall(active.hook)?;
            info!("fast-forward hook removed");
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Console command bound to this feature's pending slot.
    pub fn command(&self) -> FastForwardCommand {
        FastForwardCommand::new(self.pending.clone())
    }

    /// Entry point of the callable original accumulator, once hooked.
    pub fn trampoline(&self) -> Option<CodeAddress> {
        self.active.as_ref().map(|a| a.hook.trampoline())
    }

    /// The resolved call chain, for diagnostics.
    pub fn chain(&self) -> Option<&ResolvedChain> {
        self.active.as_ref().map(|a| &a.chain)
    }

    /// Per-frame dispatch: consume a pending skip or fall through to the
    /// original accumulator.
    pub fn on_frame(&self, dt: f32, original: impl FnOnce(f32)) -> Result<()> {
        match &self.active {
            Some(active) => active.skip.on_frame(dt, original),
            None => {
                original(dt);
                Ok(())
            }
        }
    }
}
