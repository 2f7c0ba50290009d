//! Inline function hooking.
//!
//! A hook rewrites the first five bytes of a live function into a relative
//! jump to the replacement, after copying the overwritten prologue (rounded
//! up to an instruction boundary) into a trampoline that ends with a jump
//! back to the continuation. The trampoline is completed and flushed before
//! the target is touched, and the redirect lands in a single 5-byte write,
//! so the host's own threads only ever see the wholly-old or wholly-new
//! function body.
//!
//! Deliberately narrow: prologues containing calls or jumps are refused
//! rather than relocated. The functions this plugin hooks have plain
//! frame-setup prologues, and refusing is safer than a half-correct
//! relocator.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{CodeAddress, PatchCode};
use crate::x86::{self, op};

/// Bytes overwritten at the target: one `jmp rel32`.
pub const PATCH_LEN: usize = 5;

/// Prologue bytes read ahead of measuring; enough for `PATCH_LEN` worth of
/// the longest supported instructions.
const PROLOGUE_READ: usize = 32;

/// Cap on `jmp` thunks followed before giving up, to catch cycles.
const MAX_THUNK_HOPS: usize = 16;

/// Encode `jmp rel32` from `from` to `to`.
fn jmp_rel32(from: CodeAddress, to: CodeAddress) -> [u8; 5] {
    let disp = to.distance_from(from.add(PATCH_LEN as u64)) as i32;
    let d = disp.to_le_bytes();
    [op::JMP_REL32, d[0], d[1], d[2], d[3]]
}

/// Bump allocator over a fixed executable arena. Nothing is ever freed;
/// trampolines must stay callable for as long as anything might still be
/// running through them.
#[derive(Debug)]
pub struct TrampolinePool {
    arena: CodeAddress,
    len: usize,
    used: usize,
}

impl TrampolinePool {
    pub fn new(arena: CodeAddress, len: usize) -> Self {
        TrampolinePool {
            arena,
            len,
            used: 0,
        }
    }

    fn alloc(&mut self, n: usize) -> Result<CodeAddress> {
        if self.used + n > self.len {
            return Err(Error::TrampolineSpace);
        }
        let at = self.arena.add(self.used as u64);
        self.used += n;
        Ok(at)
    }
}

/// Record of one installed hook. Holding this is the only way to uninstall,
/// which makes "uninstall without install" unrepresentable; the saved bytes
/// restore the target to its exact pre-hook state.
#[derive(Debug)]
pub struct InstalledHook {
    target: CodeAddress,
    replacement: CodeAddress,
    trampoline: CodeAddress,
    saved: Vec<u8>,
}

impl InstalledHook {
    /// The address actually patched (after following any jmp thunks).
    pub fn target(&self) -> CodeAddress {
        self.target
    }

    pub fn replacement(&self) -> CodeAddress {
        self.replacement
    }

    /// Entry point of the callable original.
    pub fn trampoline(&self) -> CodeAddress {
        self.trampoline
    }

    /// Number of prologue bytes relocated into the trampoline.
    pub fn saved_len(&self) -> usize {
        self.saved.len()
    }
}

/// Installs and removes inline hooks over one patchable image.
pub struct HookInstaller<M: PatchCode> {
    memory: Arc<M>,
    pool: TrampolinePool,
    installed: HashSet<u64>,
}

impl<M: PatchCode> HookInstaller<M> {
    /// `arena` must be executable and writable (see
    /// [`ProcessImage::alloc_executable_arena`](crate::memory::ProcessImage::alloc_executable_arena)).
    pub fn new(memory: Arc<M>, arena: CodeAddress, arena_len: usize) -> Self {
        HookInstaller {
            memory,
            pool: TrampolinePool::new(arena, arena_len),
            installed: HashSet::new(),
        }
    }

    /// Some targets are import thunks that immediately jump elsewhere; hook
    /// the underlying body instead so the prologue we save is real code.
    fn follow_jmp_thunks(&self, mut addr: CodeAddress) -> Result<CodeAddress> {
        for _ in 0..MAX_THUNK_HOPS {
            if self.memory.read_u8(addr)? != op::JMP_REL32 {
                return Ok(addr);
            }
            let disp = self.memory.read_i32(addr.add(1))?;
            addr = addr.add(PATCH_LEN as u64).offset(disp as i64);
        }
        Err(Error::UnsafePrologue {
            addr,
            reason: "jmp thunk chain too deep",
        })
    }

    /// Instruction-exact count of prologue bytes that must move to the
    /// trampoline: the smallest instruction boundary at or past `PATCH_LEN`.
    fn measure_prologue(&self, target: CodeAddress, buf: &[u8]) -> Result<usize> {
        let mut len = 0usize;
        loop {
            // a relocated call would return into the trampoline; a
            // relocated jmp would leave the saved bytes dead. Refuse both.
            if buf.get(len) == Some(&op::CALL_REL32) {
                return Err(Error::UnsafePrologue {
                    addr: target.add(len as u64),
                    reason: "call instruction in prologue",
                });
            }
            len += x86::insn_len(&buf[len..], target.add(len as u64))?;
            if len >= PATCH_LEN {
                return Ok(len);
            }
            if buf.get(len) == Some(&op::JMP_REL32) {
                return Err(Error::UnsafePrologue {
                    addr: target.add(len as u64),
                    reason: "jmp instruction in prologue",
                });
            }
        }
    }

    /// Redirect `target` to `replacement`, returning the record that owns
    /// the callable original. Installing twice on one target corrupts the
    /// trampoline chain, so a second install is rejected outright.
    pub fn install(
        &mut self,
        target: CodeAddress,
        replacement: CodeAddress,
    ) -> Result<InstalledHook> {
        let target = self.follow_jmp_thunks(target)?;
        if self.installed.contains(&target.value()) {
            return Err(Error::AlreadyHooked { addr: target });
        }

        let buf = self.memory.read_up_to(target, PROLOGUE_READ)?;
        let len = self.measure_prologue(target, &buf)?;
        let saved = buf[..len].to_vec();

        // fail on an unwritable target before consuming arena space
        self.memory.unprotect(target, PATCH_LEN)?;

        // trampoline first: relocated prologue, then jump to continuation
        let trampoline = self.pool.alloc(len + PATCH_LEN)?;
        self.memory.write_bytes(trampoline, &saved)?;
        self.memory.write_bytes(
            trampoline.add(len as u64),
            &jmp_rel32(trampoline.add(len as u64), target.add(len as u64)),
        )?;
        self.memory.flush_icache(trampoline, len + PATCH_LEN);

        // only now make the redirect visible, in one write
        self.memory
            .write_bytes(target, &jmp_rel32(target, replacement))?;
        self.memory.flush_icache(target, PATCH_LEN);

        debug!("hooked {target} -> {replacement} (trampoline {trampoline}, {len} bytes saved)");
        self.installed.insert(target.value());
        Ok(InstalledHook {
            target,
            replacement,
            trampoline,
            saved,
        })
    }

    /// Restore the target to its byte-identical pre-install state. Consumes
    /// the record; the trampoline stays allocated in case a call raced in.
    pub fn uninstall(&mut self, hook: InstalledHook) -> Result<()> {
        self.memory.unprotect(hook.target, hook.saved.len())?;
        self.memory.write_bytes(hook.target, &hook.saved)?;
        self.memory.flush_icache(hook.target, hook.saved.len());
        self.installed.remove(&hook.target.value());
        debug!("unhooked {}", hook.target);
        Ok(())
    }
}
