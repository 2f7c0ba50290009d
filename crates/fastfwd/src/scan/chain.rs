//! The anchor chain: from a vtable entry to the accumulation leaf.
//!
//! The engine exports no symbol for the function we need, but the call path
//! down to it has a fixed structure: a virtual frame entry point, a
//! this-pointer load of the engine global, a simplified switch dispatch,
//! and a run of thin wrappers that each forward a single float. Each hop
//! assumes the exact shape the previous hop resolved, so the order is
//! fixed; any miss aborts the whole resolution with a named diagnostic.

use tracing::debug;

use super::matchers::{
    find_compare_imm8_then_call, find_float_forward_call, find_next_call,
    find_stack_float_then_call, find_this_pointer_load,
};
use crate::error::Result;
use crate::memory::{CodeAddress, CodeImage};

/// Immediate compared in the host-state dispatch for the "run" state.
const STATE_RUN_CASE: u8 = 2;

/// disp8 of the first stack argument under a standard frame ([ebp+8]).
const FIRST_STACK_ARG: u8 = 8;

/// Every address the resolution produced, outermost first. Only
/// `accumulate_time` gets hooked; the rest are kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedChain {
    pub run_frame: CodeAddress,
    pub frame: CodeAddress,
    pub host_state_frame: CodeAddress,
    pub frame_update: CodeAddress,
    pub state_run: CodeAddress,
    pub host_run_frame: CodeAddress,
    pub host_run_frame_inner: CodeAddress,
    pub accumulate_time: CodeAddress,
}

impl ResolvedChain {
    /// Hops in resolution order, labelled for display.
    pub fn hops(&self) -> [(&'static str, CodeAddress); 8] {
        [
            ("RunFrame", self.run_frame),
            ("Frame", self.frame),
            ("HostState_Frame", self.host_state_frame),
            ("FrameUpdate", self.frame_update),
            ("State_Run", self.state_run),
            ("Host_RunFrame", self.host_run_frame),
            ("_Host_RunFrame", self.host_run_frame_inner),
            ("Host_AccumulateTime", self.accumulate_time),
        ]
    }
}

/// Runs the fixed scan-and-follow pipeline. Pure over the image: the same
/// bytes always resolve to the same chain.
pub struct ChainResolver<'a, M: CodeImage> {
    image: &'a M,
    run_frame_slot: usize,
    frame_slot: usize,
}

impl<'a, M: CodeImage> ChainResolver<'a, M> {
    pub fn new(image: &'a M, run_frame_slot: usize, frame_slot: usize) -> Self {
        ChainResolver {
            image,
            run_frame_slot,
            frame_slot,
        }
    }

    /// Resolve the whole chain starting from the dedicated-server API
    /// interface handle.
    pub fn resolve(&self, server_api: CodeAddress) -> Result<ResolvedChain> {
        let image = self.image;

        // hop 1: the per-frame entry point is a plain vtable slot
        let run_frame = image.read_vtable_slot(server_api, self.run_frame_slot)?;
        debug!("RunFrame at {run_frame}");

        // hop 2: RunFrame immediately calls a virtual on the engine global;
        // find the this-pointer load, then go through that object's vtable
        let eng_global = find_this_pointer_load(image, run_frame, "eng global object")?;
        let eng = image.read_ptr(eng_global)?;
        let frame = image.read_vtable_slot(eng, self.frame_slot)?;
        debug!("Frame at {frame} (eng global {eng_global})");

        // hop 3: the state switch collapses to `cmp, 2` and a call
        let host_state_frame =
            find_compare_imm8_then_call(image, frame, STATE_RUN_CASE, "HostState_Frame")?;
        debug!("HostState_Frame at {host_state_frame}");

        // hop 4: HostState_Frame holds a single direct call worth taking
        let frame_update = find_next_call(image, host_state_frame, "CHostState::FrameUpdate")?;
        debug!("FrameUpdate at {frame_update}");

        // hops 5-7: each wrapper just forwards the frame time float
        let state_run = find_float_forward_call(image, frame_update, "CHostState::State_Run")?;
        debug!("State_Run at {state_run}");
        let host_run_frame = find_float_forward_call(image, state_run, "Host_RunFrame")?;
        debug!("Host_RunFrame at {host_run_frame}");
        let host_run_frame_inner =
            find_float_forward_call(image, host_run_frame, "_Host_RunFrame")?;
        debug!("_Host_RunFrame at {host_run_frame_inner}");

        // hop 8: the innermost wrapper reloads the time argument off its
        // stack frame right before the call we want
        let accumulate_time = find_stack_float_then_call(
            image,
            host_run_frame_inner,
            FIRST_STACK_ARG,
            "Host_AccumulateTime",
        )?;
        debug!("Host_AccumulateTime at {accumulate_time}");

        Ok(ResolvedChain {
            run_frame,
            frame,
            host_state_frame,
            frame_update,
            state_run,
            host_run_frame,
            host_run_frame_inner,
            accumulate_time,
        })
    }
}
