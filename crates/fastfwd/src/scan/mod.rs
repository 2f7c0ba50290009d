//! Structural pattern scanning over raw instruction streams.
//!
//! The matchers here recognize a narrow set of instruction shapes (float
//! loads, immediate compares, this-pointer loads, relative calls) and the
//! chain resolver strings them into the fixed hop sequence that leads from
//! a vtable entry to the time-accumulation leaf function.

pub mod chain;
mod matchers;

pub use chain::{ChainResolver, ResolvedChain};
pub use matchers::{
    HOP_WINDOW, ScanWindow, THISPTR_WINDOW, direct_float_load, find_compare_imm8_then_call,
    find_float_forward_call, find_next_call, find_stack_float_then_call, find_this_pointer_load,
    scan_call_after,
};
