//! The individual instruction-shape matchers.
//!
//! All the "scan forward, arm a flag on the trigger shape, resolve the next
//! call" matchers share one combinator, [`scan_call_after`]; they differ
//! only in the trigger predicate. Every scan is bounded by a window and
//! fails with a labelled diagnostic when the window runs out. Silence is
//! never an answer here: a missed hop means the engine build is
//! incompatible and the whole feature must stay inactive.

use crate::error::{Error, Result};
use crate::memory::{CodeAddress, CodeImage};
use crate::x86::{self, CALL_LEN, Cursor, MODRM_REG_MASK, modrm, op};

/// Window for the forward hops: generous enough for the compiler noise
/// between the anchor instruction and the call, small enough that a scan
/// can never wander into an unrelated function.
pub const HOP_WINDOW: usize = 384;

/// Window for the this-pointer hop: the load sits in the first few
/// instructions of the frame entry point.
pub const THISPTR_WINDOW: usize = 32;

/// Slack read past the window so an instruction straddling the bound still
/// decodes. No supported instruction is longer than this.
const WINDOW_SLACK: usize = 15;

/// A bounded linear scan region: start address plus maximum byte span.
/// Instructions *starting* inside the span are candidates; anything later
/// is out of bounds even if the buffer happens to hold more bytes.
#[derive(Debug, Clone, Copy)]
pub struct ScanWindow {
    pub start: CodeAddress,
    pub span: usize,
}

impl ScanWindow {
    pub fn new(start: CodeAddress, span: usize) -> Self {
        ScanWindow { start, span }
    }

    fn fetch(&self, image: &impl CodeImage) -> Result<Vec<u8>> {
        image.read_up_to(self.start, self.span + WINDOW_SLACK)
    }
}

/// Absolute target of the relative call at `buf[offset..]`, which sits at
/// absolute address `addr`: end of the instruction plus the signed
/// 32-bit displacement it encodes.
fn rel_call_target(buf: &[u8], offset: usize, addr: CodeAddress) -> Result<CodeAddress> {
    let disp = buf
        .get(offset + 1..offset + CALL_LEN)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::MemoryRead {
            addr,
            len: CALL_LEN,
        })?;
    Ok(addr.add(CALL_LEN as u64).offset(disp as i64))
}

/// The shared scan shape: step instruction by instruction, arm on the
/// trigger, resolve the first relative call seen while armed.
///
/// `what` labels the diagnostic when the window is exhausted. Decode
/// failures abort immediately; a wrong instruction length would corrupt
/// every later step.
pub fn scan_call_after<M: CodeImage>(
    image: &M,
    window: ScanWindow,
    mut trigger: impl FnMut(&[u8]) -> bool,
    mut armed: bool,
    what: &str,
) -> Result<CodeAddress> {
    let buf = window.fetch(image)?;
    let mut cursor = Cursor::new(&buf, window.start, window.span);
    while let Some(span) = cursor.next_span()? {
        let bytes = &buf[span.offset..];
        if !armed {
            if trigger(bytes) {
                armed = true;
            }
        } else if bytes[0] == op::CALL_REL32 {
            return rel_call_target(&buf, span.offset, span.addr);
        }
    }
    Err(Error::not_found(what))
}

/// Thin wrappers in this chain pass a float through to the next layer, so
/// an x87 load (any memory form) followed by a call pins down the callee.
pub fn find_float_forward_call<M: CodeImage>(
    image: &M,
    start: CodeAddress,
    what: &str,
) -> Result<CodeAddress> {
    scan_call_after(
        image,
        ScanWindow::new(start, HOP_WINDOW),
        |b| b[0] == op::FLT_BLK2 && b.get(1).is_some_and(|m| m & MODRM_REG_MASK == 0),
        false,
        what,
    )
}

/// `cmp r/m32, imm8` against a known constant, then the following call.
/// Matches the simplified switch branch the compiler emits for the state
/// dispatch.
pub fn find_compare_imm8_then_call<M: CodeImage>(
    image: &M,
    start: CodeAddress,
    imm: u8,
    what: &str,
) -> Result<CodeAddress> {
    scan_call_after(
        image,
        ScanWindow::new(start, HOP_WINDOW),
        move |b| {
            b[0] == op::ALU_RM32_IMM8
                && b.get(1).is_some_and(|m| m & MODRM_REG_MASK == modrm(0, 7, 0))
                && b.get(2) == Some(&imm)
        },
        false,
        what,
    )
}

/// `fld dword [ebp+disp8]` (a stack argument being set up for the callee)
/// followed by the call that receives it.
pub fn find_stack_float_then_call<M: CodeImage>(
    image: &M,
    start: CodeAddress,
    disp: u8,
    what: &str,
) -> Result<CodeAddress> {
    scan_call_after(
        image,
        ScanWindow::new(start, HOP_WINDOW),
        move |b| {
            b[0] == op::FLT_BLK2 && b.get(1) == Some(&modrm(1, 0, 5)) && b.get(2) == Some(&disp)
        },
        false,
        what,
    )
}

/// First relative call in the window, no trigger needed.
pub fn find_next_call<M: CodeImage>(
    image: &M,
    start: CodeAddress,
    what: &str,
) -> Result<CodeAddress> {
    scan_call_after(
        image,
        ScanWindow::new(start, HOP_WINDOW),
        |_| false,
        true,
        what,
    )
}

/// `mov ecx, [disp32]`, the this-pointer load of a known global object.
/// Returns the directly-encoded address of that global.
pub fn find_this_pointer_load<M: CodeImage>(
    image: &M,
    start: CodeAddress,
    what: &str,
) -> Result<CodeAddress> {
    let window = ScanWindow::new(start, THISPTR_WINDOW);
    let buf = window.fetch(image)?;
    let mut cursor = Cursor::new(&buf, window.start, window.span);
    while let Some(span) = cursor.next_span()? {
        let bytes = &buf[span.offset..];
        if bytes[0] == op::MOV_R32_RM32 && bytes.get(1) == Some(&modrm(0, 1, 5)) {
            let disp = bytes
                .get(2..6)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or(Error::MemoryRead {
                    addr: span.addr,
                    len: 6,
                })?;
            return Ok(CodeAddress::new(disp as u64));
        }
    }
    Err(Error::not_found(what))
}

/// Recognize a "return a float global by value" accessor stub:
/// `fld dword [disp32]` exactly at `addr`. Returns the decoded global
/// address, or `None` if the stub has any other shape. No scanning here:
/// the instruction *is* the pattern.
pub fn direct_float_load<M: CodeImage>(
    image: &M,
    addr: CodeAddress,
) -> Result<Option<CodeAddress>> {
    let bytes = image.read_bytes(addr, 6)?;
    if bytes[0] != op::FLT_BLK2 || bytes[1] != modrm(0, 0, 5) {
        return Ok(None);
    }
    let global = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    Ok(Some(CodeAddress::new(global as u64)))
}
