//! Lengths command implementation.
//!
//! Steps the instruction-length classifier over a region of the dump and
//! prints one line per instruction, which is the quickest way to check
//! whether a given engine build stays inside the supported opcode set.

use std::path::Path;

use anyhow::Result;
use fastfwd::CodeImage;
use fastfwd::x86::Cursor;

/// Generous upper bound on bytes needed for `count` instructions.
const MAX_INSN_LEN: usize = 15;

/// Run the lengths command
pub fn run(dump: &Path, base: &str, at: &str, count: usize) -> Result<()> {
    let image = super::load_dump(dump, base)?;
    let at = super::parse_hex(at)?;

    let buf = image.read_up_to(at, count * MAX_INSN_LEN)?;
    let mut cursor = Cursor::new(&buf, at, buf.len());
    for _ in 0..count {
        let Some(span) = cursor.next_span()? else {
            break;
        };
        // the classifier sizes immediates from the opcode table, so the
        // last instruction can claim bytes past the end of the dump
        let end = (span.offset + span.len).min(buf.len());
        let bytes: Vec<String> = buf[span.offset..end]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        println!("{}  len {:2}  {}", span.addr, span.len, bytes.join(" "));
    }

    Ok(())
}
