//! Hexdump command implementation.
//!
//! Output format:
//!
//! ```text
//! 0x401000: 55 8B EC 83 EC 08 D9 45  08 E8 12 34 56 78 C3 90  |U......E...4Vx..|
//! ```

use std::path::Path;

use anyhow::Result;
use fastfwd::CodeImage;

/// Run the hexdump command
pub fn run(dump: &Path, base: &str, at: &str, size: usize, ascii: bool) -> Result<()> {
    let image = super::load_dump(dump, base)?;
    let at = super::parse_hex(at)?;
    let bytes = image.read_up_to(at, size)?;

    for (i, chunk) in bytes.chunks(16).enumerate() {
        print!("{}: ", at.add(i as u64 * 16));

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                print!(" ");
            }
            print!("{byte:02X} ");
        }
        for j in chunk.len()..16 {
            if j == 8 {
                print!(" ");
            }
            print!("   ");
        }

        if ascii {
            print!(" |");
            for byte in chunk {
                if (0x20..0x7F).contains(byte) {
                    print!("{}", *byte as char);
                } else {
                    print!(".");
                }
            }
            println!("|");
        } else {
            println!();
        }
    }

    Ok(())
}
