pub mod hexdump;
pub mod lengths;
pub mod resolve;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use fastfwd::{CodeAddress, DumpImage};

/// Parse an address argument, with or without a `0x` prefix.
pub fn parse_hex(s: &str) -> Result<CodeAddress> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() {
        bail!("empty address");
    }
    let value =
        u64::from_str_radix(digits, 16).with_context(|| format!("invalid address {s:?}"))?;
    Ok(CodeAddress::new(value))
}

/// Load a raw dump file rebased at the given address.
pub fn load_dump(path: &Path, base: &str) -> Result<DumpImage> {
    let base = parse_hex(base)?;
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(DumpImage::new(base, bytes))
}
