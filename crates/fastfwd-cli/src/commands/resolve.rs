//! Resolve command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use fastfwd::{ChainResolver, SlotTable, recover_time_globals};
use tracing::info;

/// Run the resolve command
pub fn run(
    dump: &Path,
    base: &str,
    slots: &Path,
    server_api: &str,
    tool: Option<&str>,
) -> Result<()> {
    let image = super::load_dump(dump, base)?;
    let table = SlotTable::load(slots)
        .with_context(|| format!("loading slot table {}", slots.display()))?;
    let server_api = super::parse_hex(server_api)?;
    info!("loaded {} byte dump, base {}", image.len(), image.base());

    println!("Build: {}", table.build);

    let chain = ChainResolver::new(&image, table.run_frame_slot()?, table.frame_slot()?)
        .resolve(server_api)?;
    for (name, addr) in chain.hops() {
        println!("{name:<20} {addr}");
    }

    if let Some(tool) = tool {
        let tool = super::parse_hex(tool)?;
        let globals = recover_time_globals(
            &image,
            tool,
            table.get_real_time_slot()?,
            table.host_frame_time_slot()?,
        )?;
        println!();
        println!("{:<20} {}", "realtime", globals.realtime.addr());
        println!("{:<20} {}", "host_frametime", globals.host_frametime.addr());
    }

    Ok(())
}
