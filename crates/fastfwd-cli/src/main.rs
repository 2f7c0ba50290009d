use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "fastfwd")]
#[command(about = "Offline anchor-chain resolver for engine image dumps")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the full call chain down to Host_AccumulateTime
    Resolve {
        /// Raw image dump file
        dump: PathBuf,

        /// Load address the dump was taken at (hex)
        #[arg(long)]
        base: String,

        /// Slot table JSON for this engine build
        #[arg(long)]
        slots: PathBuf,

        /// Address of the dedicated-server API interface object (hex)
        #[arg(long)]
        server_api: String,

        /// Address of the engine tool interface object (hex); with it the
        /// time globals are recovered too
        #[arg(long)]
        tool: Option<String>,
    },

    /// Classify instruction lengths starting at an address
    Lengths {
        dump: PathBuf,

        #[arg(long)]
        base: String,

        /// Start address (hex)
        #[arg(long)]
        at: String,

        /// Number of instructions to classify
        #[arg(long, default_value_t = 16)]
        count: usize,
    },

    /// Dump raw image bytes in hexdump format
    Hexdump {
        dump: PathBuf,

        #[arg(long)]
        base: String,

        /// Start address (hex)
        #[arg(long)]
        at: String,

        /// Number of bytes to show
        #[arg(long, default_value_t = 256)]
        size: usize,

        /// Include an ASCII column
        #[arg(long)]
        ascii: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fastfwd=info".parse()?))
        .init();

    match Args::parse().command {
        Command::Resolve {
            dump,
            base,
            slots,
            server_api,
            tool,
        } => commands::resolve::run(&dump, &base, &slots, &server_api, tool.as_deref()),
        Command::Lengths {
            dump,
            base,
            at,
            count,
        } => commands::lengths::run(&dump, &base, &at, count),
        Command::Hexdump {
            dump,
            base,
            at,
            size,
            ascii,
        } => commands::hexdump::run(&dump, &base, &at, size, ascii),
    }
}
