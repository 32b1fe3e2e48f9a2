//! mtp-access - CLI entry point
//!
//! A thin wrapper around the library: argument parsing, logging setup,
//! config loading and command dispatch.

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use std::str::FromStr;

use mtp_access::cli::{self, Args};
use mtp_access::core::config::Config;
use mtp_access::facade::PortableAccess;

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration, then apply CLI overrides
    let mut config = if let Some(ref config_path) = args.config {
        match Config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: failed to load config file: {}", e);
                Config::default()
            }
        }
    } else {
        Config::load_default().unwrap_or_default()
    };

    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(chunk_size) = args.chunk_size {
        config.transfer.chunk_size = chunk_size;
    }

    let level = LevelFilter::from_str(&config.logging.level).unwrap_or(LevelFilter::Warn);
    Builder::new().filter_level(level).init();

    // WPD is a COM API; keep COM alive for the whole run
    #[cfg(windows)]
    let _com_guard = mtp_access::device::wpd::initialize_com()?;

    let access = PortableAccess::new()?;
    cli::run(args.command, &access, &config)
}
