//! Sluice - pipe web assets through external compilers, fingerprint, gzip
//! and serve them.

mod asset;
mod cli;
mod config;
mod core;
mod logger;
mod pipeline;
mod serve;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::SluiceConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = SluiceConfig::load(&cli)?;

    match &cli.command {
        Commands::Build { .. } => cli::build::build_all(&config, false).map(|_| ()),
        Commands::Compile { kind, file, .. } => cli::compile::compile_file(&config, *kind, file),
        Commands::Serve { .. } => cli::serve::serve_assets(&config),
        Commands::Path { kind, file, .. } => cli::path::print_path(&config, *kind, file),
    }
}
