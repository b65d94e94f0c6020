//! Single-file compilation (`sluice compile`).

use std::path::Path;

use anyhow::{Context, Result};

use crate::asset::AssetKind;
use crate::config::SluiceConfig;
use crate::utils::path::resolve_in;

/// Run `file` through the pipeline of `kind` and print the path to serve.
pub fn compile_file(config: &SluiceConfig, kind: AssetKind, file: &Path) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current working directory")?;
    let source = resolve_in(&cwd, file);

    let output = config
        .pipeline()
        .transform(kind, &source)
        .with_context(|| format!("Failed to compile {}", source.display()))?;

    println!("{}", output.display());
    Ok(())
}
