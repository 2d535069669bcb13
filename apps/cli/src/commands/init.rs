//! `sweep init`: write a starter sweep file.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use sweeper_training::SweepConfig;

pub const DEFAULT_SWEEP_FILE: &str = "sweep.toml";

pub fn execute(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_SWEEP_FILE));
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let contents = SweepConfig::default().to_toml()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;

    println!();
    println!("{}", "Sweep file created".bold().green());
    println!("  Path: {}", path.display().to_string().cyan());
    println!("  {}", format!("Next: sweep run --config {} --dry-run", path.display()).dimmed());
    println!();
    Ok(())
}
