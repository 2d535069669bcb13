//! Command implementations for the Sweeper CLI.

pub mod check;
pub mod init;
pub mod plan;
pub mod run;
pub mod split;

use crate::config::Preferences;
use anyhow::{Context, Result};
use std::path::PathBuf;
use sweeper_training::grid::{LEARNING_RATE, LR_SCHEDULER_TYPE, WARMUP_RATIO};
use sweeper_training::{SweepAxis, SweepConfig, SweepGrid, SweepPlan};

/// Inputs shared by every command that builds a sweep plan.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SweepArgs {
    /// Sweep file (TOML); defaults to the pinned configuration
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Learning rate to sweep (repeatable or comma separated)
    #[arg(long = "lr", value_name = "RATE", value_delimiter = ',')]
    pub lr: Vec<String>,

    /// Learning rate scheduler to sweep (repeatable or comma separated)
    #[arg(long, value_name = "NAME", value_delimiter = ',')]
    pub scheduler: Vec<String>,

    /// Warmup ratio to sweep (repeatable or comma separated)
    #[arg(long, value_name = "RATIO", value_delimiter = ',')]
    pub warmup: Vec<String>,

    /// Extra trainer flag to sweep, e.g. `--axis num_train_epochs=10,20`
    #[arg(long, value_name = "FLAG=V1,V2", value_parser = parse_axis)]
    pub axis: Vec<SweepAxis>,

    /// Directory the trainer runs in; job output paths are relative to it
    #[arg(short, long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,
}

impl SweepArgs {
    /// Load the sweep file from `--config`, the preferences, or the built-in default.
    pub fn load_config(&self, prefs: &Preferences) -> Result<SweepConfig> {
        match self.config.as_ref().or(prefs.config.as_ref()) {
            Some(path) => Ok(SweepConfig::load(path)?),
            None => Ok(SweepConfig::default()),
        }
    }

    /// The sweep file's grid with command-line axes replacing the matching lists.
    pub fn grid(&self, config: &SweepConfig) -> SweepGrid {
        let mut grid = config.grid();
        for (flag, values) in [(LEARNING_RATE, &self.lr), (LR_SCHEDULER_TYPE, &self.scheduler), (WARMUP_RATIO, &self.warmup)]
        {
            if !values.is_empty() {
                grid.set_axis(SweepAxis::new(flag, values.iter().cloned()));
            }
        }
        for axis in &self.axis {
            grid.set_axis(axis.clone());
        }
        grid
    }

    pub fn build_plan(&self, prefs: &Preferences) -> Result<(SweepConfig, SweepPlan)> {
        let config = self.load_config(prefs)?;
        let plan = SweepPlan::build(&self.grid(&config), config.trainer.clone())?;
        Ok((config, plan))
    }

    pub fn workdir(&self) -> Result<PathBuf> {
        match &self.workdir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to determine the current directory"),
        }
    }
}

fn parse_axis(raw: &str) -> std::result::Result<SweepAxis, String> {
    let (flag, values) = raw.split_once('=').ok_or_else(|| format!("expected FLAG=V1,V2, got {raw:?}"))?;
    let flag = flag.trim().trim_start_matches("--");
    if flag.is_empty() {
        return Err(format!("missing flag name in {raw:?}"));
    }
    Ok(SweepAxis::new(flag, values.split(',').map(str::trim)))
}
