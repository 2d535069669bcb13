//! `sweep check`: validate the sweep and its datasets before spending GPU time.

use super::SweepArgs;
use crate::config::Preferences;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use sweeper_training::check_datasets;

pub fn execute(args: &SweepArgs, json_output: bool, prefs: &Preferences) -> Result<()> {
    let (_, plan) = args.build_plan(prefs)?;
    let workdir = args.workdir()?;
    let reports = check_datasets(plan.template(), &workdir).context("Dataset check failed")?;

    if json_output {
        let out = json!({
            "jobs": plan.len(),
            "template_fingerprint": plan.template().fingerprint()?,
            "datasets": reports,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", "Sweep configuration is valid".bold().green());
    println!("  Jobs: {}", plan.len().to_string().cyan());
    println!();
    println!("{:<6} {:>10} {:>10} {:>7}  {}", "Role", "Sentences", "Tokens", "Labels", "Path");
    println!("{}", "─".repeat(90));
    for report in &reports {
        println!(
            "{:<6} {:>10} {:>10} {:>7}  {}",
            report.role,
            report.stats.sentences,
            report.stats.tokens,
            report.stats.labels.len(),
            report.path.display().to_string().dimmed()
        );
    }
    println!();
    Ok(())
}
