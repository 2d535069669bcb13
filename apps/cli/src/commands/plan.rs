//! `sweep plan`: list the jobs a run would launch.

use super::SweepArgs;
use crate::config::Preferences;
use anyhow::Result;
use colored::Colorize;
use serde_json::json;

pub fn execute(args: &SweepArgs, json_output: bool, prefs: &Preferences) -> Result<()> {
    let (_, plan) = args.build_plan(prefs)?;

    if json_output {
        let out: Vec<_> = plan
            .jobs()
            .iter()
            .map(|job| {
                json!({
                    "index": job.index,
                    "id": job.id,
                    "output_dir": job.output_dir,
                    "model_name_or_path": job.model_source,
                    "run_name": job.run_name,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Sweep Plan ({} jobs)", plan.len()).bold().cyan());
    println!();
    println!("{:<6} {:<32} {}", "#", "ID", "Output");
    println!("{}", "─".repeat(90));
    for job in plan.jobs() {
        println!(
            "{:<6} {:<32} {}",
            job.index + 1,
            job.id.to_string().cyan(),
            job.output_dir.display().to_string().dimmed()
        );
    }
    println!();
    Ok(())
}
