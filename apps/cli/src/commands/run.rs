//! `sweep run`: launch every job of the plan, or print what would run.

use super::SweepArgs;
use crate::config::Preferences;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::sync::Arc;
use sweeper_training::{
    check_datasets, CancellationToken, DryRunLauncher, FailurePolicy, JobOutcome, NullProgressSink, ProcessLauncher, ProgressSink,
    StdoutProgressSink, SweepDriver, SweepLayout, SweepPlan, SweepReport,
};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub fail_fast: bool,
    pub keep_going: bool,
    pub json: bool,
}

impl RunOptions {
    /// Flags win over the sweep file, which wins over the preferences.
    fn policy(&self, from_file: Option<FailurePolicy>, prefs: &Preferences) -> FailurePolicy {
        if self.fail_fast {
            FailurePolicy::FailFast
        } else if self.keep_going {
            FailurePolicy::Continue
        } else {
            from_file.or(prefs.failure_policy).unwrap_or_default()
        }
    }
}

/// Returns the process exit code.
pub async fn execute(args: SweepArgs, options: RunOptions, prefs: &Preferences) -> Result<i32> {
    let (config, plan) = args.build_plan(prefs)?;
    let policy = options.policy(config.sweep.failure_policy, prefs);

    if options.dry_run {
        return dry_run(&plan, policy, options.json).await;
    }

    let workdir = args.workdir()?;
    let datasets = check_datasets(plan.template(), &workdir).context("Dataset check failed")?;
    debug!(files = datasets.len(), "dataset preflight passed");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Interrupt received, stopping the current job...", "⚠".yellow());
            trigger.cancel();
        }
    });

    let progress: Arc<dyn ProgressSink> =
        if options.json { Arc::new(NullProgressSink) } else { Arc::new(StdoutProgressSink) };
    let layout = SweepLayout::new(workdir.clone());
    let driver = SweepDriver::new(Arc::new(ProcessLauncher::new().with_working_dir(workdir)), policy)
        .with_progress(progress)
        .with_layout(layout.clone());

    info!(jobs = plan.len(), "running sweep");
    let report = driver.run(&plan, &cancel).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, &layout);
    }
    Ok(report.exit_code())
}

async fn dry_run(plan: &SweepPlan, policy: FailurePolicy, json_output: bool) -> Result<i32> {
    let launcher = Arc::new(DryRunLauncher::new());
    let report = SweepDriver::new(launcher.clone(), policy).run(plan, &CancellationToken::new()).await?;
    let commands = launcher.recorded();

    if json_output {
        let out: Vec<_> = plan
            .jobs()
            .iter()
            .zip(&commands)
            .map(|(job, command)| {
                json!({
                    "index": job.index,
                    "id": job.id,
                    "output_dir": job.output_dir,
                    "program": command.program,
                    "args": command.args,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(report.exit_code());
    }

    let total = plan.len();
    for (job, command) in plan.jobs().iter().zip(&commands) {
        println!("{}", format!("# [{}/{}] {}", job.index + 1, total, job.id).dimmed());
        println!("{}", command.display());
    }
    Ok(report.exit_code())
}

fn print_summary(report: &SweepReport, layout: &SweepLayout) {
    let failures = report.failures();

    println!();
    if report.is_success() {
        println!("{}", format!("Sweep complete: {} job(s) succeeded", report.succeeded()).bold().green());
    } else if report.was_interrupted() {
        println!("{}", "Sweep interrupted".bold().yellow());
    } else {
        println!("{}", "Sweep finished with failures".bold().red());
    }
    println!(
        "  Succeeded: {}  Failed: {}  Skipped: {}",
        report.succeeded().to_string().green(),
        failures.len().to_string().red(),
        report.skipped().to_string().dimmed()
    );

    for record in failures {
        let detail = match &record.outcome {
            JobOutcome::Failed { code } => format!("exit status {code}"),
            JobOutcome::LaunchFailed { reason } => reason.clone(),
            _ => String::new(),
        };
        println!("  {} {} ({})", "✗".red(), record.job_id.to_string().cyan(), detail);
    }
    println!("  Elapsed: {}", format_elapsed(report.finished_at - report.started_at));
    println!("  Report: {}", layout.report_path(&report.sweep_id).display().to_string().dimmed());
    println!();
}

fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, s) => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(3 * 3600 + 61)), "3h 1m 1s");
    }

    #[test]
    fn test_policy_precedence() {
        let prefs = Preferences { failure_policy: Some(FailurePolicy::FailFast), ..Default::default() };

        assert_eq!(RunOptions::default().policy(None, &Preferences::default()), FailurePolicy::Continue);
        assert_eq!(RunOptions::default().policy(None, &prefs), FailurePolicy::FailFast);
        assert_eq!(RunOptions::default().policy(Some(FailurePolicy::Continue), &prefs), FailurePolicy::Continue);

        let keep_going = RunOptions { keep_going: true, ..Default::default() };
        assert_eq!(keep_going.policy(Some(FailurePolicy::FailFast), &prefs), FailurePolicy::Continue);

        let fail_fast = RunOptions { fail_fast: true, ..Default::default() };
        assert_eq!(fail_fast.policy(None, &Preferences::default()), FailurePolicy::FailFast);
    }
}
