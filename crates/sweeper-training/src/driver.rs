//! The sweep driver: one job at a time, in plan order.

use crate::error::{SweepError, SweepResult};
use crate::job::{CommandLine, JobId, JobSpec};
use crate::launcher::{Launcher, SIGNALLED_EXIT_CODE};
use crate::layout::SweepLayout;
use crate::plan::SweepPlan;
use crate::progress::{NullProgressSink, ProgressEvent, ProgressSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Exit code used when a sweep is stopped by an interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// How long a job that died from SIGINT waits for the interrupt handler to catch up.
const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

/// What to do with the remaining jobs after one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep going; every combination gets its run.
    #[default]
    Continue,
    /// Stop at the first failure and skip the rest.
    FailFast,
}

impl std::str::FromStr for FailurePolicy {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(Self::Continue),
            "fail_fast" | "fail-fast" => Ok(Self::FailFast),
            other => Err(SweepError::config(format!("unknown failure policy {other:?} (expected continue or fail_fast)"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed { code: i32 },
    LaunchFailed { reason: String },
    Interrupted,
    Skipped,
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::LaunchFailed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub index: usize,
    pub job_id: JobId,
    pub output_dir: PathBuf,
    pub command: CommandLine,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: JobOutcome,
}

impl JobRecord {
    fn new(job: &JobSpec, command: CommandLine, outcome: JobOutcome) -> Self {
        Self {
            index: job.index,
            job_id: job.id.clone(),
            output_dir: job.output_dir.clone(),
            command,
            started_at: None,
            finished_at: None,
            outcome,
        }
    }

    /// The failure as an error value tagged with this job's identifier.
    pub fn error(&self) -> Option<SweepError> {
        let job_id = self.job_id.clone();
        match &self.outcome {
            JobOutcome::Failed { code } => Some(SweepError::JobFailure { job_id, code: *code }),
            JobOutcome::LaunchFailed { reason } => Some(SweepError::JobLaunch { job_id, reason: reason.clone() }),
            JobOutcome::Interrupted => Some(SweepError::Interrupted { job_id }),
            JobOutcome::Succeeded | JobOutcome::Skipped => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub sweep_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub policy: FailurePolicy,
    pub launcher: String,
    pub template_fingerprint: String,
    /// Set when an interrupt stopped the sweep, even if no job was running at the time.
    #[serde(default)]
    pub interrupted: bool,
    pub records: Vec<JobRecord>,
}

impl SweepReport {
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.outcome == JobOutcome::Succeeded).count()
    }

    pub fn skipped(&self) -> usize {
        self.records.iter().filter(|r| r.outcome == JobOutcome::Skipped).count()
    }

    pub fn failures(&self) -> Vec<&JobRecord> {
        self.records.iter().filter(|r| r.outcome.is_failure()).collect()
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted || self.records.iter().any(|r| r.outcome == JobOutcome::Interrupted)
    }

    /// Every failure, launch error and interrupt, each tagged with its job.
    pub fn errors(&self) -> Vec<SweepError> {
        self.records.iter().filter_map(JobRecord::error).collect()
    }

    pub fn is_success(&self) -> bool {
        !self.interrupted && self.records.iter().all(|r| r.outcome == JobOutcome::Succeeded)
    }

    /// 0 when every job succeeded, 130 after an interrupt, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else if self.was_interrupted() {
            INTERRUPTED_EXIT_CODE
        } else {
            1
        }
    }
}

pub struct SweepDriver {
    launcher: Arc<dyn Launcher>,
    policy: FailurePolicy,
    progress: Arc<dyn ProgressSink>,
    layout: Option<SweepLayout>,
}

impl SweepDriver {
    pub fn new(launcher: Arc<dyn Launcher>, policy: FailurePolicy) -> Self {
        Self { launcher, policy, progress: Arc::new(NullProgressSink), layout: None }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Create job directories and persist records/reports under this layout.
    #[must_use]
    pub fn with_layout(mut self, layout: SweepLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub async fn run(&self, plan: &SweepPlan, cancel: &CancellationToken) -> SweepResult<SweepReport> {
        let total = plan.len();
        let sweep_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(sweep = %sweep_id, jobs = total, policy = ?self.policy, launcher = self.launcher.id(), "starting sweep");
        self.progress.on_event(ProgressEvent::Planned { total });

        let mut records = Vec::with_capacity(total);
        let mut halted = false;
        let mut interrupted = false;

        for job in plan.jobs() {
            let command = job.command_line(plan.template());

            if !halted && cancel.is_cancelled() {
                warn!(job = %job.id, "sweep interrupted before job start");
                halted = true;
                interrupted = true;
            }
            if halted {
                self.progress.on_event(ProgressEvent::Skipped { job_id: job.id.clone() });
                records.push(JobRecord::new(job, command, JobOutcome::Skipped));
                continue;
            }

            let record = self.run_job(job, command, total, cancel).await;

            if let Some(layout) = &self.layout {
                if let Err(e) = layout.write_job_record(job, &record) {
                    warn!(job = %job.id, error = %e, "failed to write job record");
                }
            }

            match &record.outcome {
                JobOutcome::Interrupted => {
                    halted = true;
                    interrupted = true;
                }
                outcome if outcome.is_failure() && self.policy == FailurePolicy::FailFast => {
                    warn!(job = %job.id, remaining = total - job.index - 1, "fail-fast: skipping remaining jobs");
                    halted = true;
                }
                _ => {}
            }
            records.push(record);
        }

        let report = SweepReport {
            sweep_id,
            started_at,
            finished_at: Utc::now(),
            policy: self.policy,
            launcher: self.launcher.id().to_string(),
            template_fingerprint: plan.template().fingerprint()?,
            interrupted,
            records,
        };

        if let Some(layout) = &self.layout {
            match layout.write_report(&report) {
                Ok(path) => debug!(path = %path.display(), "sweep report written"),
                Err(e) => warn!(sweep = %report.sweep_id, error = %e, "failed to write sweep report"),
            }
        }
        info!(
            sweep = %report.sweep_id,
            succeeded = report.succeeded(),
            failed = report.failures().len(),
            skipped = report.skipped(),
            "sweep finished"
        );
        Ok(report)
    }

    async fn run_job(&self, job: &JobSpec, command: CommandLine, total: usize, cancel: &CancellationToken) -> JobRecord {
        let mut record = JobRecord::new(job, command, JobOutcome::Skipped);

        if let Some(layout) = &self.layout {
            if let Err(e) = layout.prepare_job_dir(job) {
                error!(job = %job.id, error = %e, "failed to prepare output directory");
                record.outcome = JobOutcome::LaunchFailed { reason: format!("output directory: {e}") };
                self.progress.on_event(ProgressEvent::LaunchFailed { job_id: job.id.clone(), reason: e.to_string() });
                return record;
            }
        }

        info!(job = %job.id, index = job.index + 1, total, output_dir = %job.output_dir.display(), "launching training job");
        debug!(job = %job.id, command = %record.command, "trainer command line");
        self.progress.on_event(ProgressEvent::Started { job_id: job.id.clone(), index: job.index, total });

        record.started_at = Some(Utc::now());
        let mut result = self.launcher.launch(job, &record.command, cancel).await;
        record.finished_at = Some(Utc::now());

        // The terminal delivers SIGINT to the trainer too, so it often exits
        // before the interrupt handler has cancelled the token.
        if let Ok(code) = &result {
            if *code != 0 && Self::interrupted_while_running(*code, cancel).await {
                result = Err(SweepError::Interrupted { job_id: job.id.clone() });
            }
        }

        record.outcome = match result {
            Ok(0) => {
                info!(job = %job.id, "training job succeeded");
                self.progress.on_event(ProgressEvent::Finished { job_id: job.id.clone(), code: 0 });
                JobOutcome::Succeeded
            }
            Ok(code) => {
                error!(job = %job.id, code, "training job failed");
                self.progress.on_event(ProgressEvent::Finished { job_id: job.id.clone(), code });
                JobOutcome::Failed { code }
            }
            Err(SweepError::Interrupted { .. }) => {
                warn!(job = %job.id, "training job interrupted");
                self.progress.on_event(ProgressEvent::Interrupted { job_id: job.id.clone() });
                JobOutcome::Interrupted
            }
            Err(e) => {
                error!(job = %job.id, error = %e, "training job could not be launched");
                self.progress.on_event(ProgressEvent::LaunchFailed { job_id: job.id.clone(), reason: e.to_string() });
                JobOutcome::LaunchFailed { reason: e.to_string() }
            }
        };
        record
    }

    async fn interrupted_while_running(code: i32, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return true;
        }
        if code != INTERRUPTED_EXIT_CODE && code != SIGNALLED_EXIT_CODE {
            return false;
        }
        tokio::time::timeout(INTERRUPT_GRACE, cancel.cancelled()).await.is_ok()
    }
}
