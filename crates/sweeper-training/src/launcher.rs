//! Launching one training job as a child process.

use crate::error::{SweepError, SweepResult};
use crate::job::{CommandLine, JobSpec};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exit code reported for a child that was terminated by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

#[async_trait]
pub trait Launcher: Send + Sync {
    fn id(&self) -> &'static str;

    /// Run `command` for `job` to completion and return its exit code.
    ///
    /// Returns `SweepError::JobLaunch` when the process cannot be started and
    /// `SweepError::Interrupted` when `cancel` fires while it is running.
    async fn launch(&self, job: &JobSpec, command: &CommandLine, cancel: &CancellationToken) -> SweepResult<i32>;
}

/// Spawns the trainer with inherited stdio and waits for it.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    fn id(&self) -> &'static str {
        "process"
    }

    async fn launch(&self, job: &JobSpec, command: &CommandLine, cancel: &CancellationToken) -> SweepResult<i32> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| SweepError::JobLaunch {
            job_id: job.id.clone(),
            reason: format!("failed to spawn `{}`: {}", command.program, e),
        })?;
        debug!(job = %job.id, pid = ?child.id(), "trainer process spawned");

        let status = tokio::select! {
            status = child.wait() => Some(status),
            () = cancel.cancelled() => None,
        };

        match status {
            Some(status) => Ok(status?.code().unwrap_or(SIGNALLED_EXIT_CODE)),
            None => {
                warn!(job = %job.id, "interrupt received, terminating trainer process");
                if let Err(e) = child.kill().await {
                    warn!(job = %job.id, error = %e, "failed to terminate trainer process");
                }
                Err(SweepError::Interrupted { job_id: job.id.clone() })
            }
        }
    }
}

/// Records command lines instead of running them.
#[derive(Debug, Default)]
pub struct DryRunLauncher {
    recorded: Mutex<Vec<CommandLine>>,
}

impl DryRunLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Command lines seen so far, in launch order.
    pub fn recorded(&self) -> Vec<CommandLine> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Launcher for DryRunLauncher {
    fn id(&self) -> &'static str {
        "dry-run"
    }

    async fn launch(&self, job: &JobSpec, command: &CommandLine, _cancel: &CancellationToken) -> SweepResult<i32> {
        debug!(job = %job.id, "dry run, not spawning");
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).push(command.clone());
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SweepGrid;
    use crate::template::TrainingTemplate;
    use std::time::Duration;

    fn job() -> JobSpec {
        let grid = SweepGrid::standard(["8e-06"], ["cosine"], ["0.3"]);
        JobSpec::derive(0, grid.points().next().unwrap(), &TrainingTemplate::default()).unwrap()
    }

    fn shell(script: &str) -> CommandLine {
        CommandLine { program: "sh".to_string(), args: vec!["-c".to_string(), script.to_string()] }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_launcher_reports_exit_codes() {
        let launcher = ProcessLauncher::new();
        let cancel = CancellationToken::new();
        assert_eq!(launcher.launch(&job(), &shell("exit 0"), &cancel).await.unwrap(), 0);
        assert_eq!(launcher.launch(&job(), &shell("exit 3"), &cancel).await.unwrap(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_launcher_passes_env_and_working_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let launcher = ProcessLauncher::new().with_working_dir(temp.path().to_path_buf()).with_env("SWEEP_MARK", "ok");
        let cancel = CancellationToken::new();
        let code = launcher.launch(&job(), &shell("echo \"$SWEEP_MARK\" > marker"), &cancel).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_to_string(temp.path().join("marker")).unwrap().trim(), "ok");
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let launcher = ProcessLauncher::new();
        let command = CommandLine { program: "definitely-not-a-real-trainer-binary".to_string(), args: vec![] };
        let err = launcher.launch(&job(), &command, &CancellationToken::new()).await.unwrap_err();
        match err {
            SweepError::JobLaunch { job_id, .. } => assert_eq!(job_id.as_str(), "8e-06_cosine_0.3"),
            other => panic!("expected launch error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_running_child() {
        let launcher = ProcessLauncher::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = launcher.launch(&job(), &shell("sleep 30"), &cancel).await.unwrap_err();
        assert!(matches!(err, SweepError::Interrupted { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_dry_run_records_without_spawning() {
        let launcher = DryRunLauncher::new();
        let command = CommandLine { program: "definitely-not-a-real-trainer-binary".to_string(), args: vec!["--x".to_string()] };
        let code = launcher.launch(&job(), &command, &CancellationToken::new()).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(launcher.recorded(), vec![command]);
    }
}
