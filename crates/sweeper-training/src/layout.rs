use crate::driver::{JobRecord, SweepReport};
use crate::error::SweepResult;
use crate::job::JobSpec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

pub const JOB_RECORD_FILE: &str = "sweep_job.json";

/// Filesystem layout for a sweep.
///
/// Job output directories are resolved against `root`; run reports live
/// under `<root>/.sweeper/runs/<sweep_id>.json`.
#[derive(Debug, Clone)]
pub struct SweepLayout {
    root: PathBuf,
}

impl SweepLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn job_dir(&self, job: &JobSpec) -> PathBuf {
        self.root.join(&job.output_dir)
    }

    #[must_use]
    pub fn job_record_path(&self, job: &JobSpec) -> PathBuf {
        self.job_dir(job).join(JOB_RECORD_FILE)
    }

    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(".sweeper").join("runs")
    }

    #[must_use]
    pub fn report_path(&self, sweep_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{sweep_id}.json"))
    }

    #[must_use]
    pub fn latest_report_path(&self) -> PathBuf {
        self.runs_dir().join("latest.json")
    }

    /// Create the job's output directory. Existing contents are left in place.
    pub fn prepare_job_dir(&self, job: &JobSpec) -> SweepResult<PathBuf> {
        let dir = self.job_dir(job);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn write_job_record(&self, job: &JobSpec, record: &JobRecord) -> SweepResult<()> {
        write_json_atomic(&self.job_record_path(job), record)
    }

    pub fn write_report(&self, report: &SweepReport) -> SweepResult<PathBuf> {
        let path = self.report_path(&report.sweep_id);
        write_json_atomic(&path, report)?;
        write_json_atomic(&self.latest_report_path(), report)?;
        Ok(path)
    }

    /// The most recent report, if any sweep has run here.
    pub fn latest_report(&self) -> SweepResult<Option<SweepReport>> {
        read_json_opt(&self.latest_report_path())
    }

    /// All stored reports, oldest first.
    pub fn list_reports(&self) -> SweepResult<Vec<SweepReport>> {
        let dir = match std::fs::read_dir(self.runs_dir()) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reports = Vec::new();
        for entry in dir {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") || path == self.latest_report_path() {
                continue;
            }
            if let Some(report) = read_json_opt::<SweepReport>(&path)? {
                reports.push(report);
            }
        }
        reports.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.sweep_id.cmp(&b.sweep_id)));
        Ok(reports)
    }
}

/// Write via a sibling temp file and rename, so readers never see a partial file.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> SweepResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json_opt<T: DeserializeOwned>(path: &Path) -> SweepResult<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
