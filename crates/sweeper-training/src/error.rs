use crate::job::JobId;
use thiserror::Error;

pub type SweepResult<T> = std::result::Result<T, SweepError>;

#[derive(Debug, Error)]
pub enum SweepError {
    /// Malformed or missing static configuration. Always raised before any job starts.
    #[error("invalid sweep configuration: {0}")]
    Configuration(String),

    /// The trainer process could not be started.
    #[error("job {job_id} failed to launch: {reason}")]
    JobLaunch { job_id: JobId, reason: String },

    /// The trainer process started but exited non-zero.
    #[error("job {job_id} exited with status {code}")]
    JobFailure { job_id: JobId, code: i32 },

    #[error("job {job_id} interrupted")]
    Interrupted { job_id: JobId },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SweepError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Identifier of the job this error belongs to, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::JobLaunch { job_id, .. } | Self::JobFailure { job_id, .. } | Self::Interrupted { job_id } => {
                Some(job_id)
            }
            _ => None,
        }
    }
}
