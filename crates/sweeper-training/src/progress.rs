use crate::job::JobId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Planned { total: usize },
    Started { job_id: JobId, index: usize, total: usize },
    Finished { job_id: JobId, code: i32 },
    LaunchFailed { job_id: JobId, reason: String },
    Skipped { job_id: JobId },
    Interrupted { job_id: JobId },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Planned { total } => println!("[sweep] {total} job(s) planned"),
            ProgressEvent::Started { job_id, index, total } => {
                println!("[sweep:{job_id}] started ({}/{total})", index + 1);
            }
            ProgressEvent::Finished { job_id, code: 0 } => println!("[sweep:{job_id}] finished"),
            ProgressEvent::Finished { job_id, code } => println!("[sweep:{job_id}] failed with status {code}"),
            ProgressEvent::LaunchFailed { job_id, reason } => println!("[sweep:{job_id}] could not launch: {reason}"),
            ProgressEvent::Skipped { job_id } => println!("[sweep:{job_id}] skipped"),
            ProgressEvent::Interrupted { job_id } => println!("[sweep:{job_id}] interrupted"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}
