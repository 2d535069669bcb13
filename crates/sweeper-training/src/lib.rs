//! Sweeper Training
//!
//! Hyperparameter sweeps over an external training program:
//! - Describing the sweep as named axes (`SweepGrid`)
//! - Deriving one uniquely named job per combination (`SweepPlan`, `JobSpec`)
//! - Launching jobs one at a time as child processes (`Launcher`, `SweepDriver`)
//! - Recording outcomes on disk (`SweepLayout`, `SweepReport`)
//! - Preparing and checking the TSV datasets the trainer reads

pub mod dataset;
pub mod driver;
pub mod error;
pub mod grid;
pub mod hyperparams;
pub mod job;
pub mod launcher;
pub mod layout;
pub mod plan;
pub mod progress;
pub mod template;

pub use dataset::{check_datasets, dataset_stats, read_conll_file, split_holdout, write_conll_file, DatasetReport, DatasetStats, Sentence};
pub use driver::{FailurePolicy, JobOutcome, JobRecord, SweepDriver, SweepReport};
pub use error::{SweepError, SweepResult};
pub use grid::{AxisValue, SweepAxis, SweepGrid, SweepPoint};
pub use hyperparams::{HyperparameterSet, Scheduler};
pub use job::{CommandLine, JobId, JobSpec};
pub use launcher::{DryRunLauncher, Launcher, ProcessLauncher};
pub use layout::SweepLayout;
pub use plan::{SweepConfig, SweepPlan, SweepSection};
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, StdoutProgressSink};
pub use template::{LauncherSpec, TrainingTemplate};

pub use tokio_util::sync::CancellationToken;
