//! Sweep files and validated sweep plans.

use crate::driver::FailurePolicy;
use crate::error::{SweepError, SweepResult};
use crate::grid::{AxisValue, SweepAxis, SweepGrid};
use crate::job::{CommandLine, JobSpec};
use crate::template::TrainingTemplate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// `[sweep]` table of a sweep file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSection {
    pub learning_rate: Vec<AxisValue>,
    pub lr_scheduler_type: Vec<AxisValue>,
    pub warmup_ratio: Vec<AxisValue>,
    /// Additional dimensions, appended after the standard three.
    pub axes: Vec<SweepAxis>,
    pub failure_policy: Option<FailurePolicy>,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            learning_rate: vec![AxisValue::from("8e-06")],
            lr_scheduler_type: vec![AxisValue::from("cosine")],
            warmup_ratio: vec![AxisValue::from("0.3")],
            axes: Vec::new(),
            failure_policy: None,
        }
    }
}

/// A whole sweep file: `[sweep]` plus `[trainer]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    pub sweep: SweepSection,
    pub trainer: TrainingTemplate,
}

impl SweepConfig {
    pub fn load(path: &Path) -> SweepResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SweepError::config(format!("failed to read sweep file {}: {}", path.display(), e)))?;
        Self::parse(&contents).map_err(|e| match e {
            SweepError::Toml(inner) => SweepError::config(format!("failed to parse sweep file {}: {}", path.display(), inner)),
            other => other,
        })
    }

    pub fn parse(contents: &str) -> SweepResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml(&self) -> SweepResult<String> {
        toml::to_string_pretty(self).map_err(|e| SweepError::Other(e.into()))
    }

    pub fn grid(&self) -> SweepGrid {
        let mut grid = SweepGrid::standard(
            self.sweep.learning_rate.clone(),
            self.sweep.lr_scheduler_type.clone(),
            self.sweep.warmup_ratio.clone(),
        );
        for axis in &self.sweep.axes {
            grid = grid.with_axis(axis.clone());
        }
        grid
    }
}

/// Validated, fully derived list of jobs in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct SweepPlan {
    template: TrainingTemplate,
    jobs: Vec<JobSpec>,
}

impl SweepPlan {
    /// Validate inputs and derive every job. Fails before anything is launched.
    pub fn build(grid: &SweepGrid, template: TrainingTemplate) -> SweepResult<Self> {
        grid.validate()?;
        template.validate()?;

        let jobs = grid
            .points()
            .enumerate()
            .map(|(index, point)| JobSpec::derive(index, point, &template))
            .collect::<SweepResult<Vec<_>>>()?;

        let mut ids = HashSet::new();
        let mut dirs = HashSet::new();
        for job in &jobs {
            if !ids.insert(job.id.clone()) {
                return Err(SweepError::config(format!("two sweep points share identifier {}", job.id)));
            }
            if !dirs.insert(job.output_dir.clone()) {
                return Err(SweepError::config(format!(
                    "two sweep points share output directory {}",
                    job.output_dir.display()
                )));
            }
        }

        Ok(Self { template, jobs })
    }

    pub fn from_config(config: &SweepConfig) -> SweepResult<Self> {
        Self::build(&config.grid(), config.trainer.clone())
    }

    pub fn template(&self) -> &TrainingTemplate {
        &self.template
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Command lines a real run would execute, in order.
    pub fn command_lines(&self) -> Vec<CommandLine> {
        self.jobs.iter().map(|job| job.command_line(&self.template)).collect()
    }
}
