use crate::error::{SweepError, SweepResult};
use crate::grid::{AxisValue, SweepPoint, LEARNING_RATE, LR_SCHEDULER_TYPE, WARMUP_RATIO};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Learning-rate schedule names understood by the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduler {
    Cosine,
    Constant,
    Linear,
    CosineWithRestarts,
    Polynomial,
    ConstantWithWarmup,
    InverseSqrt,
}

impl Scheduler {
    pub const ALL: [Self; 7] = [
        Self::Cosine,
        Self::Constant,
        Self::Linear,
        Self::CosineWithRestarts,
        Self::Polynomial,
        Self::ConstantWithWarmup,
        Self::InverseSqrt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Constant => "constant",
            Self::Linear => "linear",
            Self::CosineWithRestarts => "cosine_with_restarts",
            Self::Polynomial => "polynomial",
            Self::ConstantWithWarmup => "constant_with_warmup",
            Self::InverseSqrt => "inverse_sqrt",
        }
    }
}

impl std::fmt::Display for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheduler {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|sched| sched.as_str() == s).ok_or_else(|| {
            let known: Vec<_> = Self::ALL.iter().map(|s| s.as_str()).collect();
            SweepError::config(format!("unknown scheduler {:?} (expected one of: {})", s, known.join(", ")))
        })
    }
}

/// A numeric hyperparameter that remembers how it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    pub text: String,
    pub value: f64,
}

impl Scalar {
    fn parse(flag: &str, raw: &AxisValue) -> SweepResult<Self> {
        let text = raw.as_str();
        let value = text
            .parse::<f64>()
            .map_err(|_| SweepError::config(format!("{flag} value {text:?} is not a number")))?;
        if !value.is_finite() {
            return Err(SweepError::config(format!("{flag} value {text:?} must be finite")));
        }
        Ok(Self { text: text.to_string(), value })
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// The (learning rate, scheduler, warmup ratio) triple bound for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSet {
    learning_rate: Scalar,
    scheduler: Scheduler,
    warmup_ratio: Scalar,
}

impl HyperparameterSet {
    pub fn new(learning_rate: &str, scheduler: &str, warmup_ratio: &str) -> SweepResult<Self> {
        let learning_rate = Scalar::parse(LEARNING_RATE, &AxisValue::from(learning_rate))?;
        let scheduler = scheduler.parse::<Scheduler>()?;
        let warmup_ratio = Scalar::parse(WARMUP_RATIO, &AxisValue::from(warmup_ratio))?;

        if learning_rate.value <= 0.0 {
            return Err(SweepError::config(format!("learning_rate {} must be > 0", learning_rate)));
        }
        if !(0.0..1.0).contains(&warmup_ratio.value) {
            return Err(SweepError::config(format!("warmup_ratio {} must be in [0, 1)", warmup_ratio)));
        }

        Ok(Self { learning_rate, scheduler, warmup_ratio })
    }

    pub fn from_point(point: &SweepPoint) -> SweepResult<Self> {
        let get = |flag: &str| {
            point
                .get(flag)
                .map(AxisValue::as_str)
                .ok_or_else(|| SweepError::config(format!("sweep point has no `{flag}` axis")))
        };
        Self::new(get(LEARNING_RATE)?, get(LR_SCHEDULER_TYPE)?, get(WARMUP_RATIO)?)
    }

    pub fn learning_rate(&self) -> &Scalar {
        &self.learning_rate
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler
    }

    pub fn warmup_ratio(&self) -> &Scalar {
        &self.warmup_ratio
    }

    /// `{rate}_{scheduler}_{warmup}`
    pub fn identifier(&self) -> String {
        format!("{}_{}_{}", self.learning_rate, self.scheduler, self.warmup_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SweepGrid;

    #[test]
    fn test_identifier_keeps_written_form() {
        let hp = HyperparameterSet::new("8e-06", "cosine", "0.3").unwrap();
        assert_eq!(hp.identifier(), "8e-06_cosine_0.3");
        assert!((hp.learning_rate().value - 8e-6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_point_reads_standard_axes() {
        let grid = SweepGrid::standard(["2e-05"], ["constant"], ["0.1"]);
        let point = grid.points().next().unwrap();
        let hp = HyperparameterSet::from_point(&point).unwrap();
        assert_eq!(hp.scheduler(), Scheduler::Constant);
        assert_eq!(hp.warmup_ratio().text, "0.1");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(HyperparameterSet::new("0", "cosine", "0.3").is_err());
        assert!(HyperparameterSet::new("-1e-05", "cosine", "0.3").is_err());
        assert!(HyperparameterSet::new("inf", "cosine", "0.3").is_err());
        assert!(HyperparameterSet::new("1e-05", "cosine", "1.0").is_err());
        assert!(HyperparameterSet::new("1e-05", "cosine", "abc").is_err());
        assert!(HyperparameterSet::new("1e-05", "step", "0.3").is_err());
    }

    #[test]
    fn test_scheduler_round_trips_trainer_names() {
        for sched in Scheduler::ALL {
            assert_eq!(sched.as_str().parse::<Scheduler>().unwrap(), sched);
        }
    }
}
