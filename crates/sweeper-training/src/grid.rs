//! Named sweep axes and their Cartesian product.
//!
//! A grid is an ordered list of axes. Enumeration is odometer order: the
//! first axis is the outermost loop and the last axis varies fastest.

use crate::error::{SweepError, SweepResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

pub const LEARNING_RATE: &str = "learning_rate";
pub const LR_SCHEDULER_TYPE: &str = "lr_scheduler_type";
pub const WARMUP_RATIO: &str = "warmup_ratio";

/// Flags the sweep derives per job or passes to the launcher; never swept.
pub const RESERVED_FLAGS: [&str; 8] = [
    "output_dir",
    "model_name_or_path",
    "project_name",
    "mixed_precision",
    "use_lora",
    "constrained_generation",
    "add_labels_as_tokens",
    "force_auto_device_map",
];

/// Whether `flag` is one of the three axes every sweep carries.
pub fn is_standard_axis(flag: &str) -> bool {
    matches!(flag, LEARNING_RATE | LR_SCHEDULER_TYPE | WARMUP_RATIO)
}

/// One candidate value, kept exactly as written (`8e-06` is never re-rendered).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AxisValue(String);

impl AxisValue {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AxisValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for AxisValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AxisValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// Sweep files may write `warmup_ratio = [0.3]` without quotes. Small
// rates such as `8e-06` lose their spelling once parsed as a float, so
// those must be quoted.
impl<'de> Deserialize<'de> for AxisValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
            Float(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Ok(Self(s)),
            Raw::Int(i) => Ok(Self(i.to_string())),
            Raw::Float(f) if f.is_finite() && (f == 0.0 || (1e-4..1e15).contains(&f.abs())) => Ok(Self(format!("{f:?}"))),
            Raw::Float(f) => Err(serde::de::Error::custom(format!(
                "unquoted number {f:?} would not keep its spelling; write it as a string, e.g. \"8e-06\""
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepAxis {
    /// Trainer flag that receives the value (`--{flag} {value}`).
    pub flag: String,
    pub values: Vec<AxisValue>,
}

impl SweepAxis {
    pub fn new<I, V>(flag: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AxisValue>,
    {
        Self { flag: flag.into(), values: values.into_iter().map(Into::into).collect() }
    }

    fn validate(&self) -> SweepResult<()> {
        if self.flag.trim().is_empty() || self.flag.contains(char::is_whitespace) {
            return Err(SweepError::config(format!("invalid axis flag name: {:?}", self.flag)));
        }
        if RESERVED_FLAGS.contains(&self.flag.as_str()) {
            return Err(SweepError::config(format!("`{}` is set by the sweep itself and cannot be an axis", self.flag)));
        }
        if self.values.is_empty() {
            return Err(SweepError::config(format!("axis `{}` has no values", self.flag)));
        }

        let allow_underscore = self.flag == LR_SCHEDULER_TYPE;
        let mut seen = HashSet::new();
        for value in &self.values {
            let text = value.as_str();
            if text.is_empty() {
                return Err(SweepError::config(format!("axis `{}` contains an empty value", self.flag)));
            }
            if text.contains(char::is_whitespace) || text.contains('/') || (!allow_underscore && text.contains('_')) {
                return Err(SweepError::config(format!(
                    "axis `{}` value {:?} may not contain whitespace, '/' or '_'",
                    self.flag, text
                )));
            }
            if !seen.insert(text) {
                return Err(SweepError::config(format!("axis `{}` lists {:?} more than once", self.flag, text)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub flag: String,
    pub value: AxisValue,
}

/// One element of the product: a value for every axis, in axis order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub bindings: Vec<Binding>,
}

impl SweepPoint {
    pub fn get(&self, flag: &str) -> Option<&AxisValue> {
        self.bindings.iter().find(|b| b.flag == flag).map(|b| &b.value)
    }

    pub fn values(&self) -> impl Iterator<Item = &AxisValue> {
        self.bindings.iter().map(|b| &b.value)
    }

    /// Axis values joined with `-`, used in directory names.
    pub fn slug(&self) -> String {
        self.values().map(AxisValue::as_str).collect::<Vec<_>>().join("-")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub axes: Vec<SweepAxis>,
}

impl SweepGrid {
    #[must_use]
    pub fn new(axes: Vec<SweepAxis>) -> Self {
        Self { axes }
    }

    /// Learning rate (outer) x scheduler (middle) x warmup ratio (inner).
    pub fn standard<R, S, W>(rates: R, schedulers: S, warmups: W) -> Self
    where
        R: IntoIterator,
        R::Item: Into<AxisValue>,
        S: IntoIterator,
        S::Item: Into<AxisValue>,
        W: IntoIterator,
        W::Item: Into<AxisValue>,
    {
        Self::new(vec![
            SweepAxis::new(LEARNING_RATE, rates),
            SweepAxis::new(LR_SCHEDULER_TYPE, schedulers),
            SweepAxis::new(WARMUP_RATIO, warmups),
        ])
    }

    #[must_use]
    pub fn with_axis(mut self, axis: SweepAxis) -> Self {
        self.axes.push(axis);
        self
    }

    pub fn axis(&self, flag: &str) -> Option<&SweepAxis> {
        self.axes.iter().find(|a| a.flag == flag)
    }

    /// Replace the values of an existing axis, or append a new axis.
    pub fn set_axis(&mut self, axis: SweepAxis) {
        match self.axes.iter_mut().find(|a| a.flag == axis.flag) {
            Some(existing) => existing.values = axis.values,
            None => self.axes.push(axis),
        }
    }

    /// Number of points in the product (0 when any axis is empty).
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|a| a.values.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> SweepResult<()> {
        if self.axes.is_empty() {
            return Err(SweepError::config("sweep grid has no axes"));
        }
        let mut flags = HashSet::new();
        for axis in &self.axes {
            axis.validate()?;
            if !flags.insert(axis.flag.as_str()) {
                return Err(SweepError::config(format!("axis `{}` is declared twice", axis.flag)));
            }
        }
        Ok(())
    }

    pub fn points(&self) -> Points<'_> {
        Points { grid: self, cursor: if self.is_empty() { None } else { Some(vec![0; self.axes.len()]) } }
    }
}

/// Odometer iterator over a [`SweepGrid`].
#[derive(Debug)]
pub struct Points<'a> {
    grid: &'a SweepGrid,
    cursor: Option<Vec<usize>>,
}

impl Iterator for Points<'_> {
    type Item = SweepPoint;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;

        let point = SweepPoint {
            bindings: self
                .grid
                .axes
                .iter()
                .zip(cursor.iter())
                .map(|(axis, &i)| Binding { flag: axis.flag.clone(), value: axis.values[i].clone() })
                .collect(),
        };

        // Advance, innermost axis first.
        let mut carried = true;
        for (slot, axis) in cursor.iter_mut().zip(self.grid.axes.iter()).rev() {
            *slot += 1;
            if *slot < axis.values.len() {
                carried = false;
                break;
            }
            *slot = 0;
        }
        if carried {
            self.cursor = None;
        }

        Some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(grid: &SweepGrid) -> Vec<String> {
        grid.points().map(|p| p.values().map(AxisValue::as_str).collect::<Vec<_>>().join("_")).collect()
    }

    #[test]
    fn test_standard_grid_iterates_rate_outer_warmup_inner() {
        let grid = SweepGrid::standard(["1e-05", "2e-05"], ["cosine", "constant"], ["0.1", "0.3"]);
        assert_eq!(grid.len(), 8);
        assert_eq!(
            ids(&grid),
            vec![
                "1e-05_cosine_0.1",
                "1e-05_cosine_0.3",
                "1e-05_constant_0.1",
                "1e-05_constant_0.3",
                "2e-05_cosine_0.1",
                "2e-05_cosine_0.3",
                "2e-05_constant_0.1",
                "2e-05_constant_0.3",
            ]
        );
    }

    #[test]
    fn test_points_count_matches_len_and_is_repeatable() {
        let grid = SweepGrid::standard(["1e-05", "2e-05", "3e-05"], ["cosine"], ["0.0", "0.1"])
            .with_axis(SweepAxis::new("num_train_epochs", ["10", "20"]));
        assert_eq!(grid.points().count(), 12);
        assert_eq!(ids(&grid), ids(&grid));
    }

    #[test]
    fn test_single_point_grid() {
        let grid = SweepGrid::standard(["8e-06"], ["cosine"], ["0.3"]);
        let points: Vec<_> = grid.points().collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].slug(), "8e-06-cosine-0.3");
        assert_eq!(points[0].get(LEARNING_RATE).map(AxisValue::as_str), Some("8e-06"));
    }

    #[test]
    fn test_empty_axis_yields_no_points() {
        let grid = SweepGrid::standard(Vec::<&str>::new(), ["cosine"], ["0.3"]);
        assert_eq!(grid.points().count(), 0);
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_separators() {
        assert!(SweepGrid::standard(["1e-05", "1e-05"], ["cosine"], ["0.3"]).validate().is_err());
        assert!(SweepGrid::standard(["1e_05"], ["cosine"], ["0.3"]).validate().is_err());
        assert!(SweepGrid::standard(["1e-05"], ["cosine"], ["0 3"]).validate().is_err());
        assert!(SweepGrid::standard(["1e-05"], ["constant_with_warmup"], ["0.3"]).validate().is_ok());

        let twice = SweepGrid::standard(["1e-05"], ["cosine"], ["0.3"]).with_axis(SweepAxis::new(WARMUP_RATIO, ["0.1"]));
        assert!(twice.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_reserved_flags() {
        let base = || SweepGrid::standard(["1e-05"], ["cosine"], ["0.1"]);
        for flag in RESERVED_FLAGS {
            let err = base().with_axis(SweepAxis::new(flag, ["a", "b"])).validate().unwrap_err();
            assert!(err.to_string().contains(flag), "{err}");
        }
        assert!(base().with_axis(SweepAxis::new("num_beams", ["2", "4"])).validate().is_ok());
    }

    #[test]
    fn test_set_axis_replaces_values() {
        let mut grid = SweepGrid::standard(["8e-06"], ["cosine"], ["0.3"]);
        grid.set_axis(SweepAxis::new(LR_SCHEDULER_TYPE, ["cosine", "constant"]));
        assert_eq!(grid.axes.len(), 3);
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn test_axis_value_deserializes_numbers_and_strings() {
        #[derive(Deserialize)]
        struct Doc {
            values: Vec<AxisValue>,
        }
        let doc: Doc = toml::from_str(r#"values = ["8e-06", 0.3, 20]"#).unwrap();
        let texts: Vec<_> = doc.values.iter().map(AxisValue::as_str).collect();
        assert_eq!(texts, vec!["8e-06", "0.3", "20"]);

        let doc: Doc = toml::from_str("values = [0.0, 1.0, 0.05]").unwrap();
        let texts: Vec<_> = doc.values.iter().map(AxisValue::as_str).collect();
        assert_eq!(texts, vec!["0.0", "1.0", "0.05"]);
    }

    #[test]
    fn test_axis_value_rejects_unquoted_small_floats() {
        #[derive(Debug, Deserialize)]
        struct Doc {
            #[allow(dead_code)]
            values: Vec<AxisValue>,
        }
        let err = toml::from_str::<Doc>("values = [8e-06]").unwrap_err();
        assert!(err.to_string().contains("write it as a string"), "{err}");
    }
}
