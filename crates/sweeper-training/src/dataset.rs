//! Token-per-line TSV datasets (`token<TAB>tag`, blank line between sentences).

use crate::error::{SweepError, SweepResult};
use crate::template::TrainingTemplate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.2;
pub const DEFAULT_SPLIT_SEED: u64 = 42;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
}

impl Sentence {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

pub fn parse_conll(contents: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current = Sentence::default();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }
        // Anything other than exactly `token<TAB>tag` is skipped.
        let mut parts = line.split('\t');
        if let (Some(token), Some(tag), None) = (parts.next(), parts.next(), parts.next()) {
            current.tokens.push(token.to_string());
            current.tags.push(tag.to_string());
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

pub fn read_conll_file(path: &Path) -> SweepResult<Vec<Sentence>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SweepError::Dataset(format!("failed to read {}: {}", path.display(), e)))?;
    Ok(parse_conll(&contents))
}

pub fn write_conll_file(path: &Path, sentences: &[Sentence]) -> SweepResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    for sentence in sentences {
        for (token, tag) in sentence.tokens.iter().zip(&sentence.tags) {
            writeln!(out, "{token}\t{tag}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub sentences: usize,
    pub tokens: usize,
    pub labels: BTreeSet<String>,
}

pub fn dataset_stats(sentences: &[Sentence]) -> DatasetStats {
    DatasetStats {
        sentences: sentences.len(),
        tokens: sentences.iter().map(Sentence::len).sum(),
        labels: sentences.iter().flat_map(|s| s.tags.iter().cloned()).collect(),
    }
}

/// Split off a seeded random validation sample; the rest keeps its original order.
///
/// Returns `(validation, test)` with `floor(n * fraction)` validation sentences.
pub fn split_holdout(sentences: &[Sentence], fraction: f64, seed: u64) -> SweepResult<(Vec<Sentence>, Vec<Sentence>)> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(SweepError::Dataset(format!("holdout fraction must be in [0, 1], got {fraction}")));
    }
    let n = sentences.len();
    let amount = (n as f64 * fraction).floor() as usize;

    let mut rng = StdRng::seed_from_u64(seed);
    let picked = sample(&mut rng, n, amount).into_vec();

    let mut is_val = vec![false; n];
    for &i in &picked {
        is_val[i] = true;
    }
    let validation = picked.iter().map(|&i| sentences[i].clone()).collect();
    let test = sentences.iter().zip(&is_val).filter(|(_, v)| !**v).map(|(s, _)| s.clone()).collect();
    Ok((validation, test))
}

/// Per-file statistics gathered before any job is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetReport {
    pub role: String,
    pub path: PathBuf,
    pub stats: DatasetStats,
}

/// Check every dataset file the template references, relative to `root`.
pub fn check_datasets(template: &TrainingTemplate, root: &Path) -> SweepResult<Vec<DatasetReport>> {
    let mut reports = Vec::new();
    for (role, paths) in [("train", &template.train_tsvs), ("dev", &template.dev_tsvs), ("test", &template.test_tsvs)] {
        for path in paths {
            let resolved = root.join(path);
            if !resolved.is_file() {
                return Err(SweepError::config(format!("{role} dataset not found: {}", resolved.display())));
            }
            let stats = dataset_stats(&read_conll_file(&resolved)?);
            if stats.sentences == 0 {
                return Err(SweepError::config(format!("{role} dataset has no sentences: {}", resolved.display())));
            }
            reports.push(DatasetReport { role: role.to_string(), path: path.clone(), stats });
        }
    }
    Ok(reports)
}
