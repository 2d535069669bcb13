//! `sweep split`: carve a validation set out of a labelled TSV file.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use sweeper_training::{read_conll_file, split_holdout, write_conll_file};

pub const VALIDATION_FILE: &str = "val.tsv";
pub const TEST_FILE: &str = "test_new.tsv";

pub fn execute(input: &Path, out_dir: &Path, fraction: f64, seed: u64) -> Result<()> {
    let sentences = read_conll_file(input)?;
    if sentences.is_empty() {
        anyhow::bail!("No sentences found in {}", input.display());
    }

    let (validation, test) = split_holdout(&sentences, fraction, seed)?;
    let val_path = out_dir.join(VALIDATION_FILE);
    let test_path = out_dir.join(TEST_FILE);
    write_conll_file(&val_path, &validation).with_context(|| format!("Failed to write {}", val_path.display()))?;
    write_conll_file(&test_path, &test).with_context(|| format!("Failed to write {}", test_path.display()))?;

    println!();
    println!("{}", "Dataset split complete".bold().green());
    println!("  Validation: {} sentences -> {}", validation.len().to_string().cyan(), val_path.display());
    println!("  Test:       {} sentences -> {}", test.len().to_string().cyan(), test_path.display());
    println!();
    Ok(())
}
