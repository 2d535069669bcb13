//! Static trainer configuration shared by every job of a sweep.
//!
//! Flag names are the trainer's own and are passed through verbatim.
//! `model_name_or_path`, `output_dir` and `project_name` accept
//! placeholders: `{id}`, `{slug}` and `{<axis flag>}`.

use crate::error::{SweepError, SweepResult};
use crate::grid::SweepPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

const MIXED_PRECISION: [&str; 4] = ["no", "fp16", "bf16", "fp8"];
const TORCH_DTYPES: [&str; 4] = ["auto", "float32", "float16", "bfloat16"];

/// Process front-end that wraps the training entry point (e.g. `accelerate launch`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for LauncherSpec {
    fn default() -> Self {
        Self {
            program: "accelerate".to_string(),
            args: vec!["launch".to_string()],
        }
    }
}

impl LauncherSpec {
    /// Process count requested through `--num_processes`, if any.
    pub fn num_processes(&self) -> Option<u32> {
        let mut args = self.args.iter();
        while let Some(arg) = args.next() {
            if let Some(n) = arg.strip_prefix("--num_processes=") {
                return n.parse().ok();
            }
            if arg == "--num_processes" {
                return args.next().and_then(|n| n.parse().ok());
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingTemplate {
    pub launcher: LauncherSpec,
    pub entry_point: String,

    // Precision
    pub mixed_precision: String,
    pub torch_dtype: String,
    pub quantization: Option<u8>,

    // LoRA
    pub use_lora: bool,
    pub lora_r: u32,
    pub lora_alpha: u32,
    pub lora_dropout: f64,
    pub lora_target_modules: Vec<String>,

    // Generation
    pub constrained_generation: bool,
    pub num_beams: u32,
    pub num_return_sequences: u32,

    // Data
    pub train_tsvs: Vec<PathBuf>,
    pub dev_tsvs: Vec<PathBuf>,
    pub test_tsvs: Vec<PathBuf>,
    pub max_source_length: u32,
    pub max_target_length: u32,
    pub add_labels_as_tokens: bool,

    pub model_name_or_path: String,

    // Optimisation
    pub per_device_train_batch_size: u32,
    pub per_device_eval_batch_size: u32,
    pub gradient_accumulation_steps: u32,
    pub optim: String,
    pub num_train_epochs: u32,
    pub eval_every_epochs: u32,

    // Output
    pub output_dir: String,
    pub project_name: String,
    pub force_auto_device_map: bool,

    /// Appended to every command line unchanged.
    pub extra_args: Vec<String>,
}

impl Default for TrainingTemplate {
    fn default() -> Self {
        Self {
            launcher: LauncherSpec::default(),
            entry_point: "src/seq2seq.py".to_string(),
            mixed_precision: "bf16".to_string(),
            torch_dtype: "bfloat16".to_string(),
            quantization: None,
            use_lora: true,
            lora_r: 8,
            lora_alpha: 16,
            lora_dropout: 0.05,
            lora_target_modules: Vec::new(),
            constrained_generation: true,
            num_beams: 4,
            num_return_sequences: 1,
            train_tsvs: vec![PathBuf::from("dataset/italian/train.tsv")],
            dev_tsvs: vec![PathBuf::from("dataset/italian/val.tsv")],
            test_tsvs: vec![PathBuf::from("dataset/italian/test_new.tsv")],
            max_source_length: 256,
            max_target_length: 256,
            add_labels_as_tokens: true,
            model_name_or_path: "models/mt5-xl-{id}".to_string(),
            per_device_train_batch_size: 8,
            per_device_eval_batch_size: 8,
            gradient_accumulation_steps: 1,
            optim: "adamw_torch_fused".to_string(),
            num_train_epochs: 20,
            eval_every_epochs: 4,
            output_dir: "results/ner-llama-italian-{slug}".to_string(),
            project_name: "ner-llama-italian".to_string(),
            force_auto_device_map: false,
            extra_args: Vec::new(),
        }
    }
}

impl TrainingTemplate {
    pub fn validate(&self) -> SweepResult<()> {
        if self.launcher.program.trim().is_empty() {
            return Err(SweepError::config("launcher.program is required"));
        }
        if self.entry_point.trim().is_empty() {
            return Err(SweepError::config("entry_point is required"));
        }
        if self.model_name_or_path.trim().is_empty() {
            return Err(SweepError::config("model_name_or_path is required"));
        }

        for (name, value) in [
            ("per_device_train_batch_size", self.per_device_train_batch_size),
            ("per_device_eval_batch_size", self.per_device_eval_batch_size),
            ("gradient_accumulation_steps", self.gradient_accumulation_steps),
            ("num_train_epochs", self.num_train_epochs),
            ("eval_every_epochs", self.eval_every_epochs),
            ("num_beams", self.num_beams),
            ("num_return_sequences", self.num_return_sequences),
            ("max_source_length", self.max_source_length),
            ("max_target_length", self.max_target_length),
        ] {
            if value == 0 {
                return Err(SweepError::config(format!("{name} must be >= 1")));
            }
        }
        if self.num_return_sequences > self.num_beams {
            return Err(SweepError::config(format!(
                "num_return_sequences ({}) cannot exceed num_beams ({})",
                self.num_return_sequences, self.num_beams
            )));
        }

        if !MIXED_PRECISION.contains(&self.mixed_precision.as_str()) {
            return Err(SweepError::config(format!(
                "mixed_precision must be one of {:?}, got {:?}",
                MIXED_PRECISION, self.mixed_precision
            )));
        }
        if !TORCH_DTYPES.contains(&self.torch_dtype.as_str()) {
            return Err(SweepError::config(format!(
                "torch_dtype must be one of {:?}, got {:?}",
                TORCH_DTYPES, self.torch_dtype
            )));
        }

        match self.quantization {
            None => {}
            Some(4 | 8) if self.use_lora => {}
            Some(4 | 8) => {
                return Err(SweepError::config(
                    "quantization requires use_lora; 4/8 bit training is only supported with LoRA adapters",
                ));
            }
            Some(other) => {
                return Err(SweepError::config(format!("quantization must be 4 or 8, got {other}")));
            }
        }
        if self.use_lora {
            if self.lora_r == 0 || self.lora_alpha == 0 {
                return Err(SweepError::config("lora_r and lora_alpha must be >= 1"));
            }
            if !(0.0..1.0).contains(&self.lora_dropout) {
                return Err(SweepError::config(format!("lora_dropout must be in [0, 1), got {}", self.lora_dropout)));
            }
        }

        if self.force_auto_device_map && self.launcher.num_processes().is_some_and(|n| n > 1) {
            return Err(SweepError::config(
                "force_auto_device_map splits one model across devices and cannot be combined with \
                 a multi-process launcher (--num_processes > 1)",
            ));
        }

        if self.train_tsvs.is_empty() {
            return Err(SweepError::config("train_tsvs must list at least one file"));
        }
        if !(self.output_dir.contains("{id}") || self.output_dir.contains("{slug}")) {
            return Err(SweepError::config(format!(
                "output_dir {:?} must contain {{id}} or {{slug}} so sweep points get distinct directories",
                self.output_dir
            )));
        }
        Ok(())
    }

    /// Stable hash of the template, recorded with every sweep report.
    pub fn fingerprint(&self) -> SweepResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Substitute `{id}`, `{slug}` and `{<axis flag>}` placeholders.
pub fn render(pattern: &str, id: &str, point: &SweepPoint) -> SweepResult<String> {
    let mut out = String::with_capacity(pattern.len() + 32);
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| SweepError::config(format!("unclosed placeholder in {pattern:?}")))?;
        let name = &after[..close];

        match name {
            "id" => out.push_str(id),
            "slug" => out.push_str(&point.slug()),
            flag => {
                let value = point
                    .get(flag)
                    .ok_or_else(|| SweepError::config(format!("unknown placeholder {{{flag}}} in {pattern:?}")))?;
                out.push_str(value.as_str());
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SweepGrid;

    fn point() -> SweepPoint {
        SweepGrid::standard(["8e-06"], ["cosine"], ["0.3"]).points().next().unwrap()
    }

    #[test]
    fn test_default_template_is_valid() {
        TrainingTemplate::default().validate().unwrap();
    }

    #[test]
    fn test_render_placeholders() {
        let p = point();
        assert_eq!(
            render("results/ner-llama-italian-{slug}", "8e-06_cosine_0.3", &p).unwrap(),
            "results/ner-llama-italian-8e-06-cosine-0.3"
        );
        assert_eq!(render("models/{id}", "8e-06_cosine_0.3", &p).unwrap(), "models/8e-06_cosine_0.3");
        assert_eq!(render("lr-{learning_rate}", "x", &p).unwrap(), "lr-8e-06");
        assert!(render("{nope}", "x", &p).is_err());
        assert!(render("broken-{id", "x", &p).is_err());
    }

    #[test]
    fn test_quantization_rules() {
        let mut t = TrainingTemplate { quantization: Some(4), ..Default::default() };
        t.validate().unwrap();

        t.use_lora = false;
        assert!(t.validate().is_err());

        t.use_lora = true;
        t.quantization = Some(3);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_generation_and_batch_rules() {
        let t = TrainingTemplate { num_beams: 2, num_return_sequences: 3, ..Default::default() };
        assert!(t.validate().is_err());

        let t = TrainingTemplate { per_device_train_batch_size: 0, ..Default::default() };
        assert!(t.validate().unwrap_err().to_string().contains("per_device_train_batch_size"));
    }

    #[test]
    fn test_output_dir_must_be_namespaced() {
        let t = TrainingTemplate { output_dir: "results/fixed".to_string(), ..Default::default() };
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_auto_device_map_conflicts_with_multi_process_launch() {
        let mut t = TrainingTemplate { force_auto_device_map: true, ..Default::default() };
        t.validate().unwrap();

        t.launcher.args.extend(["--num_processes".to_string(), "4".to_string()]);
        assert_eq!(t.launcher.num_processes(), Some(4));
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = TrainingTemplate::default();
        let b = TrainingTemplate { num_train_epochs: 10, ..Default::default() };
        assert_eq!(a.fingerprint().unwrap(), a.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }
}
