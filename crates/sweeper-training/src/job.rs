use crate::error::SweepResult;
use crate::grid::SweepPoint;
use crate::hyperparams::HyperparameterSet;
use crate::template::{render, TrainingTemplate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identifier of one sweep point, e.g. `8e-06_cosine_0.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Derive the identifier for a point: the standard triple, then any extra axis values.
    pub fn for_point(hyperparameters: &HyperparameterSet, point: &SweepPoint) -> Self {
        let mut id = hyperparameters.identifier();
        for binding in &point.bindings {
            if !crate::grid::is_standard_axis(&binding.flag) {
                id.push('_');
                id.push_str(binding.value.as_str());
            }
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Everything needed to launch one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Position in iteration order, starting at 0.
    pub index: usize,
    pub id: JobId,
    pub hyperparameters: HyperparameterSet,
    pub point: SweepPoint,
    pub model_source: String,
    pub output_dir: PathBuf,
    pub run_name: String,
}

impl JobSpec {
    pub fn derive(index: usize, point: SweepPoint, template: &TrainingTemplate) -> SweepResult<Self> {
        let hyperparameters = HyperparameterSet::from_point(&point)?;
        let id = JobId::for_point(&hyperparameters, &point);

        let model_source = render(&template.model_name_or_path, id.as_str(), &point)?;
        let output_dir = PathBuf::from(render(&template.output_dir, id.as_str(), &point)?);
        let run_name = render(&template.project_name, id.as_str(), &point)?;

        Ok(Self { index, id, hyperparameters, point, model_source, output_dir, run_name })
    }

    /// Build the trainer invocation as an explicit argument vector.
    ///
    /// Order: launcher args, launcher precision, entry point, static flags,
    /// derived paths, axis bindings, switches, `extra_args`. A static flag
    /// that is also a sweep axis is emitted once, with the swept value.
    pub fn command_line(&self, template: &TrainingTemplate) -> CommandLine {
        let mut args: Vec<String> = template.launcher.args.clone();
        args.push("--mixed_precision".to_string());
        args.push(template.mixed_precision.clone());
        args.push(template.entry_point.clone());

        let mut flags = ArgBuilder::new(args, &self.point);

        flags.value("torch_dtype", &template.torch_dtype);
        if let Some(bits) = template.quantization {
            flags.value("quantization", bits);
        }
        flags.values("train_tsvs", &template.train_tsvs);
        flags.values("dev_tsvs", &template.dev_tsvs);
        flags.values("test_tsvs", &template.test_tsvs);
        flags.value("num_beams", template.num_beams);
        flags.value("num_return_sequences", template.num_return_sequences);
        flags.value("per_device_train_batch_size", template.per_device_train_batch_size);
        flags.value("per_device_eval_batch_size", template.per_device_eval_batch_size);
        flags.value("gradient_accumulation_steps", template.gradient_accumulation_steps);
        flags.value("optim", &template.optim);
        flags.value("num_train_epochs", template.num_train_epochs);
        flags.value("eval_every_epochs", template.eval_every_epochs);
        flags.value("max_source_length", template.max_source_length);
        flags.value("max_target_length", template.max_target_length);
        if template.use_lora {
            flags.value("lora_r", template.lora_r);
            flags.value("lora_alpha", template.lora_alpha);
            flags.value("lora_dropout", template.lora_dropout);
            if !template.lora_target_modules.is_empty() {
                flags.values("lora_target_modules", &template.lora_target_modules);
            }
        }

        flags.value("model_name_or_path", &self.model_source);
        flags.value("output_dir", self.output_dir.display());
        flags.value("project_name", &self.run_name);

        let mut args = flags.finish();
        for binding in &self.point.bindings {
            args.push(format!("--{}", binding.flag));
            args.push(binding.value.as_str().to_string());
        }

        for (enabled, switch) in [
            (template.use_lora, "--use_lora"),
            (template.constrained_generation, "--constrained_generation"),
            (template.add_labels_as_tokens, "--add_labels_as_tokens"),
            (template.force_auto_device_map, "--force_auto_device_map"),
        ] {
            if enabled {
                args.push(switch.to_string());
            }
        }

        args.extend(template.extra_args.iter().cloned());

        CommandLine { program: template.launcher.program.clone(), args }
    }
}

struct ArgBuilder<'a> {
    args: Vec<String>,
    point: &'a SweepPoint,
}

impl<'a> ArgBuilder<'a> {
    fn new(args: Vec<String>, point: &'a SweepPoint) -> Self {
        Self { args, point }
    }

    fn swept(&self, name: &str) -> bool {
        self.point.get(name).is_some()
    }

    fn value(&mut self, name: &str, value: impl std::fmt::Display) {
        if self.swept(name) {
            return;
        }
        self.args.push(format!("--{name}"));
        self.args.push(value.to_string());
    }

    fn values<P: AsRef<Path>>(&mut self, name: &str, values: &[P]) {
        if values.is_empty() || self.swept(name) {
            return;
        }
        self.args.push(format!("--{name}"));
        self.args.extend(values.iter().map(|v| v.as_ref().to_string_lossy().into_owned()));
    }

    fn finish(self) -> Vec<String> {
        self.args
    }
}

/// A program plus its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Value following `--{flag}`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let needle = format!("--{flag}");
        self.args.iter().position(|a| *a == needle).and_then(|i| self.args.get(i + 1)).map(String::as_str)
    }

    pub fn has_switch(&self, switch: &str) -> bool {
        let needle = format!("--{switch}");
        self.args.iter().any(|a| *a == needle)
    }

    /// Shell-quoted rendering for logs and dry runs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | ',' | '+' | '@'));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{SweepAxis, SweepGrid};

    fn job(grid: &SweepGrid, template: &TrainingTemplate) -> JobSpec {
        JobSpec::derive(0, grid.points().next().unwrap(), template).unwrap()
    }

    #[test]
    fn test_pinned_point_paths() {
        let template = TrainingTemplate::default();
        let job = job(&SweepGrid::standard(["8e-06"], ["cosine"], ["0.3"]), &template);

        assert_eq!(job.id.as_str(), "8e-06_cosine_0.3");
        assert_eq!(job.output_dir, PathBuf::from("results/ner-llama-italian-8e-06-cosine-0.3"));
        assert_eq!(job.model_source, "models/mt5-xl-8e-06_cosine_0.3");
    }

    #[test]
    fn test_command_line_carries_point_and_static_flags() {
        let template = TrainingTemplate::default();
        let job = job(&SweepGrid::standard(["8e-06"], ["cosine"], ["0.3"]), &template);
        let cmd = job.command_line(&template);

        assert_eq!(cmd.program, "accelerate");
        assert_eq!(&cmd.args[..4], &["launch", "--mixed_precision", "bf16", "src/seq2seq.py"]);
        assert_eq!(cmd.flag_value("learning_rate"), Some("8e-06"));
        assert_eq!(cmd.flag_value("lr_scheduler_type"), Some("cosine"));
        assert_eq!(cmd.flag_value("warmup_ratio"), Some("0.3"));
        assert_eq!(cmd.flag_value("output_dir"), Some("results/ner-llama-italian-8e-06-cosine-0.3"));
        assert_eq!(cmd.flag_value("num_beams"), Some("4"));
        assert_eq!(cmd.flag_value("train_tsvs"), Some("dataset/italian/train.tsv"));
        assert!(cmd.has_switch("use_lora"));
        assert!(cmd.has_switch("constrained_generation"));
        assert!(cmd.has_switch("add_labels_as_tokens"));
        assert!(!cmd.has_switch("force_auto_device_map"));
    }

    #[test]
    fn test_disabled_switches_are_omitted() {
        let template = TrainingTemplate { use_lora: false, constrained_generation: false, ..Default::default() };
        let job = job(&SweepGrid::standard(["1e-05"], ["constant"], ["0.1"]), &template);
        let cmd = job.command_line(&template);
        assert!(!cmd.has_switch("use_lora"));
        assert!(cmd.flag_value("lora_r").is_none());
        assert!(!cmd.has_switch("constrained_generation"));
    }

    #[test]
    fn test_extra_axis_extends_identifier_and_flags() {
        let template = TrainingTemplate::default();
        let grid = SweepGrid::standard(["1e-05"], ["cosine"], ["0.1"]).with_axis(SweepAxis::new("num_train_epochs", ["10"]));
        let job = job(&grid, &template);
        assert_eq!(job.id.as_str(), "1e-05_cosine_0.1_10");

        let cmd = job.command_line(&template);
        assert_eq!(cmd.args.iter().filter(|a| *a == "--num_train_epochs").count(), 1);
        assert_eq!(cmd.flag_value("num_train_epochs"), Some("10"));
    }

    #[test]
    fn test_display_quotes_only_when_needed() {
        let cmd = CommandLine { program: "python".to_string(), args: vec!["--name".to_string(), "it's here".to_string()] };
        assert_eq!(cmd.display(), r"python --name 'it'\''s here'");
    }
}
