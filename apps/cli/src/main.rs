//! Sweeper CLI - hyperparameter sweeps over an external trainer
//!
//! Provides the `sweep` command: plan, dry-run, and run one training job
//! per hyperparameter combination, plus dataset preparation helpers.

mod commands;
mod config;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, shells};
use std::path::PathBuf;
use sweeper_training::dataset::{DEFAULT_HOLDOUT_FRACTION, DEFAULT_SPLIT_SEED};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{check, init, plan, run, split, SweepArgs};

/// Sweeper CLI - run a training program over a hyperparameter grid
///
/// Every combination of learning rate, scheduler and warmup ratio (plus any
/// extra axes) becomes one uniquely named training job, launched in order.
#[derive(Parser, Debug)]
#[command(
    name = "sweep",
    author,
    version,
    about = "Sweeper - hyperparameter sweeps for external trainers",
    long_about = "Sweeper launches one training job per hyperparameter combination, sequentially,\nwith a unique identifier and output directory for each."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every job of the sweep
    ///
    /// Jobs run one at a time in plan order. The exit status is 0 only if
    /// every job succeeded, 130 after Ctrl-C, and 1 otherwise.
    Run {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Print the command lines instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Stop at the first failing job and skip the rest
        #[arg(long, conflicts_with = "keep_going")]
        fail_fast: bool,

        /// Run every job even after failures (the default)
        #[arg(long)]
        keep_going: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the planned jobs without running anything
    Plan {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the sweep file and the datasets it references
    Check {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Split a TSV dataset into validation and test files
    Split {
        /// Source TSV file (token<TAB>tag per line)
        #[arg(long)]
        input: PathBuf,

        /// Directory that receives val.tsv and test_new.tsv
        #[arg(long)]
        out_dir: PathBuf,

        /// Share of sentences moved to the validation split
        #[arg(long, default_value_t = DEFAULT_HOLDOUT_FRACTION)]
        fraction: f64,

        /// Random seed for the split
        #[arg(long, default_value_t = DEFAULT_SPLIT_SEED)]
        seed: u64,
    },

    /// Write a sweep file with the pinned configuration
    Init {
        /// Target file (defaults to ./sweep.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Handle completion generation
    if let Ok(shell) = std::env::var("SWEEPER_GENERATE_COMPLETIONS") {
        let mut cmd = Args::command();
        match shell.as_str() {
            "bash" => generate(shells::Bash, &mut cmd, "sweep", &mut std::io::stdout()),
            "zsh" => generate(shells::Zsh, &mut cmd, "sweep", &mut std::io::stdout()),
            "fish" => generate(shells::Fish, &mut cmd, "sweep", &mut std::io::stdout()),
            _ => {
                eprintln!("Unknown shell: {}. Supported: bash, zsh, fish", shell);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let args = Args::parse();
    let prefs = config::load_preferences();

    let level = match args.log_level.as_deref().or(prefs.log_level.as_deref()).unwrap_or("info") {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let json_default = prefs.output.always_json;
    let code = match command {
        Command::Run { sweep, dry_run, fail_fast, keep_going, json } => {
            let options = run::RunOptions { dry_run, fail_fast, keep_going, json: json || json_default };
            run::execute(sweep, options, &prefs).await?
        }
        Command::Plan { sweep, json } => {
            plan::execute(&sweep, json || json_default, &prefs)?;
            0
        }
        Command::Check { sweep, json } => {
            check::execute(&sweep, json || json_default, &prefs)?;
            0
        }
        Command::Split { input, out_dir, fraction, seed } => {
            split::execute(&input, &out_dir, fraction, seed)?;
            0
        }
        Command::Init { path, force } => {
            init::execute(path, force)?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
