//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::batch::BatchOptions;

/// Synthetic support-chat dataset generator and support-quality evaluator.
#[derive(Debug, Parser)]
#[command(name = "chatforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Model override for this run.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Retries after a rate-limited request.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Path to a config file (default: ./chatforge.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a synthetic dataset of support conversations.
    Generate {
        /// Number of conversations to generate.
        #[arg(long, default_value_t = 40, value_parser = clap::value_parser!(u16).range(20..=500))]
        count: u16,

        /// Seed for blueprint planning and generation.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Dataset language (default from config).
        #[arg(long)]
        language: Option<String>,

        /// Output JSONL dataset path.
        #[arg(long, default_value = "artifacts/datasets/support_chats.jsonl")]
        output: PathBuf,

        /// Output manifest path.
        #[arg(long, default_value = "artifacts/datasets/support_chats.manifest.json")]
        manifest: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Evaluate support quality for every conversation in a dataset.
    Evaluate {
        /// Input dataset JSONL path.
        #[arg(long, default_value = "artifacts/datasets/support_chats.jsonl")]
        input: PathBuf,

        /// Output evaluation report path.
        #[arg(long, default_value = "artifacts/reports/support_evaluation.json")]
        output: PathBuf,

        /// Base seed; item `i` is evaluated with `seed + i`.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Resume controls shared by both subcommands.
#[derive(Debug, Clone, Copy, Args)]
pub struct RunArgs {
    /// Zero-based index of the first item to process.
    #[arg(long, default_value_t = 0)]
    pub start_from: usize,

    /// Keep existing output and reuse replay-cache entries.
    #[arg(long, default_value_t = false)]
    pub resume_from_cache: bool,

    /// Ignore the replay cache and call the model for every item.
    #[arg(long, default_value_t = false)]
    pub force_refresh: bool,
}

impl From<RunArgs> for BatchOptions {
    fn from(args: RunArgs) -> Self {
        BatchOptions {
            start_from: args.start_from,
            resume_from_cache: args.resume_from_cache,
            force_refresh: args.force_refresh,
        }
    }
}
