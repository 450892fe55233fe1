//! CLI argument parsing for a conformance run.
//!
//! Arguments are only tokenized here; precedence against the config document
//! is applied by `config::resolve`.
use crate::levels::ErrorLevel;
use clap::{Parser, ValueEnum};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug, Default)]
#[command(
    name = "confrun",
    version,
    about = "Run a conformance suite and match diagnostics against expected constraints",
    after_help = "Examples:\n  confrun suite/index.json --engine 'validator --json'\n  confrun --config configs/all.json --filter 'calc-*' --parallel --processes 8\n  confrun suite/index.json --ignore-level warning --dry-run"
)]
pub struct RunArgs {
    /// Test suite index document
    #[arg(value_name = "INDEX")]
    pub index_file: Option<PathBuf>,

    /// JSON config document providing defaults for this run
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Select test cases matching TOKEN (repeatable; replaces config filters)
    #[arg(long = "filter", value_name = "TOKEN")]
    pub filters: Vec<String>,

    /// Exclude diagnostics at LEVEL from matching (repeatable; replaces config levels)
    #[arg(long = "ignore-level", value_name = "LEVEL")]
    pub ignore_levels: Vec<ErrorLevel>,

    /// Directory for the persisted run report and progress log
    #[arg(long, value_name = "DIR")]
    pub log_directory: Option<PathBuf>,

    /// Whether a test case must match all filters or any one of them
    #[arg(long = "match", value_enum, value_name = "MODE")]
    pub match_mode: Option<MatchMode>,

    /// Human-readable run label (defaults to the index file stem)
    #[arg(long)]
    pub name: Option<String>,

    /// Run test cases one at a time in index order
    #[arg(long, conflicts_with = "parallel")]
    pub series: bool,

    /// Run test cases across a pool of worker threads
    #[arg(long, conflicts_with = "series")]
    pub parallel: bool,

    /// Worker count for parallel runs (defaults to the CPU count)
    #[arg(long, value_name = "N")]
    pub processes: Option<NonZeroUsize>,

    /// Ask the engine to compare formula output
    #[arg(long)]
    pub compare_formula_output: bool,

    /// Processing engine command line, split with shell quoting rules
    #[arg(long, value_name = "COMMAND")]
    pub engine: Option<String>,

    /// Print the resolved options and selected test cases without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Emit debug logging
    #[arg(long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Execution mode requested on the command line, if any.
    pub fn parallel_override(&self) -> Option<bool> {
        if self.parallel {
            Some(true)
        } else if self.series {
            Some(false)
        } else {
            None
        }
    }
}

/// Filter combination mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchMode {
    All,
    Any,
}

impl MatchMode {
    pub fn is_all(self) -> bool {
        matches!(self, MatchMode::All)
    }
}
