use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod constraint;
mod engine;
mod levels;
mod matcher;
mod scheduler;
mod suite;
mod util;

use cli::RunArgs;
use config::RunOptions;
use engine::CommandEngine;
use suite::{JsonIndexLoader, SuiteLoader};

fn main() -> Result<()> {
    let args = RunArgs::parse();
    init_tracing(args.verbose);

    let options = config::resolve(&args).context("could not start test run")?;
    tracing::debug!(
        index = %options.index_file.display(),
        name = %options.name,
        parallel = options.parallel,
        "options resolved"
    );
    if args.dry_run {
        return print_dry_run(&options);
    }

    let command_line = args
        .engine
        .as_deref()
        .ok_or_else(|| anyhow!("no processing engine configured (pass --engine COMMAND)"))
        .context("could not start test run")?;
    let engine =
        CommandEngine::from_command_line(command_line).context("could not start test run")?;

    let report = scheduler::run(&options, &JsonIndexLoader, &engine).context("test run aborted")?;
    print!("{}", report.render_summary());
    if let Some(dir) = &options.log_directory {
        println!("report: {}", report.report_path(dir).display());
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[derive(Serialize)]
struct DryRunPlan<'a> {
    options: &'a RunOptions,
    selected: Vec<&'a str>,
}

fn print_dry_run(options: &RunOptions) -> Result<()> {
    let testcases = JsonIndexLoader
        .load(&options.index_file)
        .with_context(|| format!("load test suite {}", options.index_file.display()))?;
    let selected: Vec<&str> =
        scheduler::select_testcases(&testcases, &options.filters, options.match_all)
            .into_iter()
            .map(|(_, testcase)| testcase.id.as_str())
            .collect();
    let plan = DryRunPlan { options, selected };
    let text = serde_json::to_string_pretty(&plan).context("serialize dry run plan")?;
    println!("{text}");
    Ok(())
}
