//! Test case selection, dispatch, and aggregation.
//!
//! Workers only execute and match; every state transition, progress line and
//! the final report go through a single `RunAggregator` on the calling thread.
mod report;

pub use report::{Report, TestcaseResult, TestcaseStatus};

use crate::config::RunOptions;
use crate::constraint::{pattern_matches, Constraint};
use crate::engine::{EngineRequest, ProcessingEngine};
use crate::matcher;
use crate::suite::{SuiteLoader, TestcaseDescriptor};
use crate::util::file_name_component;
use anyhow::{Context, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

/// Test cases passing the filter tokens, with their index positions.
///
/// A token selects a test case when it globs the id, the location, or any
/// attribute value. No tokens selects everything.
pub fn select_testcases<'a>(
    testcases: &'a [TestcaseDescriptor],
    filters: &[String],
    match_all: bool,
) -> Vec<(usize, &'a TestcaseDescriptor)> {
    testcases
        .iter()
        .enumerate()
        .filter(|(_, testcase)| is_selected(testcase, filters, match_all))
        .collect()
}

fn is_selected(testcase: &TestcaseDescriptor, filters: &[String], match_all: bool) -> bool {
    if filters.is_empty() {
        return true;
    }
    let selects = |token: &String| filter_selects(token, testcase);
    if match_all {
        filters.iter().all(selects)
    } else {
        filters.iter().any(selects)
    }
}

fn filter_selects(token: &str, testcase: &TestcaseDescriptor) -> bool {
    pattern_matches(token, &testcase.id)
        || pattern_matches(token, &testcase.location.to_string_lossy())
        || testcase
            .attributes
            .values()
            .any(|value| pattern_matches(token, value))
}

/// Load, select, execute, and aggregate one conformance run.
pub fn run(
    options: &RunOptions,
    loader: &dyn SuiteLoader,
    engine: &dyn ProcessingEngine,
) -> Result<Report> {
    let testcases = loader
        .load(&options.index_file)
        .with_context(|| format!("load test suite {}", options.index_file.display()))?;
    let jobs: Vec<Job<'_>> =
        select_testcases(&testcases, &options.filters, options.match_all)
            .into_iter()
            .map(|(position, testcase)| Job::plan(position, testcase, options))
            .collect();
    tracing::info!(
        loaded = testcases.len(),
        selected = jobs.len(),
        parallel = options.parallel,
        "test suite loaded"
    );

    let start = Instant::now();
    let mut aggregator = RunAggregator::new(options, &jobs)?;
    if options.parallel {
        run_parallel(options, engine, jobs, &mut aggregator)?;
    } else {
        for job in &jobs {
            aggregator.record(WorkerEvent::Started {
                position: job.position,
            });
            let result = execute(job, options, engine);
            aggregator.record(WorkerEvent::Finished {
                position: job.position,
                result,
            });
        }
    }
    let report = aggregator.finish()?;
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis(),
        passed = report.passed,
        failed = report.failed,
        errored = report.errored,
        "test run complete"
    );
    Ok(report)
}

/// One selected test case with everything resolved for execution.
struct Job<'a> {
    position: usize,
    testcase: &'a TestcaseDescriptor,
    /// Suite-declared constraints followed by configured ones.
    constraints: Vec<&'a Constraint>,
}

impl<'a> Job<'a> {
    fn plan(position: usize, testcase: &'a TestcaseDescriptor, options: &'a RunOptions) -> Self {
        let constraints = testcase
            .expected
            .iter()
            .chain(options.constraints_for(&testcase.id))
            .collect();
        Job {
            position,
            testcase,
            constraints,
        }
    }
}

enum WorkerEvent {
    Started { position: usize },
    Finished { position: usize, result: TestcaseResult },
}

fn worker_count(processes: Option<NonZeroUsize>, jobs: usize) -> usize {
    processes
        .map(NonZeroUsize::get)
        .unwrap_or_else(num_cpus::get)
        .min(jobs)
        .max(1)
}

fn run_parallel(
    options: &RunOptions,
    engine: &dyn ProcessingEngine,
    jobs: Vec<Job<'_>>,
    aggregator: &mut RunAggregator,
) -> Result<()> {
    let workers = worker_count(options.processes, jobs.len());
    tracing::debug!(workers, "starting worker pool");

    let (job_sender, job_receiver) = crossbeam_channel::unbounded();
    for job in jobs {
        // The receiver is still held here, so sending cannot fail.
        let _ = job_sender.send(job);
    }
    drop(job_sender);

    let (event_sender, event_receiver) = crossbeam_channel::unbounded();
    thread::scope(|scope| -> Result<()> {
        for index in 0..workers {
            let job_receiver = job_receiver.clone();
            let event_sender = event_sender.clone();
            thread::Builder::new()
                .name(format!("confrun-worker-{index}"))
                .spawn_scoped(scope, move || {
                    for job in job_receiver.iter() {
                        let _ = event_sender.send(WorkerEvent::Started {
                            position: job.position,
                        });
                        let result = execute(&job, options, engine);
                        let _ = event_sender.send(WorkerEvent::Finished {
                            position: job.position,
                            result,
                        });
                    }
                })
                .with_context(|| format!("spawn worker {index}"))?;
        }
        drop(event_sender);

        for event in event_receiver.iter() {
            aggregator.record(event);
        }
        Ok(())
    })
}

/// Execute one test case and match its diagnostics. Never fails: engine errors
/// and panics become an errored result for this test case alone.
fn execute(job: &Job<'_>, options: &RunOptions, engine: &dyn ProcessingEngine) -> TestcaseResult {
    let testcase = job.testcase;
    let request = EngineRequest {
        testcase,
        disclosure_system: options.disclosure_system_for(&testcase.id),
        plugins: options.plugins_for(&testcase.id),
        compare_formula_output: options.compare_formula_output,
        custom_compare_patterns: &options.custom_compare_patterns,
        options: &options.options,
    };
    match panic::catch_unwind(AssertUnwindSafe(|| engine.execute(&request))) {
        Ok(Ok(diagnostics)) => {
            let outcome = matcher::evaluate(
                &testcase.id,
                &diagnostics,
                job.constraints.iter().copied(),
                &options.ignore_levels,
            );
            tracing::debug!(
                testcase = %outcome.testcase_id,
                considered = outcome.considered,
                passed = outcome.passed(),
                "diagnostics matched"
            );
            TestcaseResult::matched(testcase, outcome, diagnostics.len())
        }
        Ok(Err(err)) => TestcaseResult::errored(testcase, format!("{err:#}")),
        Err(payload) => TestcaseResult::errored(
            testcase,
            format!("engine panicked: {}", panic_message(payload.as_ref())),
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[derive(Debug)]
enum TestcaseState {
    Pending,
    Running,
    Finished(TestcaseStatus),
}

struct Tracked {
    id: String,
    state: TestcaseState,
}

/// Single owner of run state. Results arrive in completion order.
struct RunAggregator {
    name: String,
    index_file: PathBuf,
    log_directory: Option<PathBuf>,
    tracked: BTreeMap<usize, Tracked>,
    results: Vec<(usize, TestcaseResult)>,
    progress: Option<ProgressLog>,
}

impl RunAggregator {
    fn new(options: &RunOptions, jobs: &[Job<'_>]) -> Result<Self> {
        let tracked = jobs
            .iter()
            .map(|job| {
                (
                    job.position,
                    Tracked {
                        id: job.testcase.id.clone(),
                        state: TestcaseState::Pending,
                    },
                )
            })
            .collect();
        let progress = options
            .log_directory
            .as_deref()
            .map(|dir| ProgressLog::create(dir, &options.name))
            .transpose()?;
        Ok(RunAggregator {
            name: options.name.clone(),
            index_file: options.index_file.clone(),
            log_directory: options.log_directory.clone(),
            tracked,
            results: Vec::with_capacity(jobs.len()),
            progress,
        })
    }

    fn record(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Started { position } => {
                let Some(entry) = self.tracked.get_mut(&position) else {
                    return;
                };
                tracing::debug!(testcase = %entry.id, from = ?entry.state, "test case started");
                entry.state = TestcaseState::Running;
            }
            WorkerEvent::Finished { position, result } => {
                if let Some(entry) = self.tracked.get_mut(&position) {
                    entry.state = TestcaseState::Finished(result.status);
                }
                match &result.error {
                    Some(error) => {
                        tracing::warn!(testcase = %result.id, error = %error, "test case errored")
                    }
                    None => tracing::debug!(
                        testcase = %result.id,
                        status = result.status.label(),
                        "test case finished"
                    ),
                }
                if let Some(progress) = self.progress.as_mut() {
                    progress.append(&result);
                }
                self.results.push((position, result));
            }
        }
    }

    fn finish(self) -> Result<Report> {
        let unfinished = self
            .tracked
            .values()
            .filter(|entry| !matches!(entry.state, TestcaseState::Finished(_)))
            .count();
        if unfinished > 0 {
            tracing::warn!(unfinished, "test cases did not report a result");
        }
        let report = Report::from_results(&self.name, &self.index_file, self.results);
        if let Some(dir) = &self.log_directory {
            let path = report.write(dir)?;
            tracing::info!(path = %path.display(), "report written");
        }
        Ok(report)
    }
}

/// Append-only progress log at `<log_directory>/<name>.log`.
struct ProgressLog {
    path: PathBuf,
    file: Option<File>,
}

impl ProgressLog {
    fn create(log_directory: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(log_directory)
            .with_context(|| format!("create {}", log_directory.display()))?;
        let path = log_directory.join(format!("{}.log", file_name_component(name)));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        Ok(ProgressLog {
            path,
            file: Some(file),
        })
    }

    /// Write failures disable further progress lines; the run continues.
    fn append(&mut self, result: &TestcaseResult) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let line = match &result.error {
            Some(error) => format!("{} {}: {error}", result.status.label(), result.id),
            None => format!("{} {}", result.status.label(), result.id),
        };
        if let Err(err) = writeln!(file, "{line}") {
            tracing::warn!(path = %self.path.display(), error = %err, "progress log disabled");
            self.file = None;
        }
    }
}
