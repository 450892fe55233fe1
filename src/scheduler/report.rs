//! Aggregated run report and its persisted form.
use crate::engine::Diagnostic;
use crate::matcher::{MatchResult, UnsatisfiedConstraint};
use crate::suite::TestcaseDescriptor;
use crate::util::{display_path, file_name_component, write_json};
use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Terminal state of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestcaseStatus {
    Passed,
    Failed,
    Errored,
}

impl TestcaseStatus {
    pub fn label(self) -> &'static str {
        match self {
            TestcaseStatus::Passed => "PASS",
            TestcaseStatus::Failed => "FAIL",
            TestcaseStatus::Errored => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestcaseResult {
    pub id: String,
    pub location: PathBuf,
    pub status: TestcaseStatus,
    pub diagnostic_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unsatisfied: Vec<UnsatisfiedConstraint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unexpected: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestcaseResult {
    pub(super) fn matched(
        testcase: &TestcaseDescriptor,
        result: MatchResult,
        diagnostic_count: usize,
    ) -> Self {
        let status = if result.passed() {
            TestcaseStatus::Passed
        } else {
            TestcaseStatus::Failed
        };
        TestcaseResult {
            id: testcase.id.clone(),
            location: testcase.location.clone(),
            status,
            diagnostic_count,
            unsatisfied: result.unsatisfied,
            unexpected: result.unexpected,
            error: None,
        }
    }

    pub(super) fn errored(testcase: &TestcaseDescriptor, message: String) -> Self {
        TestcaseResult {
            id: testcase.id.clone(),
            location: testcase.location.clone(),
            status: TestcaseStatus::Errored,
            diagnostic_count: 0,
            unsatisfied: Vec::new(),
            unexpected: Vec::new(),
            error: Some(message),
        }
    }
}

/// Results of one run, sorted by test case id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub name: String,
    pub index_file: PathBuf,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub results: Vec<TestcaseResult>,
}

impl Report {
    /// Build a report from results tagged with their index position.
    ///
    /// Sorting by id (then index position) makes the report independent of
    /// completion order.
    pub(super) fn from_results(
        name: &str,
        index_file: &Path,
        mut results: Vec<(usize, TestcaseResult)>,
    ) -> Self {
        results.sort_by(|(left_position, left), (right_position, right)| {
            left.id
                .cmp(&right.id)
                .then(left_position.cmp(right_position))
        });
        let results: Vec<TestcaseResult> = results.into_iter().map(|(_, result)| result).collect();
        let count = |status| results.iter().filter(|result| result.status == status).count();
        Report {
            name: name.to_string(),
            index_file: index_file.to_path_buf(),
            total: results.len(),
            passed: count(TestcaseStatus::Passed),
            failed: count(TestcaseStatus::Failed),
            errored: count(TestcaseStatus::Errored),
            results,
        }
    }

    /// Path of the persisted report under `log_directory`.
    pub fn report_path(&self, log_directory: &Path) -> PathBuf {
        log_directory.join(format!("{}.json", file_name_component(&self.name)))
    }

    pub(super) fn write(&self, log_directory: &Path) -> Result<PathBuf> {
        let path = self.report_path(log_directory);
        write_json(&path, self)?;
        Ok(path)
    }

    /// Human-readable summary: one line per non-passing test case, then totals.
    pub fn render_summary(&self) -> String {
        // Loaded locations are canonical; show them relative to the index.
        let parent = self.index_file.parent();
        let canonical = parent.and_then(|dir| dir.canonicalize().ok());
        let base = canonical.as_deref().or(parent);
        let mut out = String::new();
        for result in &self.results {
            if result.status == TestcaseStatus::Passed {
                continue;
            }
            let _ = writeln!(
                out,
                "{:5} {} ({})",
                result.status.label(),
                result.id,
                display_path(&result.location, base)
            );
            for entry in &result.unsatisfied {
                let _ = writeln!(
                    out,
                    "      expected {}, found {}",
                    entry.constraint, entry.actual
                );
            }
            for diagnostic in &result.unexpected {
                let _ = writeln!(
                    out,
                    "      unexpected {} {}: {}",
                    diagnostic.severity, diagnostic.identifier, diagnostic.message
                );
            }
            if let Some(error) = &result.error {
                let _ = writeln!(out, "      {error}");
            }
        }
        let _ = writeln!(
            out,
            "{}: {} run, {} passed, {} failed, {} errored",
            self.name, self.total, self.passed, self.failed, self.errored
        );
        out
    }
}
