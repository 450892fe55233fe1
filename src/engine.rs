//! Processing engine seam and the subprocess-backed engine.
//!
//! An engine executes one test case and reports its diagnostics. Faults are
//! returned as errors so the scheduler can record the test case as errored
//! without touching its siblings.
use crate::config::OptionValue;
use crate::levels::ErrorLevel;
use crate::suite::TestcaseDescriptor;
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Environment variable carrying the test case id into engine subprocesses.
pub const TESTCASE_ID_ENV: &str = "CONFORMANCE_TESTCASE_ID";

const MAX_STDERR_EXCERPT_BYTES: usize = 2048;

/// One severity-tagged message emitted while processing a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: ErrorLevel,
    pub identifier: String,
    #[serde(default)]
    pub message: String,
}

/// Everything an engine needs to execute one test case.
#[derive(Debug, Serialize)]
pub struct EngineRequest<'a> {
    pub testcase: &'a TestcaseDescriptor,
    pub disclosure_system: Option<&'a str>,
    pub plugins: BTreeSet<String>,
    pub compare_formula_output: bool,
    pub custom_compare_patterns: &'a [(String, String)],
    pub options: &'a BTreeMap<String, OptionValue>,
}

/// Executes test cases. Shared across worker threads.
pub trait ProcessingEngine: Send + Sync {
    fn execute(&self, request: &EngineRequest<'_>) -> Result<Vec<Diagnostic>>;
}

/// Runs an external program per test case and reads JSON-lines diagnostics from stdout.
///
/// The program receives the test case location as its last argument and the
/// serialized `EngineRequest` on stdin.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEngine {
    /// Build an engine from a shell-quoted command line, resolving the program on `PATH`.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut words = shell_words::split(command_line)
            .with_context(|| format!("parse engine command {command_line:?}"))?;
        if words.is_empty() {
            return Err(anyhow!("engine command is empty"));
        }
        let program = words.remove(0);
        let program = which::which(&program)
            .with_context(|| format!("locate engine program {program:?}"))?;
        Ok(CommandEngine {
            program,
            args: words,
        })
    }
}

impl ProcessingEngine for CommandEngine {
    fn execute(&self, request: &EngineRequest<'_>) -> Result<Vec<Diagnostic>> {
        let payload = serde_json::to_vec(request).context("serialize engine request")?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&request.testcase.location)
            .env(TESTCASE_ID_ENV, &request.testcase.id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn engine {}", self.program.display()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // Engines that never read stdin may exit before the request is written.
            if let Err(err) = stdin.write_all(&payload) {
                if err.kind() != ErrorKind::BrokenPipe {
                    return Err(err).context("write engine request");
                }
            }
        }

        let output = child.wait_with_output().context("wait for engine")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "engine exited with {}: {}",
                output.status,
                truncate_string(stderr.trim(), MAX_STDERR_EXCERPT_BYTES)
            ));
        }
        parse_diagnostics(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse JSON-lines diagnostics, skipping blank lines.
pub fn parse_diagnostics(text: &str) -> Result<Vec<Diagnostic>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse diagnostic on engine output line {}", index + 1))
        })
        .collect()
}
