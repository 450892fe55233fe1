//! Shared test infrastructure for integration tests.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

pub const SAMPLE_INDEX: &str = "tests/resources/test_suite/index.json";
pub const CONFIG_ALL: &str = "tests/resources/configs/test_config_all.json";

pub fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// Check if an engine program is available; skip test if not.
pub fn skip_if_binary_missing(binary: &str) -> bool {
    let missing = Command::new(binary)
        .arg("/dev/null")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_err();
    if missing {
        eprintln!("Skipping: {binary} not available");
    }
    missing
}

/// Result of one `confrun` invocation.
#[derive(Debug)]
pub struct RunOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for RunOutput {
    fn from(output: Output) -> Self {
        RunOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs `confrun` from the package root with a private log directory.
pub struct RunFixture {
    temp_dir: TempDir,
}

impl RunFixture {
    pub fn new() -> Self {
        RunFixture {
            temp_dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn log_dir(&self, label: &str) -> PathBuf {
        self.temp_dir.path().join(label)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn run<I, S>(&self, args: I) -> RunOutput
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::new(env!("CARGO_BIN_EXE_confrun"))
            .args(args)
            .current_dir(manifest_dir())
            .env_remove("RUST_LOG")
            .output()
            .expect("spawn confrun")
            .into()
    }

    /// Parse the persisted report for run `name` under `label`'s log directory.
    pub fn read_report(&self, label: &str, name: &str) -> serde_json::Value {
        let path = self.log_dir(label).join(format!("{name}.json"));
        let text = fs::read_to_string(&path)
            .unwrap_or_else(|err| panic!("read {}: {err}", path.display()));
        serde_json::from_str(&text).expect("parse report JSON")
    }
}
