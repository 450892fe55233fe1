//! Test suite index loading.
//!
//! The scheduler only depends on `SuiteLoader`; `JsonIndexLoader` reads the
//! JSON index format shipped with this tool.
use crate::config::parse_constraint;
use crate::constraint::Constraint;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// One test case as enumerated by the suite index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestcaseDescriptor {
    pub id: String,
    pub location: PathBuf,
    pub attributes: BTreeMap<String, String>,
    /// Constraints declared by the suite itself.
    pub expected: Vec<Constraint>,
}

/// Enumerates test cases, in index order, from an index location.
pub trait SuiteLoader {
    fn load(&self, index_file: &Path) -> Result<Vec<TestcaseDescriptor>>;
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexDocument {
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
    #[serde(default)]
    include: Vec<PathBuf>,
    #[serde(default)]
    testcases: Vec<IndexEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexEntry {
    id: String,
    location: PathBuf,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    expected: Vec<serde_json::Value>,
}

/// Loads JSON index documents, expanding nested `include` indexes in order.
#[derive(Debug, Default)]
pub struct JsonIndexLoader;

impl SuiteLoader for JsonIndexLoader {
    fn load(&self, index_file: &Path) -> Result<Vec<TestcaseDescriptor>> {
        let mut testcases = Vec::new();
        let mut stack = Vec::new();
        load_index(index_file, &mut stack, &mut testcases)?;

        let mut seen = BTreeSet::new();
        for testcase in &testcases {
            if !seen.insert(testcase.id.as_str()) {
                return Err(anyhow!("duplicate test case id {:?}", testcase.id));
            }
        }
        Ok(testcases)
    }
}

fn load_index(
    index_file: &Path,
    stack: &mut Vec<PathBuf>,
    testcases: &mut Vec<TestcaseDescriptor>,
) -> Result<()> {
    let canonical = index_file
        .canonicalize()
        .with_context(|| format!("resolve index {}", index_file.display()))?;
    if stack.contains(&canonical) {
        return Err(anyhow!("index include cycle at {}", index_file.display()));
    }
    let bytes =
        fs::read(&canonical).with_context(|| format!("read index {}", index_file.display()))?;
    let document: IndexDocument = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse index {}", index_file.display()))?;
    let base = canonical.parent().unwrap_or(Path::new(".")).to_path_buf();

    stack.push(canonical);
    for include in &document.include {
        load_index(&base.join(include), stack, testcases)?;
    }
    stack.pop();

    for entry in document.testcases {
        let expected = entry
            .expected
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                parse_constraint(&format!("{}.expected[{index}]", entry.id), value)
            })
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("parse index {}", index_file.display()))?;
        testcases.push(TestcaseDescriptor {
            location: base.join(&entry.location),
            id: entry.id,
            attributes: entry.attributes,
            expected,
        });
    }
    Ok(())
}
