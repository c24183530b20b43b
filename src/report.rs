//! Test outcomes and run reports.
//!
//! Scenario test functions return [`TestResult`]. The first failed assertion inside a
//! test function ends it with a [`CheckFailure`]; other test functions of the same
//! scenario still run. A [`ScenarioReport`] gathers the outcomes of one run and
//! serializes to JSON for CI consumption.

use crate::config::HarnessOptions;
use crate::error::{AppResult, IntegtestError};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{error, info};

/// Why a test function failed.
#[derive(Debug, Error)]
pub enum CheckFailure {
    /// An assertion over the run's artifacts did not hold.
    #[error("{check} failed: {detail}")]
    Check {
        /// Name of the assertion
        check: String,
        /// What was found instead
        detail: String,
    },

    /// The check could not be carried out at all.
    #[error(transparent)]
    Infrastructure(#[from] IntegtestError),
}

impl CheckFailure {
    /// Assertion failure of `check`.
    pub fn check(check: impl Into<String>, detail: impl fmt::Display) -> Self {
        CheckFailure::Check {
            check: check.into(),
            detail: detail.to_string(),
        }
    }
}

/// Return type of scenario test functions.
pub type TestResult = Result<(), CheckFailure>;

/// Fails with `check` and `detail` unless `condition` holds.
pub fn ensure(condition: bool, check: &str, detail: impl fmt::Display) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(CheckFailure::check(check, detail))
    }
}

/// Identifier of one test function on one configuration, `scenario::test[label]`.
pub fn test_id(scenario: &str, test: &str, label: &str) -> String {
    format!("{}::{}[{}]", scenario, test, label)
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r".*\[(.+)\].*").expect("valid regex"))
}

/// Three-line banner framing the label of `test_id` (or the whole id if it carries
/// no `[label]`) between rows of `=`.
pub fn banner(test_id: &str) -> String {
    let title = label_pattern()
        .captures(test_id)
        .and_then(|captures| captures.get(1))
        .map(|label| label.as_str())
        .unwrap_or(test_id);
    let rule = "=".repeat(title.chars().count());
    format!("{}\n{}\n{}", rule, title, rule)
}

/// Outcome of one test function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    /// Test function name.
    pub name: String,
    /// `scenario::test[label]`
    pub test_id: String,
    /// The test function returned `Ok`.
    pub passed: bool,
    /// Failure message of a failed test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TestOutcome {
    /// Runs `test` and records its outcome.
    pub fn run<F>(name: &str, test_id: String, test: F) -> Self
    where
        F: FnOnce() -> TestResult,
    {
        match test() {
            Ok(()) => {
                info!("PASSED {}", test_id);
                Self {
                    name: name.to_string(),
                    test_id,
                    passed: true,
                    failure: None,
                }
            }
            Err(failure) => {
                error!("FAILED {}: {}", test_id, failure);
                Self {
                    name: name.to_string(),
                    test_id,
                    passed: false,
                    failure: Some(failure.to_string()),
                }
            }
        }
    }
}

/// Everything known about one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: String,
    /// Configuration label.
    pub label: String,
    /// Options the run was made with.
    pub options: HarnessOptions,
    /// Run directory.
    pub run_dir: PathBuf,
    /// Exit code of the run-control tool.
    pub returncode: i32,
    /// Number of log files found.
    pub log_files: usize,
    /// Number of data files found.
    pub data_files: usize,
    /// Test outcomes in execution order.
    pub outcomes: Vec<TestOutcome>,
}

impl ScenarioReport {
    /// Every test function passed.
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.passed)
    }

    /// Number of failed test functions.
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.passed).count()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes [`ScenarioReport::to_json`] to `path`.
    pub fn write_json(&self, path: &Path) -> AppResult<()> {
        std::fs::write(path, self.to_json()?).map_err(|e| IntegtestError::path_io(path, e))
    }

    /// One line per test function plus a total.
    pub fn log_summary(&self) {
        for outcome in &self.outcomes {
            match &outcome.failure {
                None => info!("  ok    {}", outcome.test_id),
                Some(failure) => error!("  FAIL  {}: {}", outcome.test_id, failure),
            }
        }
        info!(
            "{}[{}]: {} passed, {} failed",
            self.scenario,
            self.label,
            self.outcomes.len() - self.failed_count(),
            self.failed_count()
        );
    }
}
