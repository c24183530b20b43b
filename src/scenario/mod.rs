//! Declared integration-test scenarios.
//!
//! A scenario is pure data plus assertions: the [`RunConfig`] for each of its labels,
//! the [`CommandScript`] replayed against the run-control tool, the log problems it
//! tolerates, and the test functions run against the resulting [`RunResult`].
//!
//! | scenario                 | generator                            | labels                                      |
//! |--------------------------|--------------------------------------|---------------------------------------------|
//! | `dfo`                    | none (prepared database)             | `DFO Test`                                  |
//! | `fake_data_producer`     | `daqconf_multiru_gen`                | `Baseline_Window_Size`, `Double_Window_Size` |
//! | `six_process_stop_start` | `minidaqapp.nanorc.mdapp_multiru_gen` | `default`                                   |
//! | `tpstream_writing`       | `daqconf_multiru_gen`                | `Software_TPG_System`                       |

pub mod dfo;
pub mod fake_data_producer;
pub mod six_process_stop_start;
pub mod tpstream_writing;

use crate::config::HarnessOptions;
use crate::data_file::DataFile;
use crate::error::{AppResult, IntegtestError};
use crate::harness::RunResult;
use crate::log_checks::{logs_are_error_free, IgnoredProblems};
use crate::report::{banner, ensure, test_id, CheckFailure, TestOutcome, TestResult};
use crate::script::CommandScript;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Label of scenarios that declare a single configuration.
pub const DEFAULT_LABEL: &str = "default";

/// Generator output directory inside the run directory.
pub const DEFAULT_CONFIG_DB: &str = "json";

/// Name of the test function asserting the run-control exit code.
pub const RUN_CONTROL_TEST: &str = "test_nanorc_success";

/// Name of the test function scanning the log files.
pub const LOG_FILES_TEST: &str = "test_log_files";

/// How one labelled configuration is run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Operational environment passed to the run-control tool
    pub op_env: String,
    /// Configuration database (generator output directory or prepared file)
    pub config_db: PathBuf,
    /// Session name given to the run-control tool
    pub session: String,
    /// Terminate leftovers from an earlier session before the script
    pub attempt_cleanup: bool,
    /// Configuration-generator arguments
    pub extra_args: Vec<String>,
}

impl RunConfig {
    /// Configuration without cleanup or generator arguments.
    pub fn new(op_env: impl Into<String>, config_db: impl Into<PathBuf>, session: impl Into<String>) -> Self {
        Self {
            op_env: op_env.into(),
            config_db: config_db.into(),
            session: session.into(),
            attempt_cleanup: false,
            extra_args: Vec::new(),
        }
    }

    /// Sets whether leftovers are cleaned up first.
    pub fn with_attempt_cleanup(mut self, attempt_cleanup: bool) -> Self {
        self.attempt_cleanup = attempt_cleanup;
        self
    }

    /// Appends generator arguments.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `argument` unless it is already present.
    pub fn with_flag(mut self, argument: &str) -> Self {
        if !self.extra_args.iter().any(|arg| arg == argument) {
            self.extra_args.push(argument.to_string());
        }
        self
    }
}

/// One declared integration test.
pub trait Scenario {
    /// Registry name, e.g. `six_process_stop_start`.
    fn name(&self) -> &'static str;

    /// One-line summary for listings.
    fn description(&self) -> &'static str;

    /// Python module of the configuration generator, if the scenario generates its
    /// configuration.
    fn confgen_module(&self) -> Option<&'static str> {
        None
    }

    /// Labels of the declared configurations, in declaration order.
    fn labels(&self) -> Vec<&'static str>;

    /// Configuration for `label` under `options`.
    fn run_config(&self, label: &str, options: &HarnessOptions) -> AppResult<RunConfig>;

    /// Commands replayed against the run-control tool.
    fn command_script(&self) -> CommandScript;

    /// Log problems tolerated by [`LOG_FILES_TEST`].
    fn ignored_problems(&self) -> AppResult<IgnoredProblems> {
        Ok(IgnoredProblems::new())
    }

    /// Whether [`LOG_FILES_TEST`] scans for errors and warnings at all.
    fn check_log_errors(&self, options: &HarnessOptions) -> bool {
        let _ = options;
        true
    }

    /// Names of the test functions, in execution order.
    fn tests(&self) -> Vec<&'static str>;

    /// Runs the named test function.
    fn run_test(&self, test: &str, result: &RunResult, options: &HarnessOptions) -> TestResult;

    /// Runs every test function, printing the configuration banner first.
    fn verify(&self, result: &RunResult, options: &HarnessOptions) -> Vec<TestOutcome> {
        for line in banner(&test_id(self.name(), RUN_CONTROL_TEST, &result.label)).lines() {
            info!("{}", line);
        }
        self.tests()
            .into_iter()
            .map(|test| {
                TestOutcome::run(test, test_id(self.name(), test, &result.label), || {
                    self.run_test(test, result, options)
                })
            })
            .collect()
    }
}

/// Every declared scenario.
pub fn all() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(dfo::Dfo),
        Box::new(fake_data_producer::FakeDataProducer),
        Box::new(six_process_stop_start::SixProcessStopStart),
        Box::new(tpstream_writing::TpstreamWriting),
    ]
}

/// Scenario named `name`.
pub fn find(name: &str) -> AppResult<Box<dyn Scenario>> {
    all()
        .into_iter()
        .find(|scenario| scenario.name() == name)
        .ok_or_else(|| IntegtestError::UnknownScenario(name.to_string()))
}

/// Error for a label the scenario does not declare.
pub(crate) fn unknown_label(scenario: &dyn Scenario, label: &str) -> IntegtestError {
    IntegtestError::UnknownLabel {
        scenario: scenario.name().to_string(),
        label: label.to_string(),
    }
}

/// The run-control tool exited with 0.
pub fn test_run_control_success(result: &RunResult) -> TestResult {
    ensure(
        result.succeeded(),
        "run control",
        format!("exit code {}", result.returncode),
    )
}

/// No unsuppressed error or warning in any log file.
pub fn test_logs_error_free(result: &RunResult, ignored: &IgnoredProblems) -> TestResult {
    ensure(
        logs_are_error_free(&result.log_files, true, true, ignored),
        "log file check",
        format!("problems found in the logs of {}", result.run_dir.display()),
    )
}

/// Opens every file, failing on the first unreadable one.
pub fn open_data_files(paths: &[PathBuf]) -> Result<Vec<DataFile>, CheckFailure> {
    paths
        .iter()
        .map(|path| DataFile::open(path).map_err(CheckFailure::from))
        .collect()
}

/// Turns a boolean check result into a [`TestResult`] naming the file.
pub fn ensure_check(passed: bool, check: &str, file: &DataFile) -> TestResult {
    ensure(passed, check, file_label(file.path()))
}

fn file_label(path: &Path) -> String {
    format!("file {}", path.display())
}

/// Data files were produced in one of the `accepted` counts.
pub fn ensure_file_count(found: usize, accepted: &[usize], what: &str) -> TestResult {
    ensure(
        accepted.contains(&found),
        what,
        format!("found {} file(s), expected {:?}", found, accepted),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique_and_findable() {
        let scenarios = all();
        let mut names: Vec<_> = scenarios.iter().map(|s| s.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
        for name in names {
            assert_eq!(find(name).unwrap().name(), name);
        }
        assert!(matches!(find("nope"), Err(IntegtestError::UnknownScenario(_))));
    }

    #[test]
    fn every_declared_script_parses() {
        for scenario in all() {
            let script = scenario.command_script();
            assert!(script.steps().is_ok(), "{}", scenario.name());
            assert!(!scenario.tests().is_empty());
            assert!(scenario.ignored_problems().is_ok());
        }
    }

    #[test]
    fn every_label_has_a_config() {
        let options = HarnessOptions::default();
        for scenario in all() {
            for label in scenario.labels() {
                assert!(scenario.run_config(label, &options).is_ok());
            }
            assert!(matches!(
                scenario.run_config("no-such-label", &options),
                Err(IntegtestError::UnknownLabel { .. })
            ));
        }
    }

    #[test]
    fn with_flag_does_not_duplicate() {
        let config = RunConfig::new("e", "json", "s")
            .with_extra_args(["--enable-software-tpg"])
            .with_flag("--enable-software-tpg")
            .with_flag("--enable-dqm");
        assert_eq!(config.extra_args, vec!["--enable-software-tpg", "--enable-dqm"]);
    }
}
