//! Dataflow-orchestrator test on a prepared configuration database.
//!
//! Three runs of 20 s each, driven with the explicit trigger and dataflow commands.
//! Only the run-control exit code and the log files are checked.

use super::{
    test_logs_error_free, test_run_control_success, unknown_label, RunConfig, Scenario,
    LOG_FILES_TEST, RUN_CONTROL_TEST,
};
use crate::config::HarnessOptions;
use crate::error::AppResult;
use crate::harness::RunResult;
use crate::log_checks::IgnoredProblems;
use crate::report::{ensure, CheckFailure, TestResult};
use crate::script::CommandScript;

/// Only configuration of the scenario.
pub const LABEL: &str = "DFO Test";
/// Run-control session; also part of the log file names.
pub const SESSION: &str = "dfo-test";
/// Seconds with triggers enabled, per run.
pub const RUN_DURATION_SECS: u64 = 20;

/// Dataflow-orchestrator scenario.
pub struct Dfo;

fn run_block(run_number: u32) -> CommandScript {
    CommandScript::new()
        .commands(&format!("start --run-number {}", run_number))
        .wait(1)
        .commands("enable-triggers")
        .wait(RUN_DURATION_SECS)
        .commands("disable-triggers")
        .wait(2)
        .commands("drain-dataflow")
        .wait(2)
        .commands("stop-trigger-sources stop")
        .wait(2)
}

impl Scenario for Dfo {
    fn name(&self) -> &'static str {
        "dfo"
    }

    fn description(&self) -> &'static str {
        "Three 20 s runs through the dataflow orchestrator with explicit trigger control"
    }

    fn labels(&self) -> Vec<&'static str> {
        vec![LABEL]
    }

    fn run_config(&self, label: &str, _options: &HarnessOptions) -> AppResult<RunConfig> {
        if label != LABEL {
            return Err(unknown_label(self, label));
        }
        Ok(
            RunConfig::new("dfotest", "test/config/dfo-test.data.xml", SESSION)
                .with_attempt_cleanup(true),
        )
    }

    fn command_script(&self) -> CommandScript {
        CommandScript::new()
            .commands("boot")
            .wait(5)
            .commands("conf")
            .then(run_block(101))
            .then(run_block(102))
            .then(run_block(103))
            .commands("scrap")
            .wait(5)
            .commands("terminate")
    }

    fn ignored_problems(&self) -> AppResult<IgnoredProblems> {
        IgnoredProblems::from_pairs(&[
            (
                "-controller",
                &[
                    r"Worker with pid \d+ was terminated due to signal",
                    r"Connection '.*' not found on the application registry",
                ],
            ),
            (
                "local-connection-server",
                &[
                    "errorlog: -",
                    r"Worker with pid \d+ was terminated due to signal",
                ],
            ),
            ("log_.*", &["connect: Connection refused"]),
        ])
    }

    fn tests(&self) -> Vec<&'static str> {
        vec![RUN_CONTROL_TEST, LOG_FILES_TEST]
    }

    fn run_test(&self, test: &str, result: &RunResult, options: &HarnessOptions) -> TestResult {
        match test {
            RUN_CONTROL_TEST => test_run_control_success(result),
            LOG_FILES_TEST => {
                for process in ["df-01", "dfo"] {
                    let fragment = format!("{}_{}", result.session, process);
                    ensure(
                        result.has_log_file_containing(&fragment),
                        "expected log files",
                        format!("no log file matching '{}'", fragment),
                    )?;
                }
                if self.check_log_errors(options) {
                    test_logs_error_free(result, &self.ignored_problems()?)?;
                }
                Ok(())
            }
            other => Err(CheckFailure::check(other, "no such test in scenario 'dfo'")),
        }
    }
}
