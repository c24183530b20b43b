//! Fake-data-producer readout with two readout-window sizes.
//!
//! Three 20 s runs; the first warms up the DAQ processes. Every data file must hold
//! 20 ± 2 trigger records, each with two WIB fragments whose size scales with the
//! readout window.

use super::{
    ensure_check, ensure_file_count, open_data_files, test_logs_error_free,
    test_run_control_success, unknown_label, RunConfig, Scenario, DEFAULT_CONFIG_DB,
    LOG_FILES_TEST, RUN_CONTROL_TEST,
};
use crate::config::HarnessOptions;
use crate::data_file::{
    check_event_count, check_file_attributes, check_fragment_count, check_fragment_sizes,
    sanity_check, DataFile, FragmentCheckSpec,
};
use crate::error::AppResult;
use crate::harness::RunResult;
use crate::report::{CheckFailure, TestResult};
use crate::script::CommandScript;

/// Seconds per run.
pub const RUN_DURATION_SECS: u64 = 20;
/// Fragment size with the baseline readout window.
pub const BASELINE_FRAGMENT_SIZE_BYTES: u64 = 37200;
/// Fragment size with the doubled readout window.
pub const DOUBLE_WINDOW_FRAGMENT_SIZE_BYTES: u64 = 74320;
/// One data file per run.
pub const EXPECTED_DATA_FILES: usize = 3;
/// Allowed deviation from the expected record count.
pub const EVENT_COUNT_TOLERANCE: f64 = 2.0;

/// Configuration with the default readout window.
pub const BASELINE_WINDOW: &str = "Baseline_Window_Size";
/// Configuration with a doubled readout window.
pub const DOUBLE_WINDOW: &str = "Double_Window_Size";

/// Name of the data-file test function.
pub const DATA_FILE_TEST: &str = "test_data_file";

const BASE_ARGS: [&str; 7] = [
    "-o",
    ".",
    "-n",
    "2",
    "--host-ru",
    "localhost",
    "--use-fake-data-producers",
];

/// Fake-data-producer scenario.
pub struct FakeDataProducer;

/// WIB fragment expectation for the given generator arguments.
pub fn wib_fragment_spec(confgen_arguments: &[String]) -> FragmentCheckSpec {
    let spec = FragmentCheckSpec::new("WIB", "TPC", "APA", 2, 0, 0);
    if confgen_arguments.iter().any(|arg| arg == "2000") {
        spec.with_exact_size(DOUBLE_WINDOW_FRAGMENT_SIZE_BYTES)
    } else {
        spec.with_exact_size(BASELINE_FRAGMENT_SIZE_BYTES)
    }
}

/// Checks over the trigger-record files of one run.
pub fn check_data_files(files: &[DataFile], confgen_arguments: &[String]) -> TestResult {
    ensure_file_count(files.len(), &[EXPECTED_DATA_FILES], "data file count")?;

    let fragments = [wib_fragment_spec(confgen_arguments)];
    for file in files {
        ensure_check(sanity_check(file), "sanity check", file)?;
        ensure_check(check_file_attributes(file), "attribute check", file)?;
        ensure_check(
            check_event_count(file, RUN_DURATION_SECS as f64, EVENT_COUNT_TOLERANCE),
            "event count",
            file,
        )?;
        for spec in &fragments {
            ensure_check(check_fragment_count(file, spec), "fragment count", file)?;
            ensure_check(check_fragment_sizes(file, spec), "fragment size", file)?;
        }
    }
    Ok(())
}

impl Scenario for FakeDataProducer {
    fn name(&self) -> &'static str {
        "fake_data_producer"
    }

    fn description(&self) -> &'static str {
        "Fake data producers with baseline and doubled readout windows"
    }

    fn confgen_module(&self) -> Option<&'static str> {
        Some("daqconf_multiru_gen")
    }

    fn labels(&self) -> Vec<&'static str> {
        vec![BASELINE_WINDOW, DOUBLE_WINDOW]
    }

    fn run_config(&self, label: &str, _options: &HarnessOptions) -> AppResult<RunConfig> {
        let window = match label {
            BASELINE_WINDOW => "1000",
            DOUBLE_WINDOW => "2000",
            _ => return Err(unknown_label(self, label)),
        };
        Ok(RunConfig::new("integtest", DEFAULT_CONFIG_DB, self.name())
            .with_extra_args(BASE_ARGS)
            .with_extra_args(["-b", window, "-a", window]))
    }

    fn command_script(&self) -> CommandScript {
        CommandScript::new()
            .commands("boot init conf")
            .commands("start 101")
            .wait(RUN_DURATION_SECS)
            .commands("stop --stop-wait 2")
            .wait(2)
            .commands("start --resume-wait 1 102")
            .wait(RUN_DURATION_SECS)
            .commands("stop")
            .wait(2)
            .commands("start --resume-wait 2 103")
            .wait(RUN_DURATION_SECS)
            .commands("stop --stop-wait 1")
            .wait(2)
            .commands("scrap terminate")
    }

    fn tests(&self) -> Vec<&'static str> {
        vec![RUN_CONTROL_TEST, LOG_FILES_TEST, DATA_FILE_TEST]
    }

    fn run_test(&self, test: &str, result: &RunResult, options: &HarnessOptions) -> TestResult {
        match test {
            RUN_CONTROL_TEST => test_run_control_success(result),
            LOG_FILES_TEST if self.check_log_errors(options) => {
                test_logs_error_free(result, &self.ignored_problems()?)
            }
            LOG_FILES_TEST => Ok(()),
            DATA_FILE_TEST => {
                let files = open_data_files(&result.data_files)?;
                check_data_files(&files, &result.confgen_arguments)
            }
            other => Err(CheckFailure::check(
                other,
                "no such test in scenario 'fake_data_producer'",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_size_selects_fragment_size() {
        let options = HarnessOptions::default();
        let baseline = FakeDataProducer.run_config(BASELINE_WINDOW, &options).unwrap();
        let double = FakeDataProducer.run_config(DOUBLE_WINDOW, &options).unwrap();

        assert_eq!(wib_fragment_spec(&baseline.extra_args).min_size_bytes, 37200);
        assert_eq!(wib_fragment_spec(&double.extra_args).max_size_bytes, 74320);
        // The baseline expectation is not affected by an earlier doubled run.
        assert_eq!(wib_fragment_spec(&baseline.extra_args).max_size_bytes, 37200);
    }

    #[test]
    fn script_has_three_runs() {
        let script = FakeDataProducer.command_script();
        assert_eq!(script.run_count(), 3);
        assert_eq!(script.total_wait().as_secs(), 3 * (20 + 2));
    }
}
