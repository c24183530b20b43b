//! TP-stream writing with software trigger-primitive generation.
//!
//! Two readout applications, two dataflow applications, a 1 Hz pulser and two 30 s
//! runs. Besides the trigger-record files, each run writes one `tpstream_*.hdf5` file
//! at 1 Hz.

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
use crate::log_checks::IgnoredProblems;
use crate::report::{CheckFailure, TestResult};
use crate::script::CommandScript;

/// Data producers per readout application.
pub const NUMBER_OF_DATA_PRODUCERS: usize = 2;
/// Readout applications.
pub const NUMBER_OF_READOUT_APPS: usize = 2;
/// Dataflow applications; records alternate between them.
pub const NUMBER_OF_DATAFLOW_APPS: usize = 2;
/// Pulser trigger rate.
pub const PULSER_TRIGGER_RATE_HZ: f64 = 1.0;
/// Seconds per run.
pub const RUN_DURATION_SECS: u64 = 30;
/// One TP-stream file per run.
pub const EXPECTED_TPSTREAM_FILES: usize = 2;

/// Only configuration of the scenario.
pub const LABEL: &str = "Software_TPG_System";
/// Partition name, passed to the run-control tool as the session.
pub const SESSION: &str = "integtest-partition";

/// Name of the trigger-record test function.
pub const DATA_FILES_TEST: &str = "test_data_files";
/// Name of the TP-stream test function.
pub const TPSTREAM_FILES_TEST: &str = "test_tpstream_files";

const SOFTWARE_TPG_FLAG: &str = "--enable-software-tpg";

/// TP-stream writing scenario.
pub struct TpstreamWriting;

/// What the trigger-record files of one run must look like.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFileExpectation {
    /// Expected records per file.
    pub event_count: f64,
    /// Allowed deviation from `event_count`.
    pub tolerance: f64,
    /// Acceptable numbers of data files.
    pub file_counts: Vec<usize>,
    /// Fragment populations every record must show.
    pub fragments: Vec<FragmentCheckSpec>,
}

fn readout_links() -> usize {
    NUMBER_OF_DATA_PRODUCERS * NUMBER_OF_READOUT_APPS
}

impl DataFileExpectation {
    /// Expectations derived from the generator arguments of the run.
    pub fn for_arguments(confgen_arguments: &[String]) -> Self {
        let duration = RUN_DURATION_SECS as f64;
        let dataflow_apps = NUMBER_OF_DATAFLOW_APPS as f64;
        let links = readout_links() as f64;

        let mut event_count = duration * PULSER_TRIGGER_RATE_HZ / dataflow_apps;
        let mut tolerance = event_count / 10.0;
        let high_files = 2 * NUMBER_OF_DATAFLOW_APPS;
        let mut low_files = high_files;
        let fragments;

        if confgen_arguments.iter().any(|arg| arg == SOFTWARE_TPG_FLAG) {
            // TP-triggered records on top of the pulser.
            event_count += 270.0 * links * duration / (100.0 * dataflow_apps);
            tolerance += 10.0 * links * duration / (100.0 * dataflow_apps);
            fragments = vec![
                FragmentCheckSpec::new("WIB", "TPC", "APA", readout_links(), 80, 37200),
                FragmentCheckSpec::new("Trigger with TPs", "Trigger", "Region", 3, 80, 16000),
            ];
        } else {
            low_files = high_files.saturating_sub(NUMBER_OF_DATAFLOW_APPS).max(1);
            fragments = vec![
                FragmentCheckSpec::new("WIB", "TPC", "APA", readout_links(), 37200, 37200),
                FragmentCheckSpec::new("Trigger Candidate", "Trigger", "Region", 1, 130, 150),
            ];
        }

        let mut file_counts = vec![high_files];
        if low_files != high_files {
            file_counts.push(low_files);
        }

        Self {
            event_count,
            tolerance,
            file_counts,
            fragments,
        }
    }
}

/// File count, sanity, record count, attributes and fragments.
pub fn check_data_files(files: &[DataFile], expectation: &DataFileExpectation) -> TestResult {
    ensure_file_count(files.len(), &expectation.file_counts, "data file count")?;
    for file in files {
        ensure_check(sanity_check(file), "sanity check", file)?;
        ensure_check(check_file_attributes(file), "attribute check", file)?;
        ensure_check(
            check_event_count(file, expectation.event_count, expectation.tolerance),
            "event count",
            file,
        )?;
        for spec in &expectation.fragments {
            ensure_check(check_fragment_count(file, spec), "fragment count", file)?;
            ensure_check(check_fragment_sizes(file, spec), "fragment size", file)?;
        }
    }
    Ok(())
}

/// TP-set fragment expectation for stream files.
pub fn tpset_fragment_spec() -> FragmentCheckSpec {
    FragmentCheckSpec::new("TP Stream", "TPC", "APA", readout_links(), 80, 2_800_000)
}

/// Stream files carry no record headers, so there is no sanity check.
pub fn check_tpstream_files(files: &[DataFile]) -> TestResult {
    ensure_file_count(files.len(), &[EXPECTED_TPSTREAM_FILES], "TP-stream file count")?;

    // The stream writer records at 1 Hz.
    let expected = RUN_DURATION_SECS as f64;
    let tolerance = expected / 10.0;
    let spec = tpset_fragment_spec();
    for file in files {
        ensure_check(check_file_attributes(file), "attribute check", file)?;
        ensure_check(check_event_count(file, expected, tolerance), "event count", file)?;
        ensure_check(check_fragment_count(file, &spec), "fragment count", file)?;
        ensure_check(check_fragment_sizes(file, &spec), "fragment size", file)?;
    }
    Ok(())
}

impl Scenario for TpstreamWriting {
    fn name(&self) -> &'static str {
        "tpstream_writing"
    }

    fn description(&self) -> &'static str {
        "Software TPG with TP-set stream writing across two dataflow applications"
    }

    fn confgen_module(&self) -> Option<&'static str> {
        Some("daqconf_multiru_gen")
    }

    fn labels(&self) -> Vec<&'static str> {
        vec![LABEL]
    }

    fn run_config(&self, label: &str, _options: &HarnessOptions) -> AppResult<RunConfig> {
        if label != LABEL {
            return Err(unknown_label(self, label));
        }
        let producers = NUMBER_OF_DATA_PRODUCERS.to_string();
        let rate = format!("{:.1}", PULSER_TRIGGER_RATE_HZ);
        let mut config = RunConfig::new("integtest", DEFAULT_CONFIG_DB, SESSION)
            .with_extra_args(["-d", "./frames.bin", "-o", ".", "-s", "10", "-n"])
            .with_extra_args([producers.as_str(), "-b", "1000", "-a", "1000", "-t"])
            .with_extra_args([rate.as_str(), "--latency-buffer-size", "200000"]);
        for _ in 0..NUMBER_OF_READOUT_APPS {
            config = config.with_extra_args(["--host-ru", "localhost"]);
        }
        for _ in 0..NUMBER_OF_DATAFLOW_APPS {
            config = config.with_extra_args(["--host-df", "localhost"]);
        }
        for region in 0..NUMBER_OF_READOUT_APPS {
            config = config.with_extra_args(["--region-id".to_string(), region.to_string()]);
        }
        let candidates = (3 * readout_links()).to_string();
        Ok(config.with_extra_args([
            SOFTWARE_TPG_FLAG,
            "--enable-tpset-writing",
            "-c",
            candidates.as_str(),
        ]))
    }

    fn command_script(&self) -> CommandScript {
        CommandScript::new()
            .commands("boot conf")
            .commands("start_run --wait 2 101")
            .wait(RUN_DURATION_SECS)
            .commands("stop_run")
            .wait(2)
            .commands("start_run 102")
            .wait(RUN_DURATION_SECS)
            .commands("stop_run --wait 2")
            .wait(2)
            .commands("scrap terminate")
    }

    fn ignored_problems(&self) -> AppResult<IgnoredProblems> {
        IgnoredProblems::new().with("dqm", &["client will not be able to connect to Kafka cluster"])
    }

    fn tests(&self) -> Vec<&'static str> {
        vec![
            RUN_CONTROL_TEST,
            LOG_FILES_TEST,
            DATA_FILES_TEST,
            TPSTREAM_FILES_TEST,
        ]
    }

    fn run_test(&self, test: &str, result: &RunResult, options: &HarnessOptions) -> TestResult {
        match test {
            RUN_CONTROL_TEST => test_run_control_success(result),
            LOG_FILES_TEST if self.check_log_errors(options) => {
                test_logs_error_free(result, &self.ignored_problems()?)
            }
            LOG_FILES_TEST => Ok(()),
            DATA_FILES_TEST => {
                let files = open_data_files(&result.data_files)?;
                check_data_files(
                    &files,
                    &DataFileExpectation::for_arguments(&result.confgen_arguments),
                )
            }
            TPSTREAM_FILES_TEST => {
                let files = open_data_files(&result.tpstream_files()?)?;
                check_tpstream_files(&files)
            }
            other => Err(CheckFailure::check(
                other,
                "no such test in scenario 'tpstream_writing'",
            )),
        }
    }
}
