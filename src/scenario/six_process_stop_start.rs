//! Six-process system cycled through start/resume/pause/stop four times.
//!
//! Five data producers on each of three readout hosts; every trigger record carries
//! one link per producer. This is the only scenario that honours
//! [`HarnessOptions`]: software TPG doubles the links and admits TP fragments down to
//! 80 bytes, DQM adds the monitoring applications and turns off the log scan.

use super::{
    ensure_check, ensure_file_count, open_data_files, test_logs_error_free,
    test_run_control_success, unknown_label, RunConfig, Scenario, DEFAULT_CONFIG_DB,
    DEFAULT_LABEL, LOG_FILES_TEST, RUN_CONTROL_TEST,
};
use crate::config::HarnessOptions;
use crate::data_file::{check_all_fragment_sizes, check_link_presence, sanity_check, DataFile};
use crate::error::AppResult;
use crate::harness::RunResult;
use crate::report::{CheckFailure, TestResult};
use crate::script::CommandScript;
use tracing::{info, warn};

/// Data producers per readout host.
pub const NUMBER_OF_DATA_PRODUCERS: usize = 5;
/// Readout hosts, all on localhost.
pub const NUMBER_OF_READOUT_HOSTS: usize = 3;
/// WIB fragment size.
pub const FRAGMENT_SIZE_BYTES: u64 = 37200;
/// Smallest trigger-primitive fragment with software TPG.
pub const TPG_MIN_FRAGMENT_SIZE_BYTES: u64 = 80;
/// One data file per run.
pub const EXPECTED_DATA_FILES: usize = 4;
/// Run numbers in script order.
pub const RUN_NUMBERS: [u32; 4] = [101, 102, 103, 104];

/// Name of the data-file test function.
pub const DATA_FILE_TEST: &str = "test_data_file";

/// Six-process stop/start scenario.
pub struct SixProcessStopStart;

/// Link and size expectations per trigger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkExpectation {
    /// Links per trigger record.
    pub links: usize,
    /// Smallest accepted fragment.
    pub min_size_bytes: u64,
    /// Largest accepted fragment.
    pub max_size_bytes: u64,
}

impl LinkExpectation {
    /// Expectation for a run made with `options`.
    pub fn for_options(options: &HarnessOptions) -> Self {
        let links = NUMBER_OF_DATA_PRODUCERS * NUMBER_OF_READOUT_HOSTS;
        if options.enable_software_tpg {
            Self {
                links: links * 2,
                min_size_bytes: TPG_MIN_FRAGMENT_SIZE_BYTES,
                max_size_bytes: FRAGMENT_SIZE_BYTES,
            }
        } else {
            Self {
                links,
                min_size_bytes: FRAGMENT_SIZE_BYTES,
                max_size_bytes: FRAGMENT_SIZE_BYTES,
            }
        }
    }
}

/// File count, sanity, link presence and fragment sizes.
pub fn check_data_files(files: &[DataFile], expectation: LinkExpectation) -> TestResult {
    ensure_file_count(files.len(), &[EXPECTED_DATA_FILES], "data file count")?;
    for file in files {
        ensure_check(sanity_check(file), "sanity check", file)?;
        ensure_check(
            check_link_presence(file, expectation.links),
            "link presence",
            file,
        )?;
        ensure_check(
            check_all_fragment_sizes(file, expectation.min_size_bytes, expectation.max_size_bytes),
            "fragment size",
            file,
        )?;
    }
    Ok(())
}

impl Scenario for SixProcessStopStart {
    fn name(&self) -> &'static str {
        "six_process_stop_start"
    }

    fn description(&self) -> &'static str {
        "Three readout hosts with five producers each, four start/pause/stop cycles"
    }

    fn confgen_module(&self) -> Option<&'static str> {
        Some("minidaqapp.nanorc.mdapp_multiru_gen")
    }

    fn labels(&self) -> Vec<&'static str> {
        vec![DEFAULT_LABEL]
    }

    fn run_config(&self, label: &str, options: &HarnessOptions) -> AppResult<RunConfig> {
        if label != DEFAULT_LABEL {
            return Err(unknown_label(self, label));
        }
        let producers = NUMBER_OF_DATA_PRODUCERS.to_string();
        let mut config = RunConfig::new("integtest", DEFAULT_CONFIG_DB, self.name())
            .with_extra_args(["-d", "./frames.bin", "-o", ".", "-s", "10", "-n"])
            .with_extra_args([producers.as_str(), "-b", "1000", "-a", "1000"]);
        for _ in 0..NUMBER_OF_READOUT_HOSTS {
            config = config.with_extra_args(["--host-ru", "localhost"]);
        }
        if options.enable_software_tpg {
            info!("*** Software TPG is enabled ***");
            config = config.with_flag("--enable-software-tpg");
        }
        if options.enable_dqm {
            info!("*** DQM is enabled ***");
            config = config.with_flag("--enable-dqm");
        }
        Ok(config)
    }

    fn command_script(&self) -> CommandScript {
        RUN_NUMBERS.iter().fold(
            CommandScript::new().commands("boot init conf"),
            |script, run| {
                script
                    .commands(&format!("start {} resume", run))
                    .wait(20)
                    .commands("pause")
                    .wait(2)
                    .commands("stop")
                    .wait(2)
            },
        )
        .commands("scrap terminate")
    }

    fn check_log_errors(&self, options: &HarnessOptions) -> bool {
        if options.enable_dqm {
            warn!("DQM is enabled; skipping the log file error check");
            false
        } else {
            true
        }
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
                check_data_files(&files, LinkExpectation::for_options(options))
            }
            other => Err(CheckFailure::check(
                other,
                "no such test in scenario 'six_process_stop_start'",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_tpg_doubles_links() {
        let plain = LinkExpectation::for_options(&HarnessOptions::default());
        assert_eq!(plain.links, 15);
        assert_eq!((plain.min_size_bytes, plain.max_size_bytes), (37200, 37200));

        let tpg = LinkExpectation::for_options(&HarnessOptions {
            enable_software_tpg: true,
            enable_dqm: false,
        });
        assert_eq!(tpg.links, 30);
        assert_eq!(tpg.min_size_bytes, 80);
    }

    #[test]
    fn options_extend_generator_arguments() {
        let options = HarnessOptions {
            enable_software_tpg: true,
            enable_dqm: true,
        };
        let config = SixProcessStopStart.run_config(DEFAULT_LABEL, &options).unwrap();
        let args = &config.extra_args;
        assert_eq!(args.iter().filter(|a| *a == "--host-ru").count(), 3);
        assert_eq!(&args[args.len() - 2..], ["--enable-software-tpg", "--enable-dqm"]);
        assert!(!SixProcessStopStart.check_log_errors(&options));
    }

    #[test]
    fn script_cycles_four_runs() {
        let script = SixProcessStopStart.command_script();
        assert_eq!(script.run_count(), 4);
        assert_eq!(script.total_wait().as_secs(), 4 * 24);
    }
}
