//! Scenario test functions run against prepared run directories.

use daq_integtest::harness::{collect_data_files, collect_log_files, RunResult};
use daq_integtest::scenario::{self, Scenario, LOG_FILES_TEST, RUN_CONTROL_TEST};
use daq_integtest::HarnessOptions;
use std::path::Path;
use tempfile::tempdir;

fn result_for(scenario: &str, label: &str, session: &str, run_dir: &Path, returncode: i32) -> RunResult {
    RunResult {
        scenario: scenario.to_string(),
        label: label.to_string(),
        session: session.to_string(),
        returncode,
        run_dir: run_dir.to_path_buf(),
        log_files: collect_log_files(run_dir).unwrap(),
        data_files: collect_data_files(run_dir).unwrap(),
        confgen_arguments: Vec::new(),
    }
}

#[test]
fn dfo_log_test_requires_dataflow_logs() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("log_dfo-test_dfo_3333.txt"), "INFO dfo ready\n").unwrap();
    let dfo = scenario::find("dfo").unwrap();
    let options = HarnessOptions::default();

    let result = result_for("dfo", "DFO Test", "dfo-test", dir.path(), 0);
    let err = dfo.run_test(LOG_FILES_TEST, &result, &options).unwrap_err();
    assert!(err.to_string().contains("dfo-test_df-01"), "{err}");

    std::fs::write(dir.path().join("log_dfo-test_df-01_3340.txt"), "INFO writing\n").unwrap();
    let result = result_for("dfo", "DFO Test", "dfo-test", dir.path(), 0);
    assert!(dfo.run_test(LOG_FILES_TEST, &result, &options).is_ok());
}

#[test]
fn run_control_test_checks_exit_code() {
    let dir = tempdir().unwrap();
    let scenario = scenario::find("fake_data_producer").unwrap();
    let options = HarnessOptions::default();

    let ok = result_for("fake_data_producer", "Baseline_Window_Size", "s", dir.path(), 0);
    assert!(scenario.run_test(RUN_CONTROL_TEST, &ok, &options).is_ok());

    let failed = result_for("fake_data_producer", "Baseline_Window_Size", "s", dir.path(), 1);
    let err = scenario.run_test(RUN_CONTROL_TEST, &failed, &options).unwrap_err();
    assert!(err.to_string().contains("exit code 1"), "{err}");
}

#[test]
fn dqm_turns_off_the_six_process_log_scan() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("log_six_dqm0_3350.txt"),
        "ERROR monitoring backend unreachable\n",
    )
    .unwrap();
    let scenario = scenario::find("six_process_stop_start").unwrap();
    let result = result_for("six_process_stop_start", "default", "six", dir.path(), 0);

    let plain = HarnessOptions::default();
    assert!(scenario.run_test(LOG_FILES_TEST, &result, &plain).is_err());

    let dqm = HarnessOptions {
        enable_software_tpg: false,
        enable_dqm: true,
    };
    assert!(scenario.run_test(LOG_FILES_TEST, &result, &dqm).is_ok());
}

#[test]
fn verify_runs_every_test_function() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("log_dfo-test_dfo_1.txt"), "INFO\n").unwrap();
    std::fs::write(dir.path().join("log_dfo-test_df-01_2.txt"), "INFO\n").unwrap();
    let dfo = scenario::find("dfo").unwrap();
    let result = result_for("dfo", "DFO Test", "dfo-test", dir.path(), 0);

    let outcomes = dfo.verify(&result, &HarnessOptions::default());
    let ids: Vec<&str> = outcomes.iter().map(|o| o.test_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "dfo::test_nanorc_success[DFO Test]",
            "dfo::test_log_files[DFO Test]"
        ]
    );
    assert!(outcomes.iter().all(|o| o.passed));
}

#[cfg(not(feature = "storage_hdf5"))]
#[test]
fn data_test_without_hdf5_support_fails_cleanly() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("swtest_run000101_0000_dataflow0_datawriter_0_20220211T101112.hdf5"),
        b"",
    )
    .unwrap();
    let scenario = scenario::find("six_process_stop_start").unwrap();
    let result = result_for("six_process_stop_start", "default", "six", dir.path(), 0);

    let err = scenario
        .run_test("test_data_file", &result, &HarnessOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("storage_hdf5"), "{err}");
}

#[test]
fn unknown_test_name_is_a_failure() {
    let dir = tempdir().unwrap();
    let result = result_for("dfo", "DFO Test", "dfo-test", dir.path(), 0);
    for scenario in scenario::all() {
        assert!(scenario
            .run_test("test_does_not_exist", &result, &HarnessOptions::default())
            .is_err());
    }
}
