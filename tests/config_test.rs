//! Configuration loading: file layer, environment overrides and run-variant switches.

use daq_integtest::config::{ExecutionMode, HarnessConfig, HarnessOptions, DQM_ENV, SWTPG_ENV};
use serial_test::serial;
use std::path::PathBuf;
use tempfile::tempdir;

fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("integtest.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    let config = HarnessConfig::load_from("/nonexistent/integtest.toml").unwrap();
    assert_eq!(config.tools.run_control, "nanorc");
    assert_eq!(config.tools.run_control_args, vec!["{config}", "{session}"]);
    assert_eq!(config.run.work_dir, PathBuf::from("integtest-runs"));
    assert!(config.run.keep_run_dirs);
}

#[test]
#[serial]
fn file_values_override_defaults() {
    let (_dir, path) = write_config(
        r#"
        [tools]
        run_control = "drunc-unified-shell"
        run_control_args = ["{op_env}", "{config}", "{session}"]
        execution_mode = "stepwise"

        [run]
        keep_run_dirs = false
        "#,
    );
    let config = HarnessConfig::load_from(&path).unwrap();
    assert_eq!(config.tools.run_control, "drunc-unified-shell");
    assert_eq!(config.tools.execution_mode, ExecutionMode::Stepwise);
    assert_eq!(config.tools.confgen, "python");
    assert!(!config.run.keep_run_dirs);
}

#[test]
#[serial]
fn environment_overrides_file() {
    let (_dir, path) = write_config("[tools]\nrun_control = \"nanorc\"\n");
    std::env::set_var("DAQ_INTEGTEST_TOOLS__RUN_CONTROL", "/opt/daq/bin/nanorc");
    std::env::set_var("DAQ_INTEGTEST_APPLICATION__LOG_LEVEL", "debug");
    let config = HarnessConfig::load_from(&path);
    std::env::remove_var("DAQ_INTEGTEST_TOOLS__RUN_CONTROL");
    std::env::remove_var("DAQ_INTEGTEST_APPLICATION__LOG_LEVEL");

    let config = config.unwrap();
    assert_eq!(config.tools.run_control, "/opt/daq/bin/nanorc");
    assert_eq!(config.application.log_level, "debug");
}

#[test]
#[serial]
fn invalid_values_are_rejected_after_merge() {
    let (_dir, path) = write_config("[application]\nlog_level = \"chatty\"\n");
    let err = HarnessConfig::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("Invalid log_level"), "{err}");

    let (_dir, path) = write_config("[tools]\nexecution_mode = \"parallel\"\n");
    assert!(HarnessConfig::load_from(&path).is_err());
}

#[test]
#[serial]
fn harness_options_follow_environment() {
    std::env::remove_var(SWTPG_ENV);
    std::env::remove_var(DQM_ENV);
    assert_eq!(HarnessOptions::from_env(), HarnessOptions::default());

    std::env::set_var(SWTPG_ENV, "1");
    let options = HarnessOptions::from_env();
    std::env::remove_var(SWTPG_ENV);
    assert!(options.enable_software_tpg);
    assert!(!options.enable_dqm);

    std::env::set_var(DQM_ENV, "");
    let options = HarnessOptions::from_env();
    std::env::remove_var(DQM_ENV);
    assert!(options.enable_dqm, "presence alone enables DQM");
}
