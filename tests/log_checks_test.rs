//! Log scanning against files on disk.

use daq_integtest::log_checks::{logs_are_error_free, scan_logs, IgnoredProblems, ScanOptions, Severity};
use daq_integtest::scenario;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn write_log(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn run_dir_with_logs() -> (TempDir, Vec<PathBuf>) {
    let dir = tempdir().unwrap();
    let controller = write_log(
        dir.path(),
        "log_dfo-test-controller_3333.txt",
        &[
            "2024-Jan-10 10:00:01 INFO [Controller] booted",
            "2024-Jan-10 10:00:40 ERROR [Controller] Worker with pid 12345 was terminated due to signal 15",
        ],
    );
    let server = write_log(
        dir.path(),
        "log_local-connection-server_3334.txt",
        &[
            "[2024-01-10 10:00:00 +0000] [1] [INFO] Starting gunicorn",
            "[2024-01-10 10:00:00 +0000] [1] [INFO] errorlog: -",
        ],
    );
    let dataflow = write_log(
        dir.path(),
        "log_dfo-test_df-01_3340.txt",
        &[
            "2024-Jan-10 10:00:02 INFO [DataWriter] opened file",
            "2024-Jan-10 10:00:03 WARNING [Sender] connect: Connection refused, retrying",
        ],
    );
    (dir, vec![controller, server, dataflow])
}

#[test]
fn clean_logs_pass() {
    let dir = tempdir().unwrap();
    let log = write_log(dir.path(), "log_session_ru0.txt", &["INFO started", "INFO stopped"]);
    assert!(logs_are_error_free(&[log], true, true, &IgnoredProblems::new()));
}

#[test]
fn dfo_suppressions_cover_known_noise() {
    let (_dir, logs) = run_dir_with_logs();
    let ignored = scenario::find("dfo").unwrap().ignored_problems().unwrap();
    assert!(logs_are_error_free(&logs, true, true, &ignored));

    let report = scan_logs(&logs, ScanOptions::default(), &ignored).unwrap();
    assert_eq!(report.problem_count(), 0);
    assert_eq!(report.ignored_count(), 3);
}

#[test]
fn without_suppressions_every_marker_is_a_problem() {
    let (_dir, logs) = run_dir_with_logs();
    let report = scan_logs(&logs, ScanOptions::default(), &IgnoredProblems::new()).unwrap();
    assert_eq!(report.problem_count(), 3);

    let severities: Vec<Severity> = report.problems().map(|p| p.severity).collect();
    assert_eq!(severities, vec![Severity::Error, Severity::Error, Severity::Warning]);

    let first = report.problems().next().unwrap();
    assert_eq!(first.line_number, 2);
    assert!(first.file.ends_with("log_dfo-test-controller_3333.txt"));
}

#[test]
fn severity_switches_limit_the_scan() {
    let (_dir, logs) = run_dir_with_logs();
    let none = IgnoredProblems::new();
    assert!(!logs_are_error_free(&logs, true, false, &none));
    assert!(!logs_are_error_free(&logs, false, true, &none));
    assert!(logs_are_error_free(&logs, false, false, &none));
}

#[test]
fn suppressions_apply_only_to_matching_files() {
    let dir = tempdir().unwrap();
    let dqm = write_log(
        dir.path(),
        "log_integtest_dqm0_3350.txt",
        &["WARNING client will not be able to connect to Kafka cluster"],
    );
    let ru = write_log(
        dir.path(),
        "log_integtest_ruemu0_3336.txt",
        &["WARNING client will not be able to connect to Kafka cluster"],
    );
    let ignored = scenario::find("tpstream_writing").unwrap().ignored_problems().unwrap();

    assert!(logs_are_error_free(&[dqm.clone()], true, true, &ignored));
    assert!(!logs_are_error_free(&[dqm, ru], true, true, &ignored));
}

#[test]
fn unreadable_file_fails_the_check() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("log_missing.txt");
    assert!(!logs_are_error_free(&[missing.clone()], true, true, &IgnoredProblems::new()));
    assert!(scan_logs(&[missing], ScanOptions::default(), &IgnoredProblems::new()).is_err());
}

#[test]
fn invalid_utf8_is_scanned_lossily() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log_binary.txt");
    let mut bytes = b"INFO ok\n".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe]);
    bytes.extend_from_slice(b" FATAL corrupted\n");
    std::fs::write(&path, bytes).unwrap();

    let report = scan_logs(&[path], ScanOptions::default(), &IgnoredProblems::new()).unwrap();
    assert_eq!(report.problem_count(), 1);
    assert_eq!(report.problems().next().unwrap().line_number, 2);
}
