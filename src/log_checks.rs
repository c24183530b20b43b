//! Log-file scanning for errors and warnings.
//!
//! Every DAQ process writes a `log_<session>_<process>_*.txt` file into the run
//! directory. After a run the harness scans them line by line: a line carrying an
//! enabled severity marker is a *problem* unless one of the suppression patterns that
//! apply to that file matches it.
//!
//! Suppressions are declared per scenario as an [`IgnoredProblems`] association list
//! keyed by a regex over the log file's basename. A file matching several keys gets the
//! union of their message patterns.
//!
//! # Example
//!
//! ```no_run
//! use daq_integtest::log_checks::{logs_are_error_free, IgnoredProblems};
//! use std::path::PathBuf;
//!
//! let ignored = IgnoredProblems::new()
//!     .with("dqm", &["client will not be able to connect to Kafka cluster"])?;
//! let logs = vec![PathBuf::from("log_session_dqm0_3336.txt")];
//! assert!(logs_are_error_free(&logs, true, true, &ignored));
//! # Ok::<(), daq_integtest::error::IntegtestError>(())
//! ```

use crate::error::{AppResult, IntegtestError};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Severity of a problem line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// `error` or `fatal`, case-insensitive.
    Error,
    /// `warning`, case-insensitive.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Which severities are scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Report error lines.
    pub errors: bool,
    /// Report warning lines.
    pub warnings: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            errors: true,
            warnings: true,
        }
    }
}

fn error_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)error|fatal").expect("valid regex"))
}

fn warning_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)warning").expect("valid regex"))
}

/// Severity of `line` among the enabled ones; errors take precedence.
pub fn classify_line(line: &str, options: ScanOptions) -> Option<Severity> {
    if options.errors && error_marker().is_match(line) {
        Some(Severity::Error)
    } else if options.warnings && warning_marker().is_match(line) {
        Some(Severity::Warning)
    } else {
        None
    }
}

/// Suppression list: log-file-name pattern → message patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnoredProblems {
    entries: Vec<(Regex, Vec<Regex>)>,
}

impl IgnoredProblems {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds message patterns for log files whose basename matches `file_pattern`.
    pub fn with(mut self, file_pattern: &str, messages: &[&str]) -> AppResult<Self> {
        let key = Regex::new(file_pattern)?;
        let patterns = messages
            .iter()
            .map(|message| Regex::new(message))
            .collect::<Result<Vec<_>, _>>()?;
        self.entries.push((key, patterns));
        Ok(self)
    }

    /// Builds the list from `(file pattern, message patterns)` pairs.
    pub fn from_pairs(pairs: &[(&str, &[&str])]) -> AppResult<Self> {
        pairs
            .iter()
            .try_fold(Self::new(), |acc, (key, messages)| acc.with(key, messages))
    }

    /// Parses a TOML table of `"file pattern" = ["message pattern", ...]`.
    pub fn from_toml_str(source: &str) -> AppResult<Self> {
        let table: BTreeMap<String, Vec<String>> = toml::from_str(source)?;
        let mut ignored = Self::new();
        for (key, messages) in &table {
            let messages: Vec<&str> = messages.iter().map(String::as_str).collect();
            ignored = ignored.with(key, &messages)?;
        }
        Ok(ignored)
    }

    /// No pattern is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of file-pattern keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Message patterns applicable to `log_file`, in declaration order.
    pub fn patterns_for(&self, log_file: &Path) -> Vec<&Regex> {
        let basename = log_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.entries
            .iter()
            .filter(|(key, _)| key.is_match(&basename))
            .flat_map(|(_, patterns)| patterns.iter())
            .collect()
    }
}

/// One unsuppressed problem line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogProblem {
    /// Log file the line came from.
    pub file: PathBuf,
    /// 1-based
    pub line_number: usize,
    /// Severity the line was classified as.
    pub severity: Severity,
    /// Line text without the trailing newline.
    pub line: String,
}

/// Result of scanning one file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileScan {
    /// Scanned file.
    pub file: PathBuf,
    /// Unsuppressed problem lines.
    pub problems: Vec<LogProblem>,
    /// Problem lines matched by a suppression.
    pub ignored: usize,
}

impl FileScan {
    /// No unsuppressed problem.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Result of scanning a set of files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogScanReport {
    /// One entry per scanned file.
    pub files: Vec<FileScan>,
}

impl LogScanReport {
    /// No file has an unsuppressed problem.
    pub fn is_clean(&self) -> bool {
        self.files.iter().all(FileScan::is_clean)
    }

    /// Problems of every file, file by file.
    pub fn problems(&self) -> impl Iterator<Item = &LogProblem> {
        self.files.iter().flat_map(|scan| scan.problems.iter())
    }

    /// Total unsuppressed problems.
    pub fn problem_count(&self) -> usize {
        self.problems().count()
    }

    /// Total suppressed problems.
    pub fn ignored_count(&self) -> usize {
        self.files.iter().map(|scan| scan.ignored).sum()
    }
}

/// Scans `text` as the content of `file`.
pub fn scan_text(file: &Path, text: &str, options: ScanOptions, suppressions: &[&Regex]) -> FileScan {
    let mut scan = FileScan {
        file: file.to_path_buf(),
        ..Default::default()
    };

    for (index, line) in text.lines().enumerate() {
        let Some(severity) = classify_line(line, options) else {
            continue;
        };
        if suppressions.iter().any(|pattern| pattern.is_match(line)) {
            scan.ignored += 1;
            continue;
        }
        scan.problems.push(LogProblem {
            file: file.to_path_buf(),
            line_number: index + 1,
            severity,
            line: line.to_string(),
        });
    }

    scan
}

/// Reads and scans one log file.
pub fn scan_log_file(path: &Path, options: ScanOptions, suppressions: &[&Regex]) -> AppResult<FileScan> {
    let bytes = std::fs::read(path).map_err(|e| IntegtestError::path_io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(scan_text(path, &text, options, suppressions))
}

/// Scans every file with the suppressions that apply to it.
pub fn scan_logs<P: AsRef<Path>>(
    log_files: &[P],
    options: ScanOptions,
    ignored: &IgnoredProblems,
) -> AppResult<LogScanReport> {
    let mut report = LogScanReport::default();
    for path in log_files {
        let path = path.as_ref();
        let suppressions = ignored.patterns_for(path);
        report
            .files
            .push(scan_log_file(path, options, &suppressions)?);
    }
    Ok(report)
}

/// Emits the per-file diagnostics for a report.
pub fn report_problems(report: &LogScanReport) {
    for scan in &report.files {
        if !scan.is_clean() {
            warn!(
                file = %scan.file.display(),
                count = scan.problems.len(),
                "Problem(s) found in logfile"
            );
            for problem in &scan.problems {
                warn!(
                    file = %problem.file.display(),
                    line = problem.line_number,
                    severity = %problem.severity,
                    "{}",
                    problem.line
                );
            }
        }
        if scan.ignored > 0 {
            info!(
                file = %scan.file.display(),
                "Note: ignored {} problem(s)",
                scan.ignored
            );
        }
    }
}

/// True iff no unsuppressed problem exists in any file.
///
/// Problems are reported through `tracing`; an unreadable file counts as a failure.
pub fn logs_are_error_free<P: AsRef<Path>>(
    log_files: &[P],
    check_errors: bool,
    check_warnings: bool,
    ignored: &IgnoredProblems,
) -> bool {
    let options = ScanOptions {
        errors: check_errors,
        warnings: check_warnings,
    };
    match scan_logs(log_files, options, ignored) {
        Ok(report) => {
            report_problems(&report);
            report.is_clean()
        }
        Err(e) => {
            error!("Log scan failed: {}", e);
            false
        }
    }
}
