//! Checks over one data file.
//!
//! Each check returns `true` on success and `false` on failure, with a `tracing`
//! diagnostic naming the file, the record and the offending values. There is no
//! aggregation across checks: callers stop at the first `false`.

use super::{AttrValue, DataFile};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Root attributes every data file must carry.
pub const EXPECTED_ATTRIBUTES: [&str; 10] = [
    "application_name",
    "closing_timestamp",
    "creation_timestamp",
    "file_index",
    "filelayout_params",
    "filelayout_version",
    "operational_environment",
    "record_type",
    "recorded_size",
    "run_number",
];

/// Expected population of one fragment type in every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentCheckSpec {
    /// Human-readable type used in diagnostics ("WIB", "Trigger Candidate").
    pub type_description: String,
    /// First path component under the record ("TPC", "Trigger").
    pub detector_group: String,
    /// Prefix of the second path component ("APA", "Region").
    pub region_prefix: String,
    /// Fragments of this type in every record.
    pub expected_fragment_count: usize,
    /// Smallest accepted fragment size.
    pub min_size_bytes: u64,
    /// Largest accepted fragment size.
    pub max_size_bytes: u64,
}

impl FragmentCheckSpec {
    /// Expectation with every field given.
    pub fn new(
        type_description: &str,
        detector_group: &str,
        region_prefix: &str,
        expected_fragment_count: usize,
        min_size_bytes: u64,
        max_size_bytes: u64,
    ) -> Self {
        Self {
            type_description: type_description.to_string(),
            detector_group: detector_group.to_string(),
            region_prefix: region_prefix.to_string(),
            expected_fragment_count,
            min_size_bytes,
            max_size_bytes,
        }
    }

    /// Same spec with both size bounds set to `size_bytes`.
    pub fn with_exact_size(mut self, size_bytes: u64) -> Self {
        self.min_size_bytes = size_bytes;
        self.max_size_bytes = size_bytes;
        self
    }

    /// Same spec with new size bounds.
    pub fn with_size_range(mut self, min_size_bytes: u64, max_size_bytes: u64) -> Self {
        self.min_size_bytes = min_size_bytes;
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Same spec with a new per-record count.
    pub fn with_expected_count(mut self, expected_fragment_count: usize) -> Self {
        self.expected_fragment_count = expected_fragment_count;
        self
    }
}

/// Every record holds exactly one record header.
pub fn sanity_check(file: &DataFile) -> bool {
    let mut passed = true;
    for record in file.records() {
        match record.header_count() {
            1 => {}
            0 => {
                warn!(file = %file.name(), record = %record.name, "No TriggerRecordHeader in record");
                passed = false;
            }
            n => {
                warn!(
                    file = %file.name(),
                    record = %record.name,
                    count = n,
                    "More than one TriggerRecordHeader in record"
                );
                passed = false;
            }
        }
    }
    if passed {
        info!(file = %file.name(), "Sanity check passed");
    }
    passed
}

fn run_number_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"_run(\d+)_").expect("valid regex"))
}

fn file_index_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"_run\d+_(\d+)_").expect("valid regex"))
}

fn timestamp_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{8}T\d{6})").expect("valid regex"))
}

fn filename_number(pattern: &Regex, name: &str) -> Option<i64> {
    pattern
        .captures(name)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Filename stamps (`YYYYMMDDTHHMMSS`, UTC) accepted for a creation timestamp in ms.
fn accepted_stamps(creation_ms: i64) -> Vec<String> {
    let Some(created) = DateTime::<Utc>::from_timestamp_millis(creation_ms) else {
        return Vec::new();
    };
    [-1, 0, 1]
        .iter()
        .map(|offset| {
            (created + Duration::seconds(*offset))
                .format("%Y%m%dT%H%M%S")
                .to_string()
        })
        .collect()
}

fn check_number_in_name(file: &DataFile, attribute: &str, value: &AttrValue, pattern: &Regex) -> bool {
    let name = file.name();
    let Some(expected) = filename_number(pattern, &name) else {
        return true;
    };
    if value.as_i64() == Some(expected) {
        true
    } else {
        warn!(
            file = %name,
            attribute,
            value = %value,
            "Attribute does not match the value in the filename"
        );
        false
    }
}

fn check_creation_timestamp(file: &DataFile, value: &AttrValue) -> bool {
    let name = file.name();
    let Some(stamp) = timestamp_token().find(&name) else {
        return true;
    };
    let accepted = value.as_i64().map(accepted_stamps).unwrap_or_default();
    if accepted.iter().any(|candidate| candidate == stamp.as_str()) {
        true
    } else {
        warn!(
            file = %name,
            value = %value,
            stamp = stamp.as_str(),
            "Attribute 'creation_timestamp' does not match the timestamp in the filename"
        );
        false
    }
}

/// Required attributes are present; run number, file index and creation time agree
/// with the filename.
pub fn check_file_attributes(file: &DataFile) -> bool {
    let mut passed = true;
    for name in EXPECTED_ATTRIBUTES {
        let Some(value) = file.attribute(name) else {
            warn!(file = %file.name(), attribute = name, "Attribute not found in file");
            passed = false;
            continue;
        };
        let consistent = match name {
            "run_number" => check_number_in_name(file, name, value, run_number_token()),
            "file_index" => check_number_in_name(file, name, value, file_index_token()),
            "creation_timestamp" => check_creation_timestamp(file, value),
            _ => true,
        };
        passed &= consistent;
    }
    if passed {
        info!(file = %file.name(), "All attribute checks passed");
    }
    passed
}

/// Record count lies within `expected ± tolerance`.
pub fn check_event_count(file: &DataFile, expected: f64, tolerance: f64) -> bool {
    let event_count = file.event_count() as f64;
    if (event_count - expected).abs() <= tolerance {
        info!(
            file = %file.name(),
            event_count,
            "Event count is within a tolerance of {} from an expected value of {}",
            tolerance,
            expected
        );
        true
    } else {
        warn!(
            file = %file.name(),
            event_count,
            "Event count is outside the tolerance of {} from an expected value of {}",
            tolerance,
            expected
        );
        false
    }
}

/// Every record holds exactly `spec.expected_fragment_count` matching fragments.
pub fn check_fragment_count(file: &DataFile, spec: &FragmentCheckSpec) -> bool {
    let mut passed = true;
    for record in file.records() {
        let count = record
            .fragments_in(&spec.detector_group, &spec.region_prefix)
            .count();
        if count != spec.expected_fragment_count {
            warn!(
                file = %file.name(),
                record = %record.name,
                "Record has an unexpected number of {} fragments: {} (expected {})",
                spec.type_description,
                count,
                spec.expected_fragment_count
            );
            passed = false;
        }
    }
    if passed {
        info!(
            file = %file.name(),
            "{} {} fragments confirmed in all {} records",
            spec.expected_fragment_count,
            spec.type_description,
            file.event_count()
        );
    }
    passed
}

/// Every matching fragment's size lies in `[min_size_bytes, max_size_bytes]`.
pub fn check_fragment_sizes(file: &DataFile, spec: &FragmentCheckSpec) -> bool {
    let mut passed = true;
    for record in file.records() {
        for fragment in record.fragments_in(&spec.detector_group, &spec.region_prefix) {
            if fragment.size_bytes < spec.min_size_bytes || fragment.size_bytes > spec.max_size_bytes {
                warn!(
                    file = %file.name(),
                    record = %record.name,
                    fragment = %fragment.path,
                    "{} fragment size {} is outside [{}, {}]",
                    spec.type_description,
                    fragment.size_bytes,
                    spec.min_size_bytes,
                    spec.max_size_bytes
                );
                passed = false;
            }
        }
    }
    if passed {
        info!(
            file = %file.name(),
            "All {} fragments within [{}, {}] bytes",
            spec.type_description,
            spec.min_size_bytes,
            spec.max_size_bytes
        );
    }
    passed
}

/// Every record holds exactly `n_links` fragments of any type.
pub fn check_link_presence(file: &DataFile, n_links: usize) -> bool {
    let mut passed = true;
    for record in file.records() {
        let count = record.fragments().count();
        if count != n_links {
            warn!(
                file = %file.name(),
                record = %record.name,
                "Record has {} links (expected {})",
                count,
                n_links
            );
            passed = false;
        }
    }
    passed
}

/// Every fragment of any type lies in `[min_size_bytes, max_size_bytes]`.
pub fn check_all_fragment_sizes(file: &DataFile, min_size_bytes: u64, max_size_bytes: u64) -> bool {
    let mut passed = true;
    for record in file.records() {
        for fragment in record.fragments() {
            if fragment.size_bytes < min_size_bytes || fragment.size_bytes > max_size_bytes {
                warn!(
                    file = %file.name(),
                    record = %record.name,
                    fragment = %fragment.path,
                    "Fragment size {} is outside [{}, {}]",
                    fragment.size_bytes,
                    min_size_bytes,
                    max_size_bytes
                );
                passed = false;
            }
        }
    }
    passed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_stamps_cover_one_second_either_side() {
        // 2022-02-11T10:11:12Z
        let stamps = accepted_stamps(1_644_574_272_000);
        assert_eq!(
            stamps,
            vec!["20220211T101111", "20220211T101112", "20220211T101113"]
        );
    }

    #[test]
    fn filename_tokens() {
        let name = "swtest_run000101_0003_dataflow0_datawriter_0_20220211T101112.hdf5";
        assert_eq!(filename_number(run_number_token(), name), Some(101));
        assert_eq!(filename_number(file_index_token(), name), Some(3));
        assert_eq!(filename_number(run_number_token(), "plain.hdf5"), None);
    }

    #[test]
    fn spec_builders() {
        let spec = FragmentCheckSpec::new("WIB", "TPC", "APA", 2, 0, 0).with_exact_size(37200);
        assert_eq!(spec.min_size_bytes, 37200);
        assert_eq!(spec.max_size_bytes, 37200);
        let spec = spec.with_size_range(80, 37200).with_expected_count(4);
        assert_eq!((spec.min_size_bytes, spec.max_size_bytes), (80, 37200));
        assert_eq!(spec.expected_fragment_count, 4);
    }
}
