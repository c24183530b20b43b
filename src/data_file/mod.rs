//! Read model of the HDF5 files written by the dataflow applications.
//!
//! Checks never touch the HDF5 library directly. A [`DataFile`] is loaded once into a
//! [`FileLayout`]: the root attributes plus every record (top-level group such as
//! `TriggerRecord00001` or `TimeSlice00001`) with its datasets listed by relative path
//! and byte size:
//!
//! ```text
//! /TriggerRecord00001
//!     TriggerRecordHeader          (record header)
//!     TPC/APA000/Link00            (fragment)
//!     TPC/APA000/Link01            (fragment)
//!     Trigger/Region000/Element00  (fragment)
//! ```
//!
//! Loading from disk needs the `storage_hdf5` feature; [`DataFile::from_layout`] builds
//! one from memory.

pub mod checks;
#[cfg(feature = "storage_hdf5")]
mod hdf5_reader;

pub use checks::{
    check_all_fragment_sizes, check_event_count, check_file_attributes, check_fragment_count,
    check_fragment_sizes, check_link_presence, sanity_check, FragmentCheckSpec,
    EXPECTED_ATTRIBUTES,
};

use crate::error::AppResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Dataset name marking a trigger-record header.
pub const RECORD_HEADER: &str = "TriggerRecordHeader";

/// Value of a root attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Integer attribute.
    Int(i64),
    /// Floating-point attribute.
    Float(f64),
    /// String attribute.
    Text(String),
    /// A type the checks do not interpret; holds a description.
    Other(String),
}

impl AttrValue {
    /// Integer value, if the attribute holds or spells a whole number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(value) => Some(*value),
            AttrValue::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            AttrValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(value) => write!(f, "{}", value),
            AttrValue::Float(value) => write!(f, "{}", value),
            AttrValue::Text(text) => write!(f, "{}", text),
            AttrValue::Other(description) => write!(f, "<{}>", description),
        }
    }
}

/// One dataset inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetEntry {
    /// Path relative to the record, `/`-separated.
    pub path: String,
    /// Storage size in bytes.
    pub size_bytes: u64,
}

impl DatasetEntry {
    /// Dataset at `path` of `size_bytes`.
    pub fn new(path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
        }
    }

    /// Path components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|part| !part.is_empty())
    }

    /// A record-level dataset whose name marks it as the record header.
    pub fn is_record_header(&self) -> bool {
        !self.path.contains('/') && self.path.contains(RECORD_HEADER)
    }
}

/// One record (event) of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordLayout {
    /// Group name, e.g. `TriggerRecord00001`.
    pub name: String,
    /// Every dataset below the record group.
    pub datasets: Vec<DatasetEntry>,
}

impl RecordLayout {
    /// Empty record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datasets: Vec::new(),
        }
    }

    /// Adds a dataset.
    pub fn with_dataset(mut self, path: impl Into<String>, size_bytes: u64) -> Self {
        self.datasets.push(DatasetEntry::new(path, size_bytes));
        self
    }

    /// Number of record-header datasets.
    pub fn header_count(&self) -> usize {
        self.datasets
            .iter()
            .filter(|dataset| dataset.is_record_header())
            .count()
    }

    /// Every dataset other than the record header.
    pub fn fragments(&self) -> impl Iterator<Item = &DatasetEntry> {
        self.datasets
            .iter()
            .filter(|dataset| !dataset.is_record_header())
    }

    /// Fragments stored as `<detector_group>/<region…>/<element>` where the region
    /// name starts with `region_prefix`.
    pub fn fragments_in<'a>(
        &'a self,
        detector_group: &'a str,
        region_prefix: &'a str,
    ) -> impl Iterator<Item = &'a DatasetEntry> + 'a {
        self.fragments().filter(move |dataset| {
            let mut parts = dataset.components();
            parts.next() == Some(detector_group)
                && parts
                    .next()
                    .map(|region| region.starts_with(region_prefix))
                    .unwrap_or(false)
                && parts.next().is_some()
        })
    }
}

/// Attributes and records of one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileLayout {
    /// Root attributes by name.
    pub attributes: BTreeMap<String, AttrValue>,
    /// Records in file order.
    pub records: Vec<RecordLayout>,
}

impl FileLayout {
    /// Empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a root attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Appends a record.
    pub fn with_record(mut self, record: RecordLayout) -> Self {
        self.records.push(record);
        self
    }
}

/// A data file ready for checking.
#[derive(Debug, Clone)]
pub struct DataFile {
    path: PathBuf,
    layout: FileLayout,
}

impl DataFile {
    /// Reads the layout of an HDF5 file.
    #[cfg(feature = "storage_hdf5")]
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let layout = hdf5_reader::read_layout(path)?;
        tracing::debug!(
            file = %path.display(),
            records = layout.records.len(),
            attributes = layout.attributes.len(),
            "Loaded data file layout"
        );
        Ok(Self {
            path: path.to_path_buf(),
            layout,
        })
    }

    /// Reads the layout of an HDF5 file.
    #[cfg(not(feature = "storage_hdf5"))]
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let _ = path;
        Err(crate::error::IntegtestError::FeatureNotEnabled(
            "storage_hdf5".to_string(),
        ))
    }

    /// Wraps an in-memory layout; `path` supplies the name used by the checks.
    pub fn from_layout(path: impl Into<PathBuf>, layout: FileLayout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename of the file.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Full layout.
    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Records in file order.
    pub fn records(&self) -> &[RecordLayout] {
        &self.layout.records
    }

    /// Root attribute `name`.
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.layout.attributes.get(name)
    }

    /// Number of records.
    pub fn event_count(&self) -> usize {
        self.layout.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RecordLayout {
        RecordLayout::new("TriggerRecord00001")
            .with_dataset("TriggerRecordHeader", 120)
            .with_dataset("TPC/APA000/Link00", 37200)
            .with_dataset("TPC/APA001/Link00", 37200)
            .with_dataset("TPC/CRP000/Link00", 37200)
            .with_dataset("Trigger/Region000/Element00", 140)
    }

    #[test]
    fn header_is_not_a_fragment() {
        let record = record();
        assert_eq!(record.header_count(), 1);
        assert_eq!(record.fragments().count(), 4);
    }

    #[test]
    fn fragments_filter_by_group_and_region_prefix() {
        let record = record();
        assert_eq!(record.fragments_in("TPC", "APA").count(), 2);
        assert_eq!(record.fragments_in("Trigger", "Region").count(), 1);
        assert_eq!(record.fragments_in("PDS", "Region").count(), 0);
    }

    #[test]
    fn nested_header_name_is_a_fragment() {
        let record = RecordLayout::new("r").with_dataset("TPC/TriggerRecordHeader", 1);
        assert_eq!(record.header_count(), 0);
    }

    #[test]
    fn attr_value_integer_views() {
        assert_eq!(AttrValue::Int(101).as_i64(), Some(101));
        assert_eq!(AttrValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(AttrValue::Float(3.5).as_i64(), None);
        assert_eq!(AttrValue::Text(" 7 ".into()).as_i64(), Some(7));
        assert_eq!(AttrValue::Other("compound".into()).as_i64(), None);
    }

    #[cfg(not(feature = "storage_hdf5"))]
    #[test]
    fn open_without_feature_reports_it() {
        let err = DataFile::open("missing.hdf5").unwrap_err();
        assert!(err.to_string().contains("storage_hdf5"));
    }
}
