//! HDF5 backend for [`super::DataFile::open`].

use super::{AttrValue, DatasetEntry, FileLayout, RecordLayout};
use crate::error::{AppResult, IntegtestError};
use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, File, Group};
use std::path::Path;

pub(super) fn read_layout(path: &Path) -> AppResult<FileLayout> {
    let file = File::open(path).map_err(|e| IntegtestError::DataFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut layout = FileLayout::new();
    for name in file.attr_names()? {
        let attr = file.attr(&name)?;
        layout.attributes.insert(name, read_attribute(&attr));
    }

    let mut records = file.groups()?;
    records.sort_by_key(|group| group.name());
    for group in records {
        let name = leaf_name(&group.name());
        let mut record = RecordLayout::new(name);
        collect_datasets(&group, "", &mut record.datasets)?;
        layout.records.push(record);
    }

    Ok(layout)
}

fn read_attribute(attr: &Attribute) -> AttrValue {
    let descriptor = match attr.dtype().and_then(|dtype| dtype.to_descriptor()) {
        Ok(descriptor) => descriptor,
        Err(e) => return AttrValue::Other(e.to_string()),
    };
    let value = match &descriptor {
        TypeDescriptor::Integer(_) => attr.read_scalar::<i64>().map(AttrValue::Int),
        TypeDescriptor::Unsigned(_) => attr
            .read_scalar::<u64>()
            .map(|value| AttrValue::Int(value as i64)),
        TypeDescriptor::Float(_) => attr.read_scalar::<f64>().map(AttrValue::Float),
        TypeDescriptor::VarLenUnicode => attr
            .read_scalar::<VarLenUnicode>()
            .map(|text| AttrValue::Text(text.as_str().to_string())),
        TypeDescriptor::VarLenAscii => attr
            .read_scalar::<VarLenAscii>()
            .map(|text| AttrValue::Text(text.as_str().to_string())),
        other => return AttrValue::Other(format!("{:?}", other)),
    };
    value.unwrap_or_else(|e| AttrValue::Other(e.to_string()))
}

fn collect_datasets(group: &Group, prefix: &str, out: &mut Vec<DatasetEntry>) -> AppResult<()> {
    let mut datasets = group.datasets()?;
    datasets.sort_by_key(|dataset| dataset.name());
    for dataset in datasets {
        let element_size = dataset.dtype()?.size();
        let size_bytes = (dataset.size() * element_size) as u64;
        out.push(DatasetEntry::new(
            join(prefix, &leaf_name(&dataset.name())),
            size_bytes,
        ));
    }

    let mut children = group.groups()?;
    children.sort_by_key(|child| child.name());
    for child in children {
        let child_prefix = join(prefix, &leaf_name(&child.name()));
        collect_datasets(&child, &child_prefix, out)?;
    }
    Ok(())
}

fn leaf_name(full_path: &str) -> String {
    full_path
        .rsplit('/')
        .next()
        .unwrap_or(full_path)
        .to_string()
}

fn join(prefix: &str, leaf: &str) -> String {
    if prefix.is_empty() {
        leaf.to_string()
    } else {
        format!("{}/{}", prefix, leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(path: &Path) -> hdf5::Result<()> {
        let file = File::create(path)?;
        file.new_attr::<u32>()
            .shape(())
            .create("run_number")?
            .write_scalar(&101u32)?;
        file.new_attr::<VarLenUnicode>()
            .shape(())
            .create("record_type")?
            .write_scalar(&"TriggerRecord".parse::<VarLenUnicode>().unwrap())?;

        let record = file.create_group("TriggerRecord00001")?;
        record
            .new_dataset::<u8>()
            .shape(16)
            .create("TriggerRecordHeader")?;
        let link = record.create_group("TPC")?.create_group("APA000")?;
        link.new_dataset::<u8>().shape(37200).create("Link00")?;
        Ok(())
    }

    #[test]
    fn reads_records_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swtest_run000101_0000_test.hdf5");
        write_fixture(&path).unwrap();

        let layout = read_layout(&path).unwrap();
        assert_eq!(layout.attributes.get("run_number"), Some(&AttrValue::Int(101)));
        assert_eq!(
            layout.attributes.get("record_type"),
            Some(&AttrValue::Text("TriggerRecord".to_string()))
        );
        assert_eq!(layout.records.len(), 1);
        let record = &layout.records[0];
        assert_eq!(record.name, "TriggerRecord00001");
        assert_eq!(record.header_count(), 1);
        let fragments: Vec<_> = record.fragments_in("TPC", "APA").collect();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].path, "TPC/APA000/Link00");
        assert_eq!(fragments[0].size_bytes, 37200);
    }
}
