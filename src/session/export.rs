use std::fs::{self, OpenOptions};
use std::path::Path;

use csv::WriterBuilder;
use tracing::info;

use super::data::LogEntry;
use crate::error::Result;

/// File extension of the sheets written by [`CsvExporter`].
pub const SHEET_EXTENSION: &str = "csv";

/// Something that can persist a [`LogEntry`] at a destination.
pub trait Exporter {
    fn append(&self, destination: &Path, entry: &LogEntry) -> Result<()>;
}

/// Appends rows to a CSV sheet. A new or empty file gets the header first.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn append(&self, destination: &Path, entry: &LogEntry) -> Result<()> {
        let has_rows = fs::metadata(destination)
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        if !has_rows {
            if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)?;
        let mut writer = WriterBuilder::new()
            .has_headers(!has_rows)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;

        info!("Logged measurements to {}", destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_back(path: &Path) -> Vec<LogEntry> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.deserialize().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn creates_sheet_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let entry = LogEntry::now(12.3, 45.6);

        CsvExporter.append(&path, &entry).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Timestamp,First Measurement,Second Measurement\n"));
        assert_eq!(read_back(&path), vec![entry]);
    }

    #[test]
    fn appends_without_repeating_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let a = LogEntry::now(1.0, 2.0);
        let b = LogEntry::now(3.5, 4.5);

        CsvExporter.append(&path, &a).unwrap();
        CsvExporter.append(&path, &b).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Timestamp").count(), 1);
        assert_eq!(read_back(&path), vec![a, b]);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("today").join("log.csv");

        CsvExporter.append(&path, &LogEntry::now(5.0, 7.25)).unwrap();
        assert_eq!(read_back(&path).len(), 1);
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "").unwrap();

        CsvExporter.append(&path, &LogEntry::now(5.0, 7.25)).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Timestamp,"));
    }
}
