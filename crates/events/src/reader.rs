//! JSONL event reader - sequential reader for audit

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::EventError;
use crate::event::{verify_chain, EventRecord};

pub struct EventReader {
    files: Vec<PathBuf>,
}

impl EventReader {
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref();
        let mut files = Vec::new();

        if path.exists() {
            for entry in std::fs::read_dir(path)? {
                let file_path = entry?.path();
                if file_path.extension().is_some_and(|ext| ext == "jsonl") {
                    files.push(file_path);
                }
            }
        }

        // Day files sort chronologically by name
        files.sort();

        Ok(Self { files })
    }

    /// Read all records from all files in order
    pub fn read_all(&self) -> Result<Vec<EventRecord>, EventError> {
        let mut records = Vec::new();

        for file_path in &self.files {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                records.push(serde_json::from_str(&line)?);
            }
        }

        Ok(records)
    }

    pub fn last_record(&self) -> Result<Option<EventRecord>, EventError> {
        Ok(self.read_all()?.pop())
    }

    /// Read everything and verify the hash chain. Returns the record count.
    pub fn audit(&self) -> Result<usize, EventError> {
        let records = self.read_all()?;
        verify_chain(&records)?;
        Ok(records.len())
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}
