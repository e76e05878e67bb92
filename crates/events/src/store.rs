//! JSONL event store - append-only writer

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::EventError;
use crate::event::{EventRecord, PoolEvent};
use crate::reader::EventReader;

/// Append-only journal, one file per UTC day
pub struct EventStore {
    base_path: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
    last: Option<EventRecord>,
}

impl EventStore {
    /// Open the store at `base_path`, continuing the chain already on disk
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, EventError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        let last = EventReader::from_directory(&base_path)?.last_record()?;

        Ok(Self {
            base_path,
            current_file: None,
            current_date: None,
            last,
        })
    }

    /// Chain `event` onto the journal and write it
    pub fn append(
        &mut self,
        timestamp: DateTime<Utc>,
        event: PoolEvent,
    ) -> Result<EventRecord, EventError> {
        let record = EventRecord::chained(self.last.as_ref(), timestamp, event)?;
        let date = record.timestamp.format("%Y-%m-%d").to_string();

        if self.current_date.as_ref() != Some(&date) {
            self.rotate_file(&date)?;
        }

        if let Some(ref mut writer) = self.current_file {
            let json = serde_json::to_string(&record)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }

        debug!(sequence = record.sequence, kind = record.event.kind(), "journal append");
        self.last = Some(record.clone());
        Ok(record)
    }

    fn rotate_file(&mut self, date: &str) -> Result<(), EventError> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }

        let file_path = self.base_path.join(format!("{}.jsonl", date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        self.current_file = Some(BufWriter::new(file));
        self.current_date = Some(date.to_string());

        Ok(())
    }

    pub fn last_sequence(&self) -> u64 {
        self.last.as_ref().map_or(0, |r| r.sequence)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Flush and close the current file
    pub fn close(&mut self) -> Result<(), EventError> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }
        self.current_file = None;
        self.current_date = None;
        Ok(())
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
