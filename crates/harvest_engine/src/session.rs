use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::filename::archive_filename;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::warc::{build_info_record, WarcInfo, WarcRecord};

/// One cycle's archive: a leading info record plus the response records
/// appended during the cycle.
///
/// `flush` consumes the session, so a session is written at most once.
#[derive(Debug, Clone)]
pub struct ArchiveSession {
    started: DateTime<Utc>,
    records: Vec<WarcRecord>,
}

impl ArchiveSession {
    pub fn new(started: DateTime<Utc>, info: &WarcInfo) -> Self {
        Self {
            started,
            records: vec![build_info_record(&started, info)],
        }
    }

    pub fn started(&self) -> &DateTime<Utc> {
        &self.started
    }

    pub fn append_response(&mut self, record: WarcRecord) {
        self.records.push(record);
    }

    pub fn response_count(&self) -> usize {
        self.records.len() - 1
    }

    pub fn records(&self) -> &[WarcRecord] {
        &self.records
    }

    /// Writes the session to `{dir}/{locality}_{YYYYMMDD}_{HHMMSS}.warc`.
    ///
    /// Returns `None` without touching the filesystem when no response record
    /// was appended.
    pub fn flush(self, dir: &Path, locality: &str) -> Result<Option<PathBuf>, PersistError> {
        if self.response_count() == 0 {
            return Ok(None);
        }
        let writer = AtomicFileWriter::new(dir);
        let path = writer.write_with(&archive_filename(locality, &self.started), |out| {
            for record in &self.records {
                out.write_all(&record.to_bytes())?;
            }
            Ok(())
        })?;
        Ok(Some(path))
    }
}
