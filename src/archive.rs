//! Payload archive. Every fetched dataset is kept on disk as received so a
//! bad reload can be traced back to what the upstream actually served.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::reload::TableSchema;

/// Directory of raw upstream payloads
#[derive(Debug, Clone)]
pub struct PayloadArchive {
    dir: PathBuf,
    source_name: String,
}

impl PayloadArchive {
    pub fn new(dir: impl Into<PathBuf>, source_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            source_name: source_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a payload fetched at `unix_seconds`. Payloads fetched
    /// within the same second get a `.{n}` suffix from the second one on.
    pub fn file_name(&self, table: &TableSchema, unix_seconds: i64, n: u32) -> String {
        let table = table.name.to_ascii_lowercase();
        match n {
            0 => format!("{}.{}.{}.csv", unix_seconds, self.source_name, table),
            n => format!("{}.{}.{}.{}.csv", unix_seconds, self.source_name, table, n),
        }
    }

    /// Write `payload` to the archive, returning the file written. Existing
    /// files are never overwritten.
    pub fn store(&self, table: &TableSchema, payload: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let now = chrono::Utc::now().timestamp();

        let mut n = 0;
        let (path, mut file) = loop {
            let path = self.dir.join(self.file_name(table, now, n));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        };
        file.write_all(payload.as_bytes())?;

        tracing::debug!("Archived {} payload to {}", table, path.display());
        Ok(path)
    }
}
