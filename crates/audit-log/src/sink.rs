//! Durable destinations for audit entries.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::errors::AuditError;
use crate::model::AuditEntry;

/// External store that receives every appended entry.
///
/// `write` runs on the audit log's writer thread, one entry at a time and in
/// append order. Implementations may block or fail; the audit log reports
/// failures on the tracing channel and never propagates them to callers.
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;
    fn write(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Appends one JSON document per line to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn write(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}
