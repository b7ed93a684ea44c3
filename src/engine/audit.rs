use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::lifecycle::namespace::Namespace;

/// Append-only, human-readable lifecycle log shared by the whole process.
///
/// The file is opened on the first write and held until exit. Write failures
/// are reported through `tracing` and otherwise ignored.
pub struct AuditLog {
    path: PathBuf,
    namespace: Namespace,
    file: Mutex<Option<File>>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>, namespace: Namespace) -> Self {
        Self {
            path: path.into(),
            namespace,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(namespace = %self.namespace, "{}", message);

        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "UnknownTime".to_string());
        let line = format_line(&self.namespace, &ts, message);

        let mut guard = self.file.lock();
        if guard.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(e) => {
                    tracing::warn!("Audit log open failed ({}): {}", self.path.display(), e);
                    return;
                }
            }
        }
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                tracing::warn!("Audit log write failed: {}", e);
                // reopen on the next record
                *guard = None;
            }
        }
    }
}

fn format_line(namespace: &Namespace, timestamp: &str, message: &str) -> String {
    format!("[{}] [{}] {}\n", namespace, timestamp, message)
}
