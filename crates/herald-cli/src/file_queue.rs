use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use herald_core::error::AppError;
use herald_core::queue::{ItemStatus, QueueItem, WorkQueue};
use serde::{Deserialize, Serialize};

/// One row of the queue file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub status: ItemStatus,
    #[serde(flatten)]
    pub item: QueueItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Local work queue backed by a JSON array on disk.
///
/// Every status change rewrites the whole file through a temp file and
/// rename, so an interrupted run never leaves a truncated queue behind.
pub struct JsonFileQueue {
    path: PathBuf,
    entries: Mutex<Vec<QueueEntry>>,
}

impl JsonFileQueue {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            AppError::Generic(format!("Failed to read queue {}: {e}", path.display()))
        })?;
        let entries: Vec<QueueEntry> = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.display(), items = entries.len(), "Loaded queue file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn entries(&self) -> Vec<QueueEntry> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<QueueEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut QueueEntry),
    {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.item.id == id)
            .ok_or_else(|| AppError::Generic(format!("Queue item {id} not found")))?;
        apply(entry);
        write_atomic(&self.path, &entries)
    }
}

impl WorkQueue for JsonFileQueue {
    async fn fetch_ready(&self, limit: usize) -> Result<Vec<QueueItem>, AppError> {
        Ok(self
            .lock()
            .iter()
            .filter(|e| e.status == ItemStatus::Pending)
            .take(limit)
            .map(|e| e.item.clone())
            .collect())
    }

    async fn mark_published(&self, id: &str, url: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update(id, |entry| {
            entry.status = ItemStatus::Published;
            entry.item.existing_url = Some(url.to_string());
            entry.item.published_at = Some(at);
            entry.last_error = None;
        })
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<(), AppError> {
        self.update(id, |entry| entry.last_error = Some(reason.to_string()))
    }

    async fn reset_to_ready(&self, id: &str) -> Result<(), AppError> {
        self.update(id, |entry| entry.status = ItemStatus::Ready)
    }
}

fn write_atomic(path: &Path, entries: &[QueueEntry]) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(entries)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let io_err = |e: std::io::Error| {
        AppError::Generic(format!("Failed to write queue {}: {e}", path.display()))
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(json.as_bytes()).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
