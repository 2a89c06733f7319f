//! Persisted registry of known rate-limit placeholder image hashes.
//!
//! On disk this is a small JSON document:
//!
//! ```json
//! {"blacklist": ["<md5>", ...], "auto_learned": ["<md5>", ...], "updated_at": "..."}
//! ```
//!
//! `blacklist` is curated by hand; `auto_learned` is appended by the image
//! pipeline. Hashes are never removed by this code.
//!
//! Writers in separate processes serialize on a sibling `<file>.lock`.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::traits::FingerprintStore;

/// Placeholders served by the generative provider when anonymous quota runs
/// out. Used as the curated list when no registry file exists yet.
pub const DEFAULT_PLACEHOLDER_HASHES: [&str; 2] = [
    "12aff62f69f5c0a5798c6f2d15dfa3c1",
    "694684906bafe9aec36a70ca08e8c1a7",
];

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);
const LOCK_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    blacklist: Vec<String>,
    #[serde(default)]
    auto_learned: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

#[derive(Debug, Default)]
struct Entries {
    curated: BTreeSet<String>,
    learned: BTreeSet<String>,
}

impl Entries {
    fn contains(&self, hash: &str) -> bool {
        self.curated.contains(hash) || self.learned.contains(hash)
    }

    fn merge(&mut self, file: RegistryFile) {
        self.curated
            .extend(file.blacklist.iter().map(|h| normalize(h)));
        self.learned
            .extend(file.auto_learned.iter().map(|h| normalize(h)));
        self.dedupe();
    }

    /// A hash promoted to the curated list stops counting as learned.
    fn dedupe(&mut self) {
        let curated = &self.curated;
        self.learned.retain(|h| !curated.contains(h));
    }
}

/// File-backed [`FingerprintStore`]. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct FingerprintRegistry {
    path: Option<PathBuf>,
    entries: Arc<RwLock<Entries>>,
}

impl FingerprintRegistry {
    /// Load the registry at `path`. A missing file yields the default
    /// placeholder hashes; the file is created on the first persist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let mut entries = Entries::default();
        match read_file(&path)? {
            Some(file) => entries.merge(file),
            None => {
                tracing::warn!(path = %path.display(), "Fingerprint registry not found, using default hashes");
                entries
                    .curated
                    .extend(DEFAULT_PLACEHOLDER_HASHES.iter().map(|h| h.to_string()));
            }
        }
        tracing::debug!(
            path = %path.display(),
            curated = entries.curated.len(),
            learned = entries.learned.len(),
            "Loaded fingerprint registry"
        );
        Ok(Self {
            path: Some(path),
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Registry without backing storage. `persist` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Arc::new(RwLock::new(Entries::default())),
        }
    }

    /// Seed the curated list (builder style, mostly for tests and dry runs).
    pub fn with_blacklist<I, S>(self, hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        {
            let mut entries = self.write();
            for hash in hashes {
                entries.curated.insert(normalize(hash.as_ref()));
            }
            entries.dedupe();
        }
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Hand-curated hashes, sorted.
    pub fn blacklist(&self) -> Vec<String> {
        self.read().curated.iter().cloned().collect()
    }

    /// Hashes learned at runtime, sorted.
    pub fn auto_learned(&self) -> Vec<String> {
        self.read().learned.iter().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl FingerprintStore for FingerprintRegistry {
    fn contains(&self, hash: &str) -> bool {
        self.read().contains(&normalize(hash))
    }

    fn add(&self, hash: &str) -> bool {
        let hash = normalize(hash);
        let mut entries = self.write();
        if entries.contains(&hash) {
            return false;
        }
        entries.learned.insert(hash)
    }

    /// Union with whatever is on disk now, then atomically replace the file.
    fn persist(&self) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _lock = PersistLock::acquire(path)?;
        if let Some(on_disk) = read_file(path)? {
            self.write().merge(on_disk);
        }

        let document = {
            let entries = self.read();
            RegistryFile {
                blacklist: entries.curated.iter().cloned().collect(),
                auto_learned: entries.learned.iter().cloned().collect(),
                updated_at: Some(Utc::now().to_rfc3339()),
            }
        };
        let json = serde_json::to_string_pretty(&document)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| AppError::RegistryError(format!("temp file in {}: {e}", dir.display())))?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.flush())
            .map_err(|e| AppError::RegistryError(format!("write {}: {e}", path.display())))?;
        tmp.persist(path)
            .map_err(|e| AppError::RegistryError(format!("rename to {}: {e}", path.display())))?;

        tracing::info!(
            path = %path.display(),
            total = document.blacklist.len() + document.auto_learned.len(),
            "Fingerprint registry saved"
        );
        Ok(())
    }

    fn len(&self) -> usize {
        let entries = self.read();
        entries.curated.len() + entries.learned.len()
    }
}

/// Exclusive `<file>.lock` held across the read-merge-rename in `persist`.
///
/// Created with `create_new`, removed on drop. A lock older than
/// `LOCK_STALE_AFTER` belongs to a crashed writer and is taken over.
struct PersistLock {
    path: PathBuf,
}

impl PersistLock {
    fn acquire(target: &Path) -> Result<Self, AppError> {
        let mut name = target.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        let deadline = Instant::now() + LOCK_TIMEOUT;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        tracing::warn!(lock = %path.display(), "Removing stale registry lock");
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(AppError::RegistryError(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => {
                    return Err(AppError::RegistryError(format!(
                        "lock {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    }
}

impl Drop for PersistLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn is_stale(lock: &Path) -> bool {
    std::fs::metadata(lock)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

fn read_file(path: &Path) -> Result<Option<RegistryFile>, AppError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::RegistryError(format!(
                "read {}: {e}",
                path.display()
            )));
        }
    };
    if raw.trim().is_empty() {
        return Ok(Some(RegistryFile::default()));
    }
    Ok(Some(serde_json::from_str(&raw)?))
}

fn normalize(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}
