//! Disk persistence for cached icons
//!
//! Each icon is stored as two files named after the hex encoding of its
//! identifier: `<stem>.json` holds the metadata and `<stem>.bin` the raw
//! payload. Hex stems keep identifiers like `mdi:home` portable across
//! filesystems that reject `:`.
//!
//! The manager never touches the filesystem while holding its state lock.
//! It queues `DiskOp`s on a `DiskJournal` in the order it makes the matching
//! state changes, and the journal applies them later, in that same order.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::icon::{IconAsset, IconName};

/// Metadata stored next to each payload file
#[derive(Debug, Serialize, Deserialize)]
struct StoredMeta {
    /// The icon identifier
    name: IconName,
    /// MIME type of the payload
    content_type: String,
    /// Payload size, checked on load
    size: u64,
    /// When the icon was cached
    cached_at: DateTime<Utc>,
    /// When the icon was last read; older files without it fall back to `cached_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_accessed: Option<DateTime<Utc>>,
}

/// An icon read back from disk
#[derive(Debug, Clone)]
pub struct PersistedIcon {
    pub name: IconName,
    pub asset: IconAsset,
    pub cached_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl PersistedIcon {
    /// Restore order: least recently accessed first, oldest insertion breaks ties
    fn recency_key(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.last_accessed, self.cached_at)
    }
}

/// Reads and writes cached icons under one directory
#[derive(Debug, Clone)]
pub struct DiskCache {
    /// Directory where cache files are stored
    dir: PathBuf,
}

impl DiskCache {
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(name: &IconName) -> String {
        name.as_str().bytes().map(|b| format!("{:02x}", b)).collect()
    }

    fn meta_path(&self, name: &IconName) -> PathBuf {
        self.dir.join(format!("{}.json", Self::stem(name)))
    }

    fn data_path(&self, name: &IconName) -> PathBuf {
        self.dir.join(format!("{}.bin", Self::stem(name)))
    }

    /// Ensures the cache directory exists
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Writes an icon to disk, replacing any previous copy
    ///
    /// The payload is written before the metadata so a crash between the two
    /// leaves an orphan payload that `load` ignores, never metadata without data.
    pub fn write(&self, name: &IconName, asset: &IconAsset, cached_at: DateTime<Utc>) -> io::Result<()> {
        self.ensure_dir()?;

        let meta = StoredMeta {
            name: name.clone(),
            content_type: asset.content_type.clone(),
            size: asset.size(),
            cached_at,
            last_accessed: Some(cached_at),
        };

        fs::write(self.data_path(name), &asset.data)?;
        self.write_meta(name, &meta)
    }

    fn write_meta(&self, name: &IconName, meta: &StoredMeta) -> io::Result<()> {
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.meta_path(name), json)
    }

    /// Records a read of `name` at `at`
    ///
    /// An icon without files on disk is skipped.
    pub fn touch(&self, name: &IconName, at: DateTime<Utc>) -> io::Result<()> {
        let content = match fs::read_to_string(self.meta_path(name)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut meta: StoredMeta = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        meta.last_accessed = Some(at);
        self.write_meta(name, &meta)
    }

    /// Removes an icon's files; missing files are not an error
    pub fn remove(&self, name: &IconName) -> io::Result<()> {
        for path in [self.meta_path(name), self.data_path(name)] {
            match fs::remove_file(&path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    /// Removes every cache file in the directory, keeping the directory itself
    pub fn clear(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let path = entry?.path();
            if is_cache_file(&path) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Reads every stored icon, least recently accessed first
    ///
    /// Unreadable, corrupt or truncated entries are skipped with a warning.
    /// A missing directory yields an empty list.
    pub fn load(&self) -> io::Result<Vec<PersistedIcon>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut icons = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match self.read_icon(&path) {
                Ok(icon) => icons.push(icon),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable cached icon"),
            }
        }

        icons.sort_by_key(PersistedIcon::recency_key);
        Ok(icons)
    }

    fn read_icon(&self, meta_path: &Path) -> io::Result<PersistedIcon> {
        let content = fs::read_to_string(meta_path)?;
        let meta: StoredMeta = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let data = fs::read(self.data_path(&meta.name))?;
        if data.len() as u64 != meta.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("payload is {} bytes, metadata says {}", data.len(), meta.size),
            ));
        }

        Ok(PersistedIcon {
            name: meta.name,
            asset: IconAsset::new(data, meta.content_type),
            cached_at: meta.cached_at,
            last_accessed: meta.last_accessed.unwrap_or(meta.cached_at),
        })
    }
}

/// A filesystem change queued by the manager
#[derive(Debug)]
pub enum DiskOp {
    Write {
        name: IconName,
        asset: IconAsset,
        cached_at: DateTime<Utc>,
    },
    Touch {
        name: IconName,
        at: DateTime<Utc>,
    },
    Remove(IconName),
    Clear,
}

/// Ordered queue of pending filesystem changes for one `DiskCache`
///
/// `enqueue` only pushes onto an in-memory queue, so it is safe to call while
/// holding other locks. `flush` applies queued operations one at a time, in
/// enqueue order, and only one thread flushes at a time. A flush also applies
/// whatever other threads queued before it, so a `Write` queued before a
/// `Clear` can never land after it.
#[derive(Debug)]
pub struct DiskJournal {
    disk: DiskCache,
    pending: Mutex<VecDeque<DiskOp>>,
    io: Mutex<()>,
}

impl DiskJournal {
    pub fn new(disk: DiskCache) -> Self {
        Self {
            disk,
            pending: Mutex::new(VecDeque::new()),
            io: Mutex::new(()),
        }
    }

    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<DiskOp>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, op: DiskOp) {
        self.pending().push_back(op);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Applies every queued operation; failures are logged and skipped
    pub fn flush(&self) {
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            // Pop under a short lock so `enqueue` never waits on I/O
            let Some(op) = self.pending().pop_front() else {
                break;
            };
            self.apply(op);
        }
    }

    fn apply(&self, op: DiskOp) {
        let (name, result) = match op {
            DiskOp::Write {
                name,
                asset,
                cached_at,
            } => {
                let result = self.disk.write(&name, &asset, cached_at);
                (Some(name), result)
            }
            DiskOp::Touch { name, at } => {
                let result = self.disk.touch(&name, at);
                (Some(name), result)
            }
            DiskOp::Remove(name) => {
                let result = self.disk.remove(&name);
                (Some(name), result)
            }
            DiskOp::Clear => (None, self.disk.clear()),
        };

        if let Err(e) = result {
            match name {
                Some(name) => warn!(icon = %name, error = %e, "failed to update persisted icon"),
                None => warn!(dir = %self.disk.dir().display(), error = %e, "failed to clear persisted icons"),
            }
        }
    }
}

fn is_cache_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("json") | Some("bin")
    )
}
