//! Durable ledger of already-handled event ids.
//!
//! One id per line, appended in processing order. The in-memory set answers
//! `contains` in O(1); the ordered list is what compaction trims from.
//!
//! Invariants:
//! - `record` appends and syncs the line before the id becomes visible to
//!   `contains` (durability before visibility)
//! - a failed append is cut back off the file, and a store found ending
//!   mid-line is terminated on open, so a new line never lands on a fragment
//! - compaction only ever drops the oldest entries
//! - compaction and `record` both take `&mut self`, so they cannot interleave

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::PersistenceError;

/// Size limits applied by [`DedupLedger::compact`].
#[derive(Debug, Clone, Copy)]
pub struct LedgerLimits {
    /// Entries kept once compaction runs
    pub max_entries: usize,
    /// File size above which compaction runs
    pub max_bytes: u64,
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// What a compaction pass did.
#[derive(Debug, Clone, PartialEq)]
pub enum CompactionOutcome {
    /// The store was within limits; nothing was touched.
    Skipped { bytes: u64, entries: usize },
    Compacted {
        kept: usize,
        removed: usize,
        backup: PathBuf,
    },
}

pub struct DedupLedger {
    path: PathBuf,
    entries: Vec<String>,
    index: HashSet<String>,
    degraded: bool,
}

impl DedupLedger {
    /// Open (creating if needed) the ledger at `path` and load its entries.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(PersistenceError::io("create", parent))?;
        }

        let mut entries = Vec::new();
        let mut index = HashSet::new();
        if path.exists() {
            let contents = fs::read_to_string(&path).map_err(PersistenceError::io("read", &path))?;
            if !contents.is_empty() && !contents.ends_with('\n') {
                warn!(path = %path.display(), "ledger ends mid-line, terminating last entry");
                let mut file = open_append(&path)?;
                append_synced(&mut file, b"\n").map_err(PersistenceError::io("repair", &path))?;
            }
            for line in contents.lines() {
                let id = line.trim();
                if !id.is_empty() && index.insert(id.to_string()) {
                    entries.push(id.to_string());
                }
            }
        }

        // Creates the store if missing.
        open_append(&path)?;
        info!(path = %path.display(), entries = entries.len(), "ledger opened");

        Ok(Self {
            path,
            entries,
            index,
            degraded: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True once an id had to be kept in memory only.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Append `id` durably, then make it visible. Recording twice is a no-op.
    pub fn record(&mut self, id: &str) -> Result<(), PersistenceError> {
        if self.contains(id) {
            return Ok(());
        }

        let mut file = open_append(&self.path)?;
        append_synced(&mut file, format!("{id}\n").as_bytes())
            .map_err(PersistenceError::io("append to", &self.path))?;

        self.remember_entry(id);
        debug!(id, "recorded in ledger");
        Ok(())
    }

    /// Mark `id` as handled for this process only, after `record` failed.
    pub fn remember(&mut self, id: &str) {
        if !self.contains(id) {
            warn!(id, "ledger running in memory only for this id");
            self.degraded = true;
            self.remember_entry(id);
        }
    }

    fn remember_entry(&mut self, id: &str) {
        self.entries.push(id.to_string());
        self.index.insert(id.to_string());
    }

    /// Trim the store to the newest `max_entries` ids once it exceeds `max_bytes`.
    ///
    /// A timestamped copy of the store is written before it is replaced.
    pub fn compact(&mut self, limits: LedgerLimits) -> Result<CompactionOutcome, PersistenceError> {
        let bytes = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        if bytes <= limits.max_bytes || self.entries.len() <= limits.max_entries {
            debug!(bytes, entries = self.entries.len(), "ledger within limits");
            return Ok(CompactionOutcome::Skipped {
                bytes,
                entries: self.entries.len(),
            });
        }

        info!(
            bytes,
            entries = self.entries.len(),
            max_entries = limits.max_entries,
            "compacting ledger"
        );

        let backup = self.backup_path();
        fs::copy(&self.path, &backup).map_err(PersistenceError::io("back up", &self.path))?;

        let removed = self.entries.len() - limits.max_entries;
        let kept: Vec<String> = self.entries.split_off(removed);

        let mut contents = kept.join("\n");
        contents.push('\n');
        let tmp_path = self.path.with_extension("tmp");
        let replaced = write_synced(&tmp_path, contents.as_bytes())
            .and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(source) = replaced {
            let _ = fs::remove_file(&tmp_path);
            // Store untouched; restore the in-memory view to match it.
            let mut restored = std::mem::take(&mut self.entries);
            restored.extend(kept);
            self.entries = restored;
            return Err(PersistenceError::Io {
                action: "rewrite",
                path: self.path.clone(),
                source,
            });
        }

        self.index = kept.iter().cloned().collect();
        self.entries = kept;
        // The rewritten store now mirrors everything still held in memory.
        self.degraded = false;

        info!(
            kept = self.entries.len(),
            removed,
            backup = %backup.display(),
            "ledger compacted"
        );

        Ok(CompactionOutcome::Compacted {
            kept: self.entries.len(),
            removed,
            backup,
        })
    }

    /// Sync the store to disk. No handle is held between appends.
    pub fn close(self) -> Result<(), PersistenceError> {
        if !self.path.is_file() {
            return Ok(());
        }
        File::open(&self.path)
            .and_then(|file| file.sync_all())
            .map_err(PersistenceError::io("flush", &self.path))
    }

    fn backup_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        self.path.with_file_name(format!("{name}.backup.{stamp}"))
    }
}

fn open_append(path: &Path) -> Result<File, PersistenceError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(PersistenceError::io("open", path))
}

/// On failure the file is cut back to its previous length.
fn append_synced(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    let before = file.metadata()?.len();
    let written = file.write_all(bytes).and_then(|()| file.sync_data());
    if written.is_err() {
        let _ = file.set_len(before);
    }
    written
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
