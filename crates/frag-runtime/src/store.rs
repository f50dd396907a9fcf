//! Persistence of finished matches.
//!
//! [`JsonlMatchStore`] appends records to `<root>/<identity>/<mode>.jsonl`
//! and keeps a cached `counters.json` per identity next to them. The cache
//! is always rebuildable from the logs.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use frag_core::error::{Result, TrackerError};
use frag_core::models::{GameMode, MatchRecord, StoreCounters};
use frag_data::aggregator::recompute_counters;
use frag_data::reader::{history_path, identity_dir, load_history, LoadedHistory};

const COUNTERS_FILE: &str = "counters.json";

// ── MatchStore ────────────────────────────────────────────────────────────────

/// Storage for finished matches, keyed by account identity and mode.
pub trait MatchStore {
    /// Persist one record under `identity`.
    fn append(&self, identity: &str, record: &MatchRecord) -> Result<()>;
    /// Read back an identity's history, optionally for one mode only.
    fn load(&self, identity: &str, mode: Option<GameMode>) -> Result<LoadedHistory>;
    /// Running counters for an identity.
    fn counters(&self, identity: &str) -> Result<StoreCounters>;
}

// ── JsonlMatchStore ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JsonlMatchStore {
    root: PathBuf,
}

impl JsonlMatchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all identities that have a history directory, sorted.
    pub fn identities(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    /// Recompute an identity's counters from its logs and rewrite the cache.
    pub fn rebuild_counters(&self, identity: &str) -> Result<StoreCounters> {
        let history = load_history(&self.root, Some(identity), None);
        let counters = recompute_counters(&history.records);
        self.save_counters(identity, &counters)?;
        tracing::debug!(identity, ?counters, "rebuilt store counters");
        Ok(counters)
    }

    fn counters_path(&self, identity: &str) -> PathBuf {
        identity_dir(&self.root, identity).join(COUNTERS_FILE)
    }

    /// Write the counters cache via a temporary file and rename.
    fn save_counters(&self, identity: &str, counters: &StoreCounters) -> Result<()> {
        let path = self.counters_path(identity);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TrackerError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(counters)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| TrackerError::FileWrite {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| TrackerError::FileWrite {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Cached counters, or `None` when the cache is missing or unreadable.
    fn cached_counters(&self, identity: &str) -> Option<StoreCounters> {
        let path = self.counters_path(identity);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(counters) => Some(counters),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt counters cache");
                None
            }
        }
    }
}

impl MatchStore for JsonlMatchStore {
    fn append(&self, identity: &str, record: &MatchRecord) -> Result<()> {
        record.validate()?;

        let path = history_path(&self.root, identity, record.mode);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TrackerError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Must run before the append: a rebuild afterwards would count this record twice.
        let mut counters = match self.cached_counters(identity) {
            Some(c) => c,
            None => self.rebuild_counters(identity)?,
        };

        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| TrackerError::FileWrite {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| TrackerError::FileWrite {
                path: path.clone(),
                source,
            })?;

        counters.record(record);
        self.save_counters(identity, &counters)?;

        tracing::info!(identity, mode = %record.mode, path = %path.display(), "match saved");
        Ok(())
    }

    fn load(&self, identity: &str, mode: Option<GameMode>) -> Result<LoadedHistory> {
        Ok(load_history(&self.root, Some(identity), mode))
    }

    fn counters(&self, identity: &str) -> Result<StoreCounters> {
        match self.cached_counters(identity) {
            Some(counters) => Ok(counters),
            None => self.rebuild_counters(identity),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
