//! Discovery and loading of persisted match history.
//!
//! History is laid out as `<root>/<identity>/<mode>.jsonl`, one
//! [`MatchRecord`] per line. Lines that do not decode are skipped and
//! counted so that one damaged entry never hides the rest of a file.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use frag_core::models::{GameMode, MatchRecord};
use tracing::{debug, warn};

/// Directory name used when no account identity was ever seen.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Records read from disk plus the number of lines that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedHistory {
    pub records: Vec<MatchRecord>,
    pub skipped: usize,
}

impl LoadedHistory {
    fn extend(&mut self, other: LoadedHistory) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
    }
}

// ── Layout ────────────────────────────────────────────────────────────────────

/// Make an account identity safe to use as a directory name.
///
/// Characters outside `[A-Za-z0-9_.-]` become `_`; an empty identity maps
/// to [`ANONYMOUS_IDENTITY`].
pub fn sanitize_identity(identity: &str) -> String {
    let cleaned: String = identity
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        ANONYMOUS_IDENTITY.to_string()
    } else {
        cleaned
    }
}

/// Directory holding one identity's history.
pub fn identity_dir(root: &Path, identity: &str) -> PathBuf {
    root.join(sanitize_identity(identity))
}

/// Log file for one identity and mode.
pub fn history_path(root: &Path, identity: &str, mode: GameMode) -> PathBuf {
    identity_dir(root, identity).join(format!("{}.jsonl", mode.as_str()))
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all `.jsonl` files recursively under `data_path`, sorted by path.
pub fn find_jsonl_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        debug!("History path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "jsonl")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Load match history from `root`.
///
/// * `identity` – restrict to one identity's directory; `None` reads all.
/// * `mode` – restrict to the `<mode>.jsonl` files; `None` reads every mode.
///
/// Records are returned ordered by start time.
pub fn load_history(root: &Path, identity: Option<&str>, mode: Option<GameMode>) -> LoadedHistory {
    let scan_root = match identity {
        Some(id) => identity_dir(root, id),
        None => root.to_path_buf(),
    };

    let files: Vec<PathBuf> = find_jsonl_files(&scan_root)
        .into_iter()
        .filter(|path| match mode {
            Some(m) => file_mode(path) == Some(m),
            None => true,
        })
        .collect();

    let mut history = LoadedHistory::default();
    for path in &files {
        history.extend(read_history_file(path));
    }
    history.records.sort_by_key(|r| r.start_time);

    debug!(
        "Loaded {} records ({} skipped) from {} files",
        history.records.len(),
        history.skipped,
        files.len()
    );
    history
}

/// Read one history file.
///
/// Records written before the mode was stored inline take the mode named
/// by the file. An unreadable file yields an empty history.
pub fn read_history_file(path: &Path) -> LoadedHistory {
    let mut history = LoadedHistory::default();

    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to read history file {}: {}", path.display(), e);
            return history;
        }
    };
    let implied_mode = file_mode(path);

    for (idx, line_result) in std::io::BufReader::new(file).lines().enumerate() {
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                warn!("{}:{}: unreadable line: {}", path.display(), idx + 1, e);
                history.skipped += 1;
                continue;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match decode_record(trimmed, implied_mode) {
            Ok(record) => history.records.push(record),
            Err(e) => {
                warn!("{}:{}: skipping corrupt record: {}", path.display(), idx + 1, e);
                history.skipped += 1;
            }
        }
    }

    history
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Mode encoded in a history file's stem, if any.
fn file_mode(path: &Path) -> Option<GameMode> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse().ok())
}

fn decode_record(line: &str, implied_mode: Option<GameMode>) -> serde_json::Result<MatchRecord> {
    let mut value: serde_json::Value = serde_json::from_str(line)?;
    if let (Some(obj), Some(mode)) = (value.as_object_mut(), implied_mode) {
        obj.entry("mode")
            .or_insert_with(|| serde_json::Value::String(mode.as_str().to_string()));
    }
    serde_json::from_value(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
