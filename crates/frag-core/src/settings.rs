use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::GameMode;

/// Default quick-kill combo window in milliseconds.
pub const DEFAULT_QUICK_KILL_WINDOW_MS: u64 = 3_000;

/// Default inactivity after which an open match is closed as quit.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Match tracking and statistics from game client diagnostic logs
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fragtrack",
    about = "Match tracking and statistics from game client diagnostic logs",
    version
)]
pub struct Settings {
    /// View mode
    #[arg(long, default_value = "summary", value_parser = ["live", "summary", "history"])]
    pub view: String,

    /// Diagnostic log to ingest in live view ("-" reads stdin)
    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// Keep reading the log as the client appends to it
    #[arg(long)]
    pub follow: bool,

    /// Directory holding persisted match logs
    #[arg(long, env = "FRAGTRACK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Player identity (SKID) whose history is shown
    #[arg(long)]
    pub identity: Option<String>,

    /// Restrict statistics to one mode
    #[arg(long, default_value = "all", value_parser = ["all", "normal", "special", "custom"])]
    pub mode: String,

    /// Restrict statistics to one arena
    #[arg(long)]
    pub map: Option<String>,

    /// Maximum gap between kills that continues a quick-kill combo (ms)
    #[arg(long, default_value_t = DEFAULT_QUICK_KILL_WINDOW_MS, value_parser = clap::value_parser!(u64).range(100..=60_000))]
    pub quick_kill_window_ms: u64,

    /// Close an open match as quit after this much inactivity (seconds)
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(10..=86_400))]
    pub idle_timeout_secs: u64,

    /// Maximum number of live updates delivered together
    #[arg(long, default_value = "8")]
    pub batch_size: usize,

    /// Maximum delay before buffered live updates are delivered (ms)
    #[arg(long, default_value = "250")]
    pub batch_delay_ms: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.fragtrack/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_kill_window_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".fragtrack").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable last-used params");
            Self::default()
        })
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation; takes args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "could not clear last-used params");
            }
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins; clap stores arg ids under the field name.
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }
        if settings.data_dir.is_none() {
            settings.data_dir = last.data_dir;
        }
        if settings.identity.is_none() {
            settings.identity = last.identity;
        }
        if !is_arg_explicitly_set(&matches, "quick_kill_window_ms") {
            if let Some(v) = last.quick_kill_window_ms {
                settings.quick_kill_window_ms = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "idle_timeout_secs") {
            if let Some(v) = last.idle_timeout_secs {
                settings.idle_timeout_secs = v;
            }
        }

        settings = Self::apply_debug(settings);

        if let Err(e) = LastUsedParams::from(&settings).save_to(config_path) {
            tracing::warn!(error = %e, "could not persist last-used params");
        }

        settings
    }

    /// `--debug` overrides the log level.
    fn apply_debug(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// The mode filter, or `None` for all modes.
    pub fn mode_filter(&self) -> Option<GameMode> {
        self.mode.parse().ok()
    }

    /// Data directory, defaulting to `~/.fragtrack/matches`.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fragtrack")
            .join("matches")
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            view: Some(s.view.clone()),
            data_dir: s.data_dir.clone(),
            identity: s.identity.clone(),
            quick_kill_window_ms: Some(s.quick_kill_window_ms),
            idle_timeout_secs: Some(s.idle_timeout_secs),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            view: Some("history".to_string()),
            data_dir: Some(PathBuf::from("/srv/matches")),
            identity: Some("sk-42".to_string()),
            quick_kill_window_ms: Some(4_000),
            idle_timeout_secs: Some(120),
        };
        params.save_to(&path).expect("save");

        let loaded = LastUsedParams::load_from(&path);
        assert_eq!(loaded.view, Some("history".to_string()));
        assert_eq!(loaded.data_dir, Some(PathBuf::from("/srv/matches")));
        assert_eq!(loaded.identity, Some("sk-42".to_string()));
        assert_eq!(loaded.quick_kill_window_ms, Some(4_000));
        assert_eq!(loaded.idle_timeout_secs, Some(120));
    }

    #[test]
    fn test_last_used_params_corrupt_file_is_default() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let loaded = LastUsedParams::load_from(&path);
        assert!(loaded.view.is_none());
        assert!(loaded.identity.is_none());
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());

        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
    }

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["fragtrack"]);

        assert_eq!(settings.view, "summary");
        assert!(settings.log_path.is_none());
        assert!(!settings.follow);
        assert_eq!(settings.mode, "all");
        assert!(settings.mode_filter().is_none());
        assert!(settings.map.is_none());
        assert_eq!(settings.quick_kill_window_ms, DEFAULT_QUICK_KILL_WINDOW_MS);
        assert_eq!(settings.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
        assert_eq!(settings.batch_size, 8);
        assert_eq!(settings.batch_delay_ms, 250);
        assert_eq!(settings.log_level, "INFO");
        assert!(!settings.debug);
        assert!(!settings.clear);
    }

    #[test]
    fn test_settings_mode_filter() {
        let settings = Settings::parse_from(["fragtrack", "--mode", "special"]);
        assert_eq!(settings.mode_filter(), Some(GameMode::Special));
    }

    #[test]
    fn test_settings_rejects_tiny_window() {
        let result = Settings::try_parse_from(["fragtrack", "--quick-kill-window-ms", "5"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_data_dir_prefers_explicit() {
        let settings =
            Settings::parse_from(["fragtrack", "--data-dir", "/tmp/fragtrack-matches"]);
        assert_eq!(
            settings.resolve_data_dir(),
            PathBuf::from("/tmp/fragtrack-matches")
        );
    }

    #[test]
    fn test_load_with_last_used_merges_persisted_values() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            view: Some("history".to_string()),
            identity: Some("sk-7".to_string()),
            quick_kill_window_ms: Some(4_000),
            ..Default::default()
        };
        params.save_to(&config_path).expect("save");

        let settings =
            Settings::load_with_last_used_impl(vec!["fragtrack".into()], &config_path);
        assert_eq!(settings.view, "history");
        assert_eq!(settings.identity, Some("sk-7".to_string()));
        assert_eq!(settings.quick_kill_window_ms, 4_000);
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            view: Some("history".to_string()),
            quick_kill_window_ms: Some(4_000),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(
            vec![
                "fragtrack".into(),
                "--view".into(),
                "live".into(),
                "--quick-kill-window-ms".into(),
                "2500".into(),
            ],
            &config_path,
        );
        assert_eq!(settings.view, "live");
        assert_eq!(settings.quick_kill_window_ms, 2_500);
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&config_path).expect("save");

        Settings::load_with_last_used_impl(
            vec!["fragtrack".into(), "--clear".into()],
            &config_path,
        );
        assert!(!config_path.exists());
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Settings::load_with_last_used_impl(
            vec!["fragtrack".into(), "--debug".into()],
            &tmp_config_path(&tmp),
        );
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(
            vec!["fragtrack".into(), "--identity".into(), "sk-9".into()],
            &config_path,
        );

        let loaded = LastUsedParams::load_from(&config_path);
        assert_eq!(loaded.identity, Some("sk-9".to_string()));
        assert_eq!(loaded.view, Some("summary".to_string()));
    }
}
