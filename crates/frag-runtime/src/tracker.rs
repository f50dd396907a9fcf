//! Async live tracker.
//!
//! Runs a [`LineDriver`] over a log source in a dedicated tokio task,
//! persisting finished matches and forwarding [`TrackerUpdate`]s through an
//! `mpsc` channel so the presentation layer never shares state with it.
//!
//! Live input (stdin, or a followed file) is stamped with the wall clock.
//! A replayed file runs on the timestamps its lines carry instead, and the
//! idle timeout is off. A replayed match that contains a line without its own
//! timestamp has no trustworthy timing: it is reported but not saved.

use std::path::PathBuf;
use std::time::Duration;

use frag_core::error::TrackerError;
use frag_core::formatting::split_leading_timestamp;
use frag_core::models::{LiveSnapshot, MatchRecord, RawLine, StreakSummary, Timestamp};
use frag_core::settings::Settings;
use frag_data::reader::ANONYMOUS_IDENTITY;
use frag_data::streaks::StreakAnalyzer;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::batcher::UpdateBatcher;
use crate::driver::LineDriver;
use crate::session::SessionPhase;
use crate::store::MatchStore;

/// How often a tailed file is re-checked after reaching its end.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

// ── Public types ──────────────────────────────────────────────────────────────

/// Where diagnostic lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    File(PathBuf),
    Stdin,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub source: LogSource,
    /// Keep reading a file as it grows, starting from its current end.
    /// Without it the whole file is replayed once.
    pub follow: bool,
    pub idle_timeout: Duration,
    pub quick_kill_window_ms: u64,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub poll_interval: Duration,
}

impl TrackerConfig {
    /// Build from CLI settings. A missing path or `-` reads stdin.
    pub fn from_settings(settings: &Settings) -> Self {
        let source = match &settings.log_path {
            Some(path) if path.as_os_str() != "-" => LogSource::File(path.clone()),
            _ => LogSource::Stdin,
        };
        Self {
            source,
            follow: settings.follow,
            idle_timeout: Duration::from_secs(settings.idle_timeout_secs),
            quick_kill_window_ms: settings.quick_kill_window_ms,
            batch_size: settings.batch_size,
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    fn follows_file(&self) -> bool {
        self.follow && matches!(self.source, LogSource::File(_))
    }

    /// A file read once from the start rather than tailed.
    fn replays_file(&self) -> bool {
        !self.follow && matches!(self.source, LogSource::File(_))
    }
}

/// Messages sent from the tracker task.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerUpdate {
    /// Live counters, oldest first.
    Live(Vec<LiveSnapshot>),
    /// A match finished. `saved` is false when it was not written to the
    /// store, either because the write failed or its replay lines had no
    /// timestamps.
    MatchFinished {
        identity: String,
        record: MatchRecord,
        summary: StreakSummary,
        saved: bool,
    },
    /// The log source could not be opened or read.
    SourceError(String),
    /// Input ended; no further updates follow.
    Finished { lines: u64, duplicates: u64 },
}

// ── Tracker ───────────────────────────────────────────────────────────────────

pub struct Tracker {
    config: TrackerConfig,
    store: Box<dyn MatchStore + Send + Sync>,
    analyzer: StreakAnalyzer,
}

impl Tracker {
    pub fn new(config: TrackerConfig, store: impl MatchStore + Send + Sync + 'static) -> Self {
        let analyzer = StreakAnalyzer::new(config.quick_kill_window_ms);
        Self {
            config,
            store: Box::new(store),
            analyzer,
        }
    }

    /// Spawn the tracking loop.
    ///
    /// Returns the update receiver and a [`TrackerHandle`] to stop the loop.
    /// The channel closes once input ends (without `follow`) or the task is
    /// aborted.
    pub fn start(self) -> (mpsc::Receiver<TrackerUpdate>, TrackerHandle) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move {
            self.run(tx).await;
        });
        (rx, TrackerHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn run(self, tx: mpsc::Sender<TrackerUpdate>) {
        let reader = match self.open_source().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "cannot open log source");
                let _ = tx.send(TrackerUpdate::SourceError(e.to_string())).await;
                return;
            }
        };
        let mut lines = reader.lines();

        let mut driver = LineDriver::default();
        let mut batcher = UpdateBatcher::new(self.config.batch_size, self.config.batch_delay);
        let mut last_snapshot = driver.snapshot();
        let idle_ms = self.config.idle_timeout.as_millis() as u64;

        let mut idle_tick = time::interval(self.config.poll_interval);
        idle_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let follow = self.config.follows_file();
        let replay = self.config.replays_file();
        let mut at_eof = false;
        let mut last_stamp: Option<Timestamp> = None;
        // Set once the open match has seen a replayed line without a timestamp.
        let mut untimed = false;

        loop {
            let batch_due = batcher.deadline().map(Instant::from_std);
            let far = Instant::now() + Duration::from_secs(3_600);

            tokio::select! {
                line = lines.next_line(), if !at_eof => match line {
                    Ok(Some(text)) => {
                        let arrival = if replay {
                            match split_leading_timestamp(&text) {
                                Some((ts, _)) => {
                                    last_stamp = Some(ts);
                                    ts
                                }
                                None => {
                                    untimed = true;
                                    last_stamp.unwrap_or_else(now_millis)
                                }
                            }
                        } else {
                            now_millis()
                        };
                        let records = driver.process_line(&RawLine::new(text, arrival));
                        let persist = !untimed;
                        if driver.machine().phase() == SessionPhase::Idle {
                            untimed = false;
                        }
                        let identity = identity_of(&driver);
                        if !self.publish(&tx, records, identity, persist).await {
                            return;
                        }
                        let snapshot = driver.snapshot();
                        if snapshot != last_snapshot {
                            last_snapshot = snapshot.clone();
                            if let Some(batch) = batcher.push(snapshot, std::time::Instant::now()) {
                                if tx.send(TrackerUpdate::Live(batch)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) if follow => at_eof = true,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "error reading log source");
                        if tx.send(TrackerUpdate::SourceError(e.to_string())).await.is_err() || !follow {
                            break;
                        }
                        at_eof = true;
                    }
                },
                _ = time::sleep(self.config.poll_interval), if at_eof => {
                    at_eof = false;
                }
                _ = idle_tick.tick(), if !replay => {
                    if let Some(record) = driver.tick(now_millis(), idle_ms) {
                        let identity = identity_of(&driver);
                        if !self.publish(&tx, vec![record], identity, true).await {
                            return;
                        }
                    }
                }
                _ = time::sleep_until(batch_due.unwrap_or(far)), if batch_due.is_some() => {
                    if let Some(batch) = batcher.poll(std::time::Instant::now()) {
                        if tx.send(TrackerUpdate::Live(batch)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }

        // Input ended with a match still open: close it the way an unload would.
        let closed_at = match last_stamp {
            Some(ts) if replay => ts,
            _ => now_millis(),
        };
        if let Some(record) = driver.close(closed_at) {
            let identity = identity_of(&driver);
            if !self.publish(&tx, vec![record], identity, !untimed).await {
                return;
            }
        }
        let snapshot = driver.snapshot();
        if snapshot != last_snapshot {
            batcher.push(snapshot, std::time::Instant::now());
        }
        if let Some(batch) = batcher.flush() {
            let _ = tx.send(TrackerUpdate::Live(batch)).await;
        }

        let (line_count, duplicates) = driver.line_counts();
        tracing::info!(lines = line_count, duplicates, "log source finished");
        let _ = tx
            .send(TrackerUpdate::Finished {
                lines: line_count,
                duplicates,
            })
            .await;
    }

    async fn open_source(&self) -> frag_core::Result<Box<dyn AsyncBufRead + Send + Unpin>> {
        match &self.config.source {
            LogSource::File(path) => {
                let mut file =
                    tokio::fs::File::open(path)
                        .await
                        .map_err(|source| TrackerError::FileRead {
                            path: path.clone(),
                            source,
                        })?;
                if self.config.follow {
                    file.seek(std::io::SeekFrom::End(0))
                        .await
                        .map_err(|source| TrackerError::FileRead {
                            path: path.clone(),
                            source,
                        })?;
                }
                tracing::info!(path = %path.display(), follow = self.config.follow, "reading log file");
                Ok(Box::new(BufReader::new(file)))
            }
            LogSource::Stdin => {
                tracing::info!("reading log lines from stdin");
                Ok(Box::new(BufReader::new(tokio::io::stdin())))
            }
        }
    }

    /// Forward finished matches, saving them first when `persist` is set.
    /// Returns `false` once the receiver is gone.
    async fn publish(
        &self,
        tx: &mpsc::Sender<TrackerUpdate>,
        records: Vec<MatchRecord>,
        identity: String,
        persist: bool,
    ) -> bool {
        for record in records {
            let saved = if persist {
                match self.store.append(&identity, &record) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, identity = %identity, "failed to save match");
                        false
                    }
                }
            } else {
                tracing::info!(identity = %identity, "replayed match has untimed lines; not saved");
                false
            };
            let summary = self.analyzer.analyze(&record);
            let update = TrackerUpdate::MatchFinished {
                identity: identity.clone(),
                record,
                summary,
                saved,
            };
            if tx.send(update).await.is_err() {
                tracing::debug!("update channel closed; stopping tracker");
                return false;
            }
        }
        true
    }
}

// ── TrackerHandle ─────────────────────────────────────────────────────────────

/// Handle to the background tracker task.
pub struct TrackerHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl TrackerHandle {
    /// Stop the loop immediately. An open session is not saved.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

fn identity_of(driver: &LineDriver) -> String {
    driver
        .machine()
        .local_id()
        .unwrap_or(ANONYMOUS_IDENTITY)
        .to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
