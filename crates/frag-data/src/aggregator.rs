//! Match history aggregation, per mode and across all modes.

use std::collections::BTreeMap;

use frag_core::models::{kdr, GameMode, MatchRecord, RatingSet, StoreCounters, StreakSummary};
use frag_core::ratings::{RatingCalculator, RatingSource};
use serde::Serialize;
use tracing::{debug, warn};

use crate::streaks::StreakAnalyzer;

// ── AggregateStatistics ───────────────────────────────────────────────────────

/// Totals, records and streak counters accumulated across matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateStatistics {
    pub matches: u64,
    pub total_kills: u64,
    pub total_deaths: u64,
    pub time_played_ms: u64,
    pub highest_kills: u32,
    pub highest_deaths: u32,
    /// Best single-match KDR (kills when the match had no deaths).
    pub highest_kdr: f64,
    pub longest_match_ms: u64,
    pub highest_kill_streak: u32,
    /// Milestone and quick-kill counters summed over every match.
    pub streaks: StreakSummary,
    pub games_joined: u64,
    pub games_started: u64,
    pub games_quit: u64,
    pub games_completed: u64,
    pub power_ups_collected: u64,
    pub power_ups_used: u64,
}

impl AggregateStatistics {
    /// Fold one match and its streak summary into the running totals.
    pub fn add_record(&mut self, record: &MatchRecord, summary: &StreakSummary) {
        self.matches += 1;
        self.total_kills += record.kills as u64;
        self.total_deaths += record.deaths as u64;
        self.time_played_ms = self.time_played_ms.saturating_add(record.duration);

        self.highest_kills = self.highest_kills.max(record.kills);
        self.highest_deaths = self.highest_deaths.max(record.deaths);
        self.highest_kdr = self.highest_kdr.max(record.kdr());
        self.longest_match_ms = self.longest_match_ms.max(record.duration);
        self.highest_kill_streak = self.highest_kill_streak.max(summary.max_kill_streak);
        self.streaks.merge(summary);

        if record.joined {
            self.games_joined += 1;
        }
        if record.started {
            self.games_started += 1;
        }
        if record.quit {
            self.games_quit += 1;
        } else {
            self.games_completed += 1;
        }
        self.power_ups_collected += record.power_ups_collected as u64;
        self.power_ups_used += record.power_ups_used as u64;
    }

    /// Combine two disjoint partitions.
    pub fn merge(&mut self, other: &AggregateStatistics) {
        self.matches += other.matches;
        self.total_kills += other.total_kills;
        self.total_deaths += other.total_deaths;
        self.time_played_ms = self.time_played_ms.saturating_add(other.time_played_ms);

        self.highest_kills = self.highest_kills.max(other.highest_kills);
        self.highest_deaths = self.highest_deaths.max(other.highest_deaths);
        self.highest_kdr = self.highest_kdr.max(other.highest_kdr);
        self.longest_match_ms = self.longest_match_ms.max(other.longest_match_ms);
        self.highest_kill_streak = self.highest_kill_streak.max(other.highest_kill_streak);
        self.streaks.merge(&other.streaks);

        self.games_joined += other.games_joined;
        self.games_started += other.games_started;
        self.games_quit += other.games_quit;
        self.games_completed += other.games_completed;
        self.power_ups_collected += other.power_ups_collected;
        self.power_ups_used += other.power_ups_used;
    }

    /// Lifetime KDR over the partition.
    pub fn kdr(&self) -> f64 {
        kdr(self.total_kills, self.total_deaths)
    }

    pub fn minutes_played(&self) -> f64 {
        self.time_played_ms as f64 / 60_000.0
    }

    pub fn kills_per_minute(&self) -> f64 {
        RatingCalculator::kills_per_minute(self)
    }

    pub fn deaths_per_minute(&self) -> f64 {
        RatingCalculator::deaths_per_minute(self)
    }

    pub fn ratings(&self) -> RatingSet {
        RatingCalculator::calculate(self)
    }
}

impl RatingSource for AggregateStatistics {
    fn total_kills(&self) -> u64 {
        self.total_kills
    }

    fn total_deaths(&self) -> u64 {
        self.total_deaths
    }

    fn minutes_played(&self) -> f64 {
        AggregateStatistics::minutes_played(self)
    }

    fn completed(&self) -> u64 {
        self.games_completed
    }

    fn quit(&self) -> u64 {
        self.games_quit
    }
}

// ── AggregateFilter ───────────────────────────────────────────────────────────

/// Optional restriction of the fold to one mode and/or one arena.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateFilter {
    pub mode: Option<GameMode>,
    /// Arena name, compared case-insensitively.
    pub map: Option<String>,
}

impl AggregateFilter {
    pub fn matches(&self, record: &MatchRecord) -> bool {
        if let Some(mode) = self.mode {
            if record.mode != mode {
                return false;
            }
        }
        if let Some(map) = &self.map {
            match &record.map {
                Some(name) if name.eq_ignore_ascii_case(map) => {}
                _ => return false,
            }
        }
        true
    }
}

// ── AggregateReport ───────────────────────────────────────────────────────────

/// Per-mode partitions plus the combined view derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateReport {
    pub all: AggregateStatistics,
    pub by_mode: BTreeMap<GameMode, AggregateStatistics>,
    /// Records dropped because they were undecodable or inconsistent.
    pub skipped_records: usize,
}

impl AggregateReport {
    /// Statistics for one mode (empty when no match of that mode was seen).
    pub fn mode(&self, mode: GameMode) -> AggregateStatistics {
        self.by_mode.get(&mode).cloned().unwrap_or_default()
    }
}

// ── StatsAggregator ───────────────────────────────────────────────────────────

/// Folds match history into an [`AggregateReport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAggregator {
    analyzer: StreakAnalyzer,
}

impl StatsAggregator {
    pub fn new(analyzer: StreakAnalyzer) -> Self {
        Self { analyzer }
    }

    /// Aggregate `records` that pass `filter`.
    ///
    /// Each valid record is folded exactly once, into its mode's partition;
    /// `all` is the merge of the partitions. Records that fail
    /// [`MatchRecord::validate`] are skipped and counted.
    pub fn aggregate(&self, records: &[MatchRecord], filter: &AggregateFilter) -> AggregateReport {
        let mut report = AggregateReport::default();

        for record in records {
            if let Err(e) = record.validate() {
                warn!(error = %e, "skipping inconsistent match record");
                report.skipped_records += 1;
                continue;
            }
            if !filter.matches(record) {
                continue;
            }
            let summary = self.analyzer.analyze(record);
            report
                .by_mode
                .entry(record.mode)
                .or_default()
                .add_record(record, &summary);
        }

        for stats in report.by_mode.values() {
            report.all.merge(stats);
        }

        debug!(
            matches = report.all.matches,
            skipped = report.skipped_records,
            "aggregated match history"
        );
        report
    }

    /// Aggregate raw persisted JSON values, skipping any that do not decode.
    pub fn aggregate_values(
        &self,
        values: &[serde_json::Value],
        filter: &AggregateFilter,
    ) -> AggregateReport {
        let mut undecodable = 0usize;
        let records: Vec<MatchRecord> = values
            .iter()
            .filter_map(|v| match serde_json::from_value::<MatchRecord>(v.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable match record");
                    undecodable += 1;
                    None
                }
            })
            .collect();

        let mut report = self.aggregate(&records, filter);
        report.skipped_records += undecodable;
        report
    }
}

/// Rebuild the store's running counters from the full match log.
pub fn recompute_counters(records: &[MatchRecord]) -> StoreCounters {
    let mut counters = StoreCounters::default();
    for record in records.iter().filter(|r| r.validate().is_ok()) {
        counters.record(record);
    }
    counters
}

// ── Tests ─────────────────────────────────────────────────────────────────────
