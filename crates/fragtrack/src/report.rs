//! Plain-text rendering of live counters, summaries and match history.

use std::fmt::Write;

use frag_core::formatting::{
    format_count, format_duration_ms, format_ratio, format_timestamp, rating_bar,
};
use frag_core::models::{
    GameMode, LiveSnapshot, MatchRecord, QuickKill, StoreCounters, StreakSummary,
};
use frag_data::aggregator::{AggregateReport, AggregateStatistics};
use frag_data::streaks::MILESTONE_THRESHOLDS;

const BAR_WIDTH: usize = 20;

const QUICK_KILLS: [QuickKill; 6] = [
    QuickKill::Double,
    QuickKill::Triple,
    QuickKill::Quad,
    QuickKill::Penta,
    QuickKill::Hexa,
    QuickKill::Hepta,
];

// ── Live view ─────────────────────────────────────────────────────────────────

/// One status line for the match in progress.
pub fn render_live(snapshot: &LiveSnapshot) -> String {
    if !snapshot.active {
        return format!("[idle] mode {}", snapshot.mode);
    }
    let mut line = format!(
        "[live] {} | K {} D {} | streak {}",
        snapshot.mode, snapshot.kills, snapshot.deaths, snapshot.current_streak
    );
    if let Some(map) = &snapshot.map {
        let _ = write!(line, " | {}", map);
    }
    line
}

/// Summary line for a match that just ended.
pub fn render_finished(identity: &str, record: &MatchRecord, summary: &StreakSummary) -> String {
    let outcome = if record.completed() { "completed" } else { "quit" };
    let mut line = format!(
        "[done] {} {} {} | K {} D {} | KDR {} | best streak {} | {}",
        identity,
        record.mode,
        outcome,
        record.kills,
        record.deaths,
        format_ratio(record.kdr()),
        summary.max_kill_streak,
        format_duration_ms(record.duration),
    );
    let combos: Vec<String> = QUICK_KILLS
        .iter()
        .filter(|q| summary.quick_kills(**q) > 0)
        .map(|q| format!("{} x{}", q.label(), summary.quick_kills(*q)))
        .collect();
    if !combos.is_empty() {
        let _ = write!(line, " | {}", combos.join(", "));
    }
    line
}

// ── Summary view ──────────────────────────────────────────────────────────────

/// Lifecycle counters for one identity.
pub fn render_counters(identity: &str, counters: &StoreCounters) -> String {
    format!(
        "Identity {}: {} joined, {} started, {} quit, {} completed",
        identity,
        format_count(counters.games_joined),
        format_count(counters.games_started),
        format_count(counters.games_quit),
        format_count(counters.matches_completed)
    )
}

/// The identities with saved history, for a summary run without `--identity`.
pub fn render_identities(identities: &[String]) -> String {
    if identities.is_empty() {
        "Identities: none".to_string()
    } else {
        format!("Identities: {}", identities.join(", "))
    }
}

/// Full statistics report: the combined view followed by each mode played.
pub fn render_summary(report: &AggregateReport) -> String {
    let mut out = String::new();
    if report.all.matches == 0 {
        out.push_str("No matches recorded.\n");
    } else {
        render_section(&mut out, "All modes", &report.all);
        for mode in GameMode::ALL {
            if let Some(stats) = report.by_mode.get(&mode) {
                out.push('\n');
                render_section(&mut out, &format!("Mode: {}", mode), stats);
            }
        }
    }
    if report.skipped_records > 0 {
        let _ = writeln!(
            out,
            "\n{} corrupt record(s) skipped",
            report.skipped_records
        );
    }
    out
}

fn render_section(out: &mut String, title: &str, stats: &AggregateStatistics) {
    let _ = writeln!(out, "== {} ==", title);
    let _ = writeln!(
        out,
        "Matches   {:>8}   completed {}  quit {}  joined {}  started {}",
        format_count(stats.matches),
        format_count(stats.games_completed),
        format_count(stats.games_quit),
        format_count(stats.games_joined),
        format_count(stats.games_started),
    );
    let _ = writeln!(
        out,
        "Kills     {:>8}   per min {}",
        format_count(stats.total_kills),
        format_ratio(stats.kills_per_minute())
    );
    let _ = writeln!(
        out,
        "Deaths    {:>8}   per min {}",
        format_count(stats.total_deaths),
        format_ratio(stats.deaths_per_minute())
    );
    let _ = writeln!(out, "KDR       {:>8}", format_ratio(stats.kdr()));
    let _ = writeln!(out, "Played    {:>8}", format_duration_ms(stats.time_played_ms));
    let _ = writeln!(
        out,
        "Records   kills {}  deaths {}  KDR {}  streak {}  longest {}",
        stats.highest_kills,
        stats.highest_deaths,
        format_ratio(stats.highest_kdr),
        stats.highest_kill_streak,
        format_duration_ms(stats.longest_match_ms),
    );

    let milestones: Vec<String> = MILESTONE_THRESHOLDS
        .iter()
        .filter(|t| stats.streaks.milestone(**t) > 0)
        .map(|t| format!("{}:{}", t, stats.streaks.milestone(*t)))
        .collect();
    if !milestones.is_empty() {
        let _ = writeln!(out, "Streaks   {}", milestones.join("  "));
    }
    let combos: Vec<String> = QUICK_KILLS
        .iter()
        .filter(|q| stats.streaks.quick_kills(**q) > 0)
        .map(|q| format!("{} {}", q.label(), stats.streaks.quick_kills(*q)))
        .collect();
    if !combos.is_empty() {
        let _ = writeln!(out, "Combos    {}", combos.join("  "));
    }

    let ratings = stats.ratings();
    for (name, value) in [
        ("ATK", ratings.attack),
        ("DEF", ratings.defense),
        ("CNS", ratings.consistency),
        ("EXP", ratings.experience),
        ("PRF", ratings.performance),
        ("OVR", ratings.overall),
    ] {
        let _ = writeln!(out, "{} {:>3} {}", name, value, rating_bar(value, BAR_WIDTH));
    }
}

// ── History view ──────────────────────────────────────────────────────────────

/// Most recent matches first, at most `limit` rows.
pub fn render_history(records: &[MatchRecord], limit: usize) -> String {
    if records.is_empty() {
        return "No matches recorded.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16}  {:<7}  {:<16}  {:>3}  {:>3}  {:>6}  {:>7}  {}",
        "Started", "Mode", "Map", "K", "D", "KDR", "Length", "Result"
    );
    for record in records.iter().rev().take(limit) {
        let _ = writeln!(
            out,
            "{:<16}  {:<7}  {:<16}  {:>3}  {:>3}  {:>6}  {:>7}  {}",
            format_timestamp(record.start_time),
            record.mode.as_str(),
            record.map.as_deref().unwrap_or("-"),
            record.kills,
            record.deaths,
            format_ratio(record.kdr()),
            format_duration_ms(record.duration),
            if record.completed() { "done" } else { "quit" },
        );
    }
    out
}
