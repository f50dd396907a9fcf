//! Kill-streak and quick-kill analysis over a match's kill/death timeline.

use frag_core::models::{MatchRecord, QuickKill, StreakSummary, Timestamp};
use frag_core::settings::DEFAULT_QUICK_KILL_WINDOW_MS;

/// Streak lengths that earn a milestone, in ascending order.
pub const MILESTONE_THRESHOLDS: [u32; 8] = [3, 5, 7, 10, 15, 20, 25, 30];

/// Timeline entry kind. `Death` sorts before `Kill` so that a death ends the
/// preceding life when both share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Mark {
    Death,
    Kill,
}

/// Per-life sweep state.
#[derive(Debug, Default)]
struct Life {
    streak: u32,
    credited: [bool; MILESTONE_THRESHOLDS.len()],
    combo: u32,
    last_kill: Option<Timestamp>,
}

// ── StreakAnalyzer ────────────────────────────────────────────────────────────

/// Computes [`StreakSummary`]s with a fixed quick-kill window.
#[derive(Debug, Clone, Copy)]
pub struct StreakAnalyzer {
    /// Largest gap (inclusive) between two kills that keeps a combo going.
    quick_kill_window_ms: u64,
}

impl Default for StreakAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_QUICK_KILL_WINDOW_MS)
    }
}

impl StreakAnalyzer {
    pub fn new(quick_kill_window_ms: u64) -> Self {
        Self {
            quick_kill_window_ms,
        }
    }

    pub fn quick_kill_window_ms(&self) -> u64 {
        self.quick_kill_window_ms
    }

    /// Analyse one finished match.
    pub fn analyze(&self, record: &MatchRecord) -> StreakSummary {
        self.analyze_timestamps(&record.kill_timestamps, &record.death_timestamps)
    }

    /// Sweep the merged kill/death timeline.
    ///
    /// 1. Kills and deaths are merged and sorted by time, deaths first on ties.
    /// 2. A death closes the current life: its streak feeds the maximum, and
    ///    the credited milestones and the quick-kill combo are reset.
    /// 3. A kill extends the streak; each milestone is credited at most once
    ///    per life.
    /// 4. A kill within the window of the previous kill grows the combo;
    ///    otherwise the combo restarts at 1. Combo sizes 2–7 are counted once
    ///    each time a combo first reaches them.
    pub fn analyze_timestamps(&self, kills: &[Timestamp], deaths: &[Timestamp]) -> StreakSummary {
        let mut timeline: Vec<(Timestamp, Mark)> = kills
            .iter()
            .map(|&t| (t, Mark::Kill))
            .chain(deaths.iter().map(|&t| (t, Mark::Death)))
            .collect();
        timeline.sort();

        let mut summary = StreakSummary::default();
        let mut life = Life::default();

        for (time, mark) in timeline {
            match mark {
                Mark::Death => {
                    summary.max_kill_streak = summary.max_kill_streak.max(life.streak);
                    life = Life::default();
                }
                Mark::Kill => {
                    life.streak += 1;
                    summary.max_kill_streak = summary.max_kill_streak.max(life.streak);
                    self.credit_milestones(&mut life, &mut summary);
                    self.extend_combo(&mut life, &mut summary, time);
                }
            }
        }

        summary
    }

    fn credit_milestones(&self, life: &mut Life, summary: &mut StreakSummary) {
        for (idx, threshold) in MILESTONE_THRESHOLDS.iter().enumerate() {
            if life.streak >= *threshold && !life.credited[idx] {
                life.credited[idx] = true;
                *summary.milestone_counts.entry(*threshold).or_default() += 1;
            }
        }
    }

    fn extend_combo(&self, life: &mut Life, summary: &mut StreakSummary, time: Timestamp) {
        life.combo = match life.last_kill {
            Some(prev) if time.saturating_sub(prev) <= self.quick_kill_window_ms => life.combo + 1,
            _ => 1,
        };
        life.last_kill = Some(time);

        if let Some(combo) = QuickKill::from_combo_size(life.combo) {
            *summary.quick_kill_counts.entry(combo).or_default() += 1;
        }
    }
}

/// Kills since the most recent death, for live display.
///
/// A kill sharing its timestamp with the last death counts as the first kill
/// of the new life.
pub fn current_streak(kills: &[Timestamp], deaths: &[Timestamp]) -> u32 {
    match deaths.iter().max() {
        Some(&last_death) => kills.iter().filter(|&&t| t >= last_death).count() as u32,
        None => kills.len() as u32,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
