use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TrackerError};

/// Milliseconds on the stream's clock. Live ingestion uses Unix epoch millis.
pub type Timestamp = u64;

/// Mutually exclusive ruleset classification of a match.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Normal,
    Special,
    Custom,
}

impl GameMode {
    /// Every mode in partition order.
    pub const ALL: [GameMode; 3] = [GameMode::Normal, GameMode::Special, GameMode::Custom];

    /// The canonical lowercase string identifier for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Normal => "normal",
            GameMode::Special => "special",
            GameMode::Custom => "custom",
        }
    }

    /// The mode in effect after `event`.
    ///
    /// A declaration replaces the current mode outright, so Special and Custom
    /// never coexist. A confirmed exit drops back to Normal. Every other event,
    /// including a game-over or an unload, leaves the mode as it was.
    pub fn transition(self, event: &DomainEvent) -> GameMode {
        match event {
            DomainEvent::ModeDeclared { mode } => *mode,
            DomainEvent::SessionEnded {
                cause: EndCause::ExitConfirmed,
                ..
            } => GameMode::Normal,
            _ => self,
        }
    }
}

impl FromStr for GameMode {
    type Err = TrackerError;

    /// Case-insensitive construction from `"normal"`, `"special"` or `"custom"`.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "normal" => Ok(GameMode::Normal),
            "special" => Ok(GameMode::Special),
            "custom" => Ok(GameMode::Custom),
            other => Err(TrackerError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic line as it arrived from the game client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub text: String,
    pub arrival_time: Timestamp,
}

impl RawLine {
    pub fn new(text: impl Into<String>, arrival_time: Timestamp) -> Self {
        Self {
            text: text.into(),
            arrival_time,
        }
    }
}

/// Which marker closed a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndCause {
    /// The client reported the match as over.
    GameOver,
    /// The player confirmed leaving the match.
    ExitConfirmed,
    /// The client started reloading or unloading; the normal end never came.
    Unload,
}

/// A typed fact recognised in a single diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    AuthIdentified {
        id: String,
    },
    ModeDeclared {
        mode: GameMode,
    },
    SessionJoined,
    SessionStarted,
    SessionEnded {
        quit: bool,
        cause: EndCause,
    },
    /// A kill was scored. `subject_is_local` is set when the line is written
    /// from the local player's point of view.
    PlayerKilled {
        subject_is_local: bool,
        killer: Option<String>,
        victim: Option<String>,
    },
    /// Someone died. `killer` is `None` for non-player opponents.
    PlayerDied {
        subject_is_local: bool,
        killer: Option<String>,
    },
    PowerUpCollected,
    PowerUpUsed,
    MapDetected {
        name: String,
    },
    MatchCodeDetected {
        code: String,
    },
    PlayerDetected {
        name: String,
    },
}

impl DomainEvent {
    /// Short stable label, used in log output.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::AuthIdentified { .. } => "auth",
            DomainEvent::ModeDeclared { .. } => "mode",
            DomainEvent::SessionJoined => "joined",
            DomainEvent::SessionStarted => "started",
            DomainEvent::SessionEnded { .. } => "ended",
            DomainEvent::PlayerKilled { .. } => "kill",
            DomainEvent::PlayerDied { .. } => "death",
            DomainEvent::PowerUpCollected => "powerup_collected",
            DomainEvent::PowerUpUsed => "powerup_used",
            DomainEvent::MapDetected { .. } => "map",
            DomainEvent::MatchCodeDetected { .. } => "match_code",
            DomainEvent::PlayerDetected { .. } => "player",
        }
    }
}

/// Immutable snapshot of a finished match.
///
/// Field names are part of the persisted format: historical records are
/// re-read and re-aggregated, so fields added later carry `#[serde(default)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub kills: u32,
    pub deaths: u32,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// `end_time - start_time` in milliseconds.
    pub duration: u64,
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub joined: bool,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub quit: bool,
    pub kill_timestamps: Vec<Timestamp>,
    pub death_timestamps: Vec<Timestamp>,
    #[serde(default)]
    pub players: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_code: Option<String>,
    #[serde(default)]
    pub power_ups_collected: u32,
    #[serde(default)]
    pub power_ups_used: u32,
}

impl MatchRecord {
    /// Check the record's structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.end_time < self.start_time {
            return Err(TrackerError::InvalidRecord(format!(
                "end time {} precedes start time {}",
                self.end_time, self.start_time
            )));
        }
        if self.duration != self.end_time - self.start_time {
            return Err(TrackerError::InvalidRecord(format!(
                "duration {} does not match end - start ({})",
                self.duration,
                self.end_time - self.start_time
            )));
        }
        if self.kills as usize != self.kill_timestamps.len() {
            return Err(TrackerError::InvalidRecord(format!(
                "{} kills but {} kill timestamps",
                self.kills,
                self.kill_timestamps.len()
            )));
        }
        if self.deaths as usize != self.death_timestamps.len() {
            return Err(TrackerError::InvalidRecord(format!(
                "{} deaths but {} death timestamps",
                self.deaths,
                self.death_timestamps.len()
            )));
        }
        Ok(())
    }

    /// Kills-to-deaths ratio; equal to kills when there were no deaths.
    pub fn kdr(&self) -> f64 {
        kdr(self.kills as u64, self.deaths as u64)
    }

    /// `true` when the match ran to its end rather than being quit.
    pub fn completed(&self) -> bool {
        !self.quit
    }
}

/// Kills-to-deaths ratio with the zero-deaths convention (ratio = kills).
pub fn kdr(kills: u64, deaths: u64) -> f64 {
    if deaths == 0 {
        kills as f64
    } else {
        kills as f64 / deaths as f64
    }
}

/// Named quick-kill combo sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickKill {
    Double,
    Triple,
    Quad,
    Penta,
    Hexa,
    Hepta,
}

impl QuickKill {
    /// Map a combo size to its counter; sizes outside 2–7 have none.
    pub fn from_combo_size(size: u32) -> Option<Self> {
        match size {
            2 => Some(QuickKill::Double),
            3 => Some(QuickKill::Triple),
            4 => Some(QuickKill::Quad),
            5 => Some(QuickKill::Penta),
            6 => Some(QuickKill::Hexa),
            7 => Some(QuickKill::Hepta),
            _ => None,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            QuickKill::Double => 2,
            QuickKill::Triple => 3,
            QuickKill::Quad => 4,
            QuickKill::Penta => 5,
            QuickKill::Hexa => 6,
            QuickKill::Hepta => 7,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QuickKill::Double => "Double Kill",
            QuickKill::Triple => "Triple Kill",
            QuickKill::Quad => "Quad Kill",
            QuickKill::Penta => "Penta Kill",
            QuickKill::Hexa => "Hexa Kill",
            QuickKill::Hepta => "Hepta Kill",
        }
    }
}

/// Streak analytics for one match, or summed across many.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub max_kill_streak: u32,
    /// Milestone threshold → number of lives that reached it.
    #[serde(default)]
    pub milestone_counts: BTreeMap<u32, u32>,
    #[serde(default)]
    pub quick_kill_counts: BTreeMap<QuickKill, u32>,
}

impl StreakSummary {
    /// Add `other`'s counters into `self`; the max streak takes the larger value.
    pub fn merge(&mut self, other: &StreakSummary) {
        self.max_kill_streak = self.max_kill_streak.max(other.max_kill_streak);
        for (threshold, count) in &other.milestone_counts {
            *self.milestone_counts.entry(*threshold).or_default() += count;
        }
        for (combo, count) in &other.quick_kill_counts {
            *self.quick_kill_counts.entry(*combo).or_default() += count;
        }
    }

    pub fn milestone(&self, threshold: u32) -> u32 {
        self.milestone_counts.get(&threshold).copied().unwrap_or(0)
    }

    pub fn quick_kills(&self, combo: QuickKill) -> u32 {
        self.quick_kill_counts.get(&combo).copied().unwrap_or(0)
    }
}

/// Five sub-ratings and the weighted overall, each in `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSet {
    pub attack: u8,
    pub defense: u8,
    pub consistency: u8,
    pub experience: u8,
    pub performance: u8,
    pub overall: u8,
}

/// Running game counters kept next to the persisted match log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCounters {
    #[serde(default)]
    pub games_joined: u64,
    #[serde(default)]
    pub games_started: u64,
    #[serde(default)]
    pub games_quit: u64,
    #[serde(default)]
    pub matches_completed: u64,
}

impl StoreCounters {
    /// Count one finished match.
    pub fn record(&mut self, record: &MatchRecord) {
        if record.joined {
            self.games_joined += 1;
        }
        if record.started {
            self.games_started += 1;
        }
        if record.quit {
            self.games_quit += 1;
        } else {
            self.matches_completed += 1;
        }
    }
}

/// Counters for the match in progress, pushed to live displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveSnapshot {
    pub active: bool,
    pub mode: GameMode,
    pub kills: u32,
    pub deaths: u32,
    pub current_streak: u32,
    pub map: Option<String>,
}
