//! The match-in-progress state machine.
//!
//! [`SessionMachine`] consumes [`DomainEvent`]s in arrival order and owns the
//! single [`SessionState`]. When a session closes it builds the
//! [`MatchRecord`] and resets itself in the same call, so no caller can see
//! a record while the old state is still in place.

use std::collections::{BTreeMap, BTreeSet};

use frag_core::models::{
    DomainEvent, EndCause, GameMode, LiveSnapshot, MatchRecord, Timestamp,
};
use frag_data::streaks::current_streak;

// ── Public types ──────────────────────────────────────────────────────────────

/// Lifecycle phase of the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
    /// `end_time` is fixed and the record is being built. Only
    /// [`SessionMachine`] internals see this phase.
    Closing,
}

/// Everything known about the match currently being played.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub mode: GameMode,
    pub start_time: Timestamp,
    /// Set when the session closes.
    pub end_time: Option<Timestamp>,
    pub last_activity: Timestamp,
    pub local_id: Option<String>,
    pub kills: u32,
    pub deaths: u32,
    pub kill_timestamps: Vec<Timestamp>,
    pub death_timestamps: Vec<Timestamp>,
    pub joined: bool,
    pub started: bool,
    pub quit: bool,
    pub detected_players: BTreeSet<String>,
    pub current_map: Option<String>,
    pub match_code: Option<String>,
    pub power_ups_collected: u32,
    pub power_ups_used: u32,
    /// Deaths of other players, keyed by name. Kept for display only; it is
    /// not part of the persisted record.
    pub opponent_deaths: BTreeMap<String, u32>,
    pub closed: bool,
}

impl SessionState {
    /// A fresh idle state that remembers who the local player is and which
    /// mode is in effect.
    fn carried_over(mode: GameMode, local_id: Option<String>) -> Self {
        Self {
            mode,
            local_id,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }
}

// ── SessionMachine ────────────────────────────────────────────────────────────

/// Owns the [`SessionState`] and applies events to it.
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
    finalized: u64,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Public API ────────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn mode(&self) -> GameMode {
        self.state.mode
    }

    pub fn local_id(&self) -> Option<&str> {
        self.state.local_id.as_deref()
    }

    /// Number of records emitted since construction.
    pub fn finalized_count(&self) -> u64 {
        self.finalized
    }

    /// Apply one event observed at `now`.
    ///
    /// Returns the finished match when the event closed a session.
    pub fn apply(&mut self, event: &DomainEvent, now: Timestamp) -> Option<MatchRecord> {
        if self.state.is_active() {
            self.state.last_activity = now;
        }

        match event {
            DomainEvent::AuthIdentified { id } => {
                if self.state.local_id.as_deref() != Some(id.as_str()) {
                    tracing::info!(id = %id, "local player identified");
                    self.state.local_id = Some(id.clone());
                }
                None
            }
            DomainEvent::ModeDeclared { .. } => {
                self.state.mode = self.state.mode.transition(event);
                None
            }
            DomainEvent::SessionJoined => {
                self.ensure_active(now);
                if !self.state.started {
                    self.state.joined = true;
                }
                None
            }
            DomainEvent::SessionStarted => {
                self.ensure_active(now);
                self.state.started = true;
                self.state.joined = false;
                None
            }
            DomainEvent::SessionEnded { quit, cause } => {
                let record = self.end_session(*quit, *cause, now);
                // Mode changes only after the record captured it.
                self.state.mode = self.state.mode.transition(event);
                record
            }
            DomainEvent::PlayerKilled {
                subject_is_local,
                killer,
                victim,
            } => {
                self.on_kill(*subject_is_local, killer.as_deref(), victim.as_deref(), now);
                None
            }
            DomainEvent::PlayerDied {
                subject_is_local,
                killer,
            } => {
                self.on_death(*subject_is_local, killer.as_deref(), now);
                None
            }
            DomainEvent::PowerUpCollected => {
                if self.require_active("powerup_collected") {
                    self.state.power_ups_collected += 1;
                }
                None
            }
            DomainEvent::PowerUpUsed => {
                if self.require_active("powerup_used") {
                    self.state.power_ups_used += 1;
                }
                None
            }
            DomainEvent::MapDetected { name } => {
                self.state.current_map = Some(name.clone());
                None
            }
            DomainEvent::MatchCodeDetected { code } => {
                self.state.match_code = Some(code.clone());
                None
            }
            DomainEvent::PlayerDetected { name } => {
                self.note_player(name);
                None
            }
        }
    }

    /// Close an active session that has seen no events for `timeout_ms`.
    ///
    /// The session is recorded as quit.
    pub fn check_idle(&mut self, now: Timestamp, timeout_ms: u64) -> Option<MatchRecord> {
        if !self.state.is_active() || self.state.closed {
            return None;
        }
        let idle_for = now.saturating_sub(self.state.last_activity);
        if idle_for < timeout_ms {
            return None;
        }
        tracing::info!(idle_ms = idle_for, "closing idle session");
        Some(self.finalize(true, now))
    }

    /// Close any active session as quit, e.g. when the input ends.
    pub fn force_close(&mut self, now: Timestamp) -> Option<MatchRecord> {
        if !self.state.is_active() || self.state.closed {
            return None;
        }
        Some(self.finalize(true, now))
    }

    /// Counters for live display.
    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            active: self.state.is_active(),
            mode: self.state.mode,
            kills: self.state.kills,
            deaths: self.state.deaths,
            current_streak: current_streak(
                &self.state.kill_timestamps,
                &self.state.death_timestamps,
            ),
            map: self.state.current_map.clone(),
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn ensure_active(&mut self, now: Timestamp) {
        if self.state.is_active() {
            return;
        }
        let state = &mut self.state;
        state.phase = SessionPhase::Active;
        state.start_time = now;
        state.end_time = None;
        state.last_activity = now;
        state.kills = 0;
        state.deaths = 0;
        state.kill_timestamps.clear();
        state.death_timestamps.clear();
        state.detected_players.clear();
        state.opponent_deaths.clear();
        state.power_ups_collected = 0;
        state.power_ups_used = 0;
        state.joined = false;
        state.started = false;
        state.quit = false;
        state.closed = false;
        tracing::info!(mode = %state.mode, start_time = now, "session started");
    }

    fn require_active(&self, kind: &str) -> bool {
        if !self.state.is_active() {
            tracing::debug!(kind, "ignoring event outside a session");
            return false;
        }
        true
    }

    fn is_local(&self, name: Option<&str>) -> bool {
        matches!((name, self.state.local_id.as_deref()), (Some(n), Some(id)) if n == id)
    }

    fn note_player(&mut self, name: &str) {
        if self.state.local_id.as_deref() != Some(name) {
            self.state.detected_players.insert(name.to_string());
        }
    }

    fn on_kill(
        &mut self,
        subject_is_local: bool,
        killer: Option<&str>,
        victim: Option<&str>,
        now: Timestamp,
    ) {
        if !self.require_active("kill") {
            return;
        }

        if subject_is_local || self.is_local(killer) {
            self.record_kill(now);
        } else if self.is_local(victim) {
            self.record_death(now);
        } else if let Some(v) = victim {
            if self.state.detected_players.contains(v) {
                *self.state.opponent_deaths.entry(v.to_string()).or_default() += 1;
            }
        }

        for name in [killer, victim].into_iter().flatten() {
            self.note_player(name);
        }
    }

    fn on_death(&mut self, subject_is_local: bool, killer: Option<&str>, now: Timestamp) {
        if !self.require_active("death") {
            return;
        }
        if subject_is_local {
            self.record_death(now);
        } else {
            tracing::debug!("ignoring death of another player");
        }
        if let Some(name) = killer {
            self.note_player(name);
        }
    }

    fn record_kill(&mut self, now: Timestamp) {
        self.state.kills += 1;
        self.state.kill_timestamps.push(now);
    }

    fn record_death(&mut self, now: Timestamp) {
        self.state.deaths += 1;
        self.state.death_timestamps.push(now);
    }

    fn end_session(&mut self, quit: bool, cause: EndCause, now: Timestamp) -> Option<MatchRecord> {
        if !self.state.is_active() || self.state.closed {
            tracing::debug!(?cause, "end marker outside a session");
            return None;
        }
        Some(self.finalize(quit, now))
    }

    /// Build the record and reset, in one step.
    fn finalize(&mut self, quit: bool, now: Timestamp) -> MatchRecord {
        self.state.phase = SessionPhase::Closing;
        self.state.closed = true;
        self.state.quit = quit;
        self.state.end_time = Some(now.max(self.state.start_time));

        let record = self.closing_record();

        tracing::info!(
            mode = %record.mode,
            kills = record.kills,
            deaths = record.deaths,
            quit,
            duration_ms = record.duration,
            "session finalized"
        );

        let mode = self.state.mode;
        let local_id = self.state.local_id.take();
        self.state = SessionState::carried_over(mode, local_id);
        self.finalized += 1;
        record
    }

    /// Snapshot of a session in the `Closing` phase.
    fn closing_record(&self) -> MatchRecord {
        debug_assert_eq!(self.state.phase, SessionPhase::Closing);
        let state = &self.state;
        let end_time = state.end_time.unwrap_or(state.start_time);
        MatchRecord {
            kills: state.kills,
            deaths: state.deaths,
            start_time: state.start_time,
            end_time,
            duration: end_time - state.start_time,
            mode: state.mode,
            joined: state.joined,
            started: state.started,
            quit: state.quit,
            kill_timestamps: state.kill_timestamps.clone(),
            death_timestamps: state.death_timestamps.clone(),
            players: state.detected_players.iter().cloned().collect(),
            map: state.current_map.clone(),
            match_code: state.match_code.clone(),
            power_ups_collected: state.power_ups_collected,
            power_ups_used: state.power_ups_used,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ended(cause: EndCause) -> DomainEvent {
        DomainEvent::SessionEnded {
            quit: cause != EndCause::GameOver,
            cause,
        }
    }

    fn local_kill() -> DomainEvent {
        DomainEvent::PlayerKilled {
            subject_is_local: true,
            killer: None,
            victim: Some("Vex".to_string()),
        }
    }

    fn local_death() -> DomainEvent {
        DomainEvent::PlayerDied {
            subject_is_local: true,
            killer: Some("Vex".to_string()),
        }
    }

    fn declare(mode: GameMode) -> DomainEvent {
        DomainEvent::ModeDeclared { mode }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn test_new_machine_is_idle() {
        let machine = SessionMachine::new();
        assert_eq!(machine.phase(), SessionPhase::Idle);
        assert_eq!(machine.mode(), GameMode::Normal);
        assert!(!machine.snapshot().active);
    }

    #[test]
    fn test_join_start_end_produces_started_record() {
        let mut m = SessionMachine::new();
        assert!(m.apply(&DomainEvent::SessionJoined, 1_000).is_none());
        assert!(m.apply(&DomainEvent::SessionStarted, 2_000).is_none());
        m.apply(&local_kill(), 3_000);
        m.apply(&local_death(), 4_000);

        let record = m.apply(&ended(EndCause::GameOver), 10_000).unwrap();
        assert!(!record.joined);
        assert!(record.started);
        assert!(!record.quit);
        assert_eq!(record.start_time, 1_000);
        assert_eq!(record.end_time, 10_000);
        assert_eq!(record.duration, 9_000);
        assert_eq!(record.kill_timestamps, vec![3_000]);
        assert_eq!(record.death_timestamps, vec![4_000]);
        assert!(record.validate().is_ok());
        assert_eq!(m.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_join_after_start_keeps_started() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(&DomainEvent::SessionJoined, 100);
        let record = m.apply(&ended(EndCause::GameOver), 200).unwrap();
        assert!(record.started);
        assert!(!record.joined);
    }

    #[test]
    fn test_join_only_is_joined() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionJoined, 0);
        let record = m.apply(&ended(EndCause::GameOver), 500).unwrap();
        assert!(record.joined);
        assert!(!record.started);
    }

    #[test]
    fn test_unload_while_active_emits_quit_record_and_resets() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(&local_kill(), 100);

        let record = m.apply(&ended(EndCause::Unload), 500).unwrap();
        assert!(record.quit);
        assert_eq!(record.kills, 1);

        let state = m.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.kills, 0);
        assert!(state.kill_timestamps.is_empty());
        assert_eq!(m.finalized_count(), 1);
    }

    #[test]
    fn test_join_after_unload_starts_fresh_match() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(&local_kill(), 100);
        m.apply(&local_kill(), 200);
        let first = m.apply(&ended(EndCause::Unload), 300).unwrap();
        assert!(first.quit);
        assert_eq!(first.kills, 2);

        m.apply(&DomainEvent::SessionJoined, 5_000);
        assert_eq!(m.phase(), SessionPhase::Active);
        assert_eq!(m.state().kills, 0);
        assert_eq!(m.state().end_time, None);
        assert!(m.state().kill_timestamps.is_empty());
        assert!(!m.state().closed);

        m.apply(&local_kill(), 6_000);
        let second = m.apply(&ended(EndCause::GameOver), 9_000).unwrap();
        assert_eq!(second.kills, 1);
        assert_eq!(second.kill_timestamps, vec![6_000]);
        assert_eq!(second.start_time, 5_000);
        assert!(second.joined);
        assert!(!second.quit);
        assert_eq!(m.finalized_count(), 2);
    }

    #[test]
    fn test_double_end_marker_is_noop() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        assert!(m.apply(&ended(EndCause::GameOver), 100).is_some());
        assert!(m.apply(&ended(EndCause::GameOver), 101).is_none());
        assert!(m.apply(&ended(EndCause::Unload), 102).is_none());
        assert_eq!(m.finalized_count(), 1);
    }

    #[test]
    fn test_end_without_session_is_noop() {
        let mut m = SessionMachine::new();
        assert!(m.apply(&ended(EndCause::ExitConfirmed), 100).is_none());
        assert_eq!(m.finalized_count(), 0);
    }

    #[test]
    fn test_restart_after_finalize_starts_clean() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(&local_kill(), 10);
        m.apply(&ended(EndCause::GameOver), 20);

        m.apply(&DomainEvent::SessionStarted, 1_000);
        let record = m.apply(&ended(EndCause::GameOver), 2_000).unwrap();
        assert_eq!(record.kills, 0);
        assert_eq!(record.start_time, 1_000);
    }

    #[test]
    fn test_out_of_order_end_time_is_clamped() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 5_000);
        let record = m.apply(&ended(EndCause::GameOver), 1_000).unwrap();
        assert_eq!(record.end_time, 5_000);
        assert_eq!(record.duration, 0);
        assert!(record.validate().is_ok());
    }

    // ── Combat ────────────────────────────────────────────────────────────

    #[test]
    fn test_combat_ignored_while_idle() {
        let mut m = SessionMachine::new();
        m.apply(&local_kill(), 100);
        m.apply(&local_death(), 200);
        m.apply(&DomainEvent::PowerUpCollected, 300);
        assert_eq!(m.state().kills, 0);
        assert_eq!(m.state().deaths, 0);
        assert_eq!(m.state().power_ups_collected, 0);
    }

    #[test]
    fn test_kill_by_local_id_counts_as_local() {
        let mut m = SessionMachine::new();
        m.apply(
            &DomainEvent::AuthIdentified {
                id: "me".to_string(),
            },
            0,
        );
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(
            &DomainEvent::PlayerKilled {
                subject_is_local: false,
                killer: Some("me".to_string()),
                victim: Some("Vex".to_string()),
            },
            100,
        );
        m.apply(
            &DomainEvent::PlayerKilled {
                subject_is_local: false,
                killer: Some("Vex".to_string()),
                victim: Some("me".to_string()),
            },
            200,
        );

        let record = m.apply(&ended(EndCause::GameOver), 300).unwrap();
        assert_eq!(record.kills, 1);
        assert_eq!(record.deaths, 1);
        assert_eq!(record.players, vec!["Vex".to_string()]);
    }

    #[test]
    fn test_opponent_deaths_ledger() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        let kill = |victim: &str| DomainEvent::PlayerKilled {
            subject_is_local: false,
            killer: Some("Ace".to_string()),
            victim: Some(victim.to_string()),
        };

        // Unknown victim: not in the ledger yet, but now detected.
        m.apply(&kill("Bo"), 100);
        assert!(m.state().opponent_deaths.is_empty());
        m.apply(&kill("Bo"), 200);
        assert_eq!(m.state().opponent_deaths.get("Bo"), Some(&1));
        assert_eq!(m.state().kills, 0);
        assert_eq!(m.state().deaths, 0);

        let record = m.apply(&ended(EndCause::GameOver), 300).unwrap();
        assert_eq!(record.players, vec!["Ace".to_string(), "Bo".to_string()]);
    }

    #[test]
    fn test_other_players_death_is_ignored() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(
            &DomainEvent::PlayerDied {
                subject_is_local: false,
                killer: None,
            },
            100,
        );
        assert_eq!(m.state().deaths, 0);
    }

    #[test]
    fn test_power_ups_counted() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(&DomainEvent::PowerUpCollected, 10);
        m.apply(&DomainEvent::PowerUpCollected, 20);
        m.apply(&DomainEvent::PowerUpUsed, 30);
        let record = m.apply(&ended(EndCause::GameOver), 40).unwrap();
        assert_eq!(record.power_ups_collected, 2);
        assert_eq!(record.power_ups_used, 1);
    }

    #[test]
    fn test_map_and_code_captured_and_cleared() {
        let mut m = SessionMachine::new();
        m.apply(
            &DomainEvent::MapDetected {
                name: "Citadel".to_string(),
            },
            0,
        );
        m.apply(
            &DomainEvent::MatchCodeDetected {
                code: "QX7R".to_string(),
            },
            0,
        );
        m.apply(&DomainEvent::SessionStarted, 10);
        let record = m.apply(&ended(EndCause::GameOver), 20).unwrap();
        assert_eq!(record.map.as_deref(), Some("Citadel"));
        assert_eq!(record.match_code.as_deref(), Some("QX7R"));
        assert!(m.state().current_map.is_none());
    }

    // ── Mode ──────────────────────────────────────────────────────────────

    #[test]
    fn test_mode_is_sticky_across_game_over_and_unload() {
        let mut m = SessionMachine::new();
        m.apply(&declare(GameMode::Special), 0);

        m.apply(&DomainEvent::SessionStarted, 10);
        let first = m.apply(&ended(EndCause::GameOver), 20).unwrap();
        assert_eq!(first.mode, GameMode::Special);

        m.apply(&DomainEvent::SessionStarted, 30);
        let second = m.apply(&ended(EndCause::Unload), 40).unwrap();
        assert_eq!(second.mode, GameMode::Special);
        assert_eq!(m.mode(), GameMode::Special);
    }

    #[test]
    fn test_exit_confirmed_records_mode_then_resets() {
        let mut m = SessionMachine::new();
        m.apply(&declare(GameMode::Custom), 0);
        m.apply(&DomainEvent::SessionStarted, 10);
        let record = m.apply(&ended(EndCause::ExitConfirmed), 20).unwrap();
        assert_eq!(record.mode, GameMode::Custom);
        assert!(record.quit);
        assert_eq!(m.mode(), GameMode::Normal);
    }

    #[test]
    fn test_exit_confirmed_resets_mode_without_session() {
        let mut m = SessionMachine::new();
        m.apply(&declare(GameMode::Special), 0);
        assert!(m.apply(&ended(EndCause::ExitConfirmed), 10).is_none());
        assert_eq!(m.mode(), GameMode::Normal);
    }

    #[test]
    fn test_declarations_replace_each_other() {
        let mut m = SessionMachine::new();
        m.apply(&declare(GameMode::Special), 0);
        m.apply(&declare(GameMode::Custom), 1);
        assert_eq!(m.mode(), GameMode::Custom);
        m.apply(&declare(GameMode::Normal), 2);
        assert_eq!(m.mode(), GameMode::Normal);
    }

    // ── Idle timeout ──────────────────────────────────────────────────────

    #[test]
    fn test_check_idle_closes_stale_session_as_quit() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(&local_kill(), 1_000);

        assert!(m.check_idle(5_000, 10_000).is_none());
        let record = m.check_idle(11_000, 10_000).unwrap();
        assert!(record.quit);
        assert_eq!(record.end_time, 11_000);
        assert_eq!(m.phase(), SessionPhase::Idle);
        assert!(m.check_idle(50_000, 10_000).is_none());
    }

    #[test]
    fn test_check_idle_ignores_idle_machine() {
        let mut m = SessionMachine::new();
        assert!(m.check_idle(u64::MAX, 1).is_none());
    }

    #[test]
    fn test_force_close() {
        let mut m = SessionMachine::new();
        assert!(m.force_close(10).is_none());
        m.apply(&DomainEvent::SessionStarted, 0);
        let record = m.force_close(10).unwrap();
        assert!(record.quit);
    }

    // ── Snapshot ──────────────────────────────────────────────────────────

    #[test]
    fn test_snapshot_tracks_current_streak() {
        let mut m = SessionMachine::new();
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(&local_kill(), 10);
        m.apply(&local_death(), 20);
        m.apply(&local_kill(), 30);
        m.apply(&local_kill(), 40);

        let snap = m.snapshot();
        assert!(snap.active);
        assert_eq!(snap.kills, 3);
        assert_eq!(snap.deaths, 1);
        assert_eq!(snap.current_streak, 2);
    }

    #[test]
    fn test_local_id_survives_finalize() {
        let mut m = SessionMachine::new();
        m.apply(
            &DomainEvent::AuthIdentified {
                id: "me".to_string(),
            },
            0,
        );
        m.apply(&DomainEvent::SessionStarted, 0);
        m.apply(&ended(EndCause::GameOver), 10);
        assert_eq!(m.local_id(), Some("me"));
    }
}
