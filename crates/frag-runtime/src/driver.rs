//! Line-at-a-time driver tying the classifier to the session machine.
//!
//! Callers push [`RawLine`]s in; subscribers registered through
//! [`LineDriver::subscribe`] hear about every classified event and every
//! finished match.

use frag_core::models::{DomainEvent, LiveSnapshot, MatchRecord, RawLine, Timestamp};
use frag_data::classifier::classify;

use crate::session::SessionMachine;

// ── Public types ──────────────────────────────────────────────────────────────

/// What subscribers are told about.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// An event recognised in an input line, before it is applied.
    Classified(DomainEvent),
    /// A session closed; the machine has already been reset.
    Finalized(MatchRecord),
}

/// Token returned by [`LineDriver::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&DriverEvent) + Send>;

// ── LineDriver ────────────────────────────────────────────────────────────────

pub struct LineDriver {
    machine: SessionMachine,
    last_line: Option<String>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
    lines_seen: u64,
    duplicates: u64,
}

impl Default for LineDriver {
    fn default() -> Self {
        Self::new(SessionMachine::new())
    }
}

impl LineDriver {
    pub fn new(machine: SessionMachine) -> Self {
        Self {
            machine,
            last_line: None,
            subscribers: Vec::new(),
            next_id: 0,
            lines_seen: 0,
            duplicates: 0,
        }
    }

    // ── Subscriptions ─────────────────────────────────────────────────────

    /// Register a callback for classified events and finished matches.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&DriverEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    // ── Input ─────────────────────────────────────────────────────────────

    /// Classify and apply one line.
    ///
    /// A line identical to the previous one is dropped. Returns the matches
    /// the line finished, in order.
    pub fn process_line(&mut self, line: &RawLine) -> Vec<MatchRecord> {
        let text = line.text.trim_end_matches(['\r', '\n']);
        self.lines_seen += 1;

        if self.last_line.as_deref() == Some(text) {
            self.duplicates += 1;
            tracing::trace!("suppressed duplicate line");
            return Vec::new();
        }
        self.last_line = Some(text.to_string());

        let mut finished = Vec::new();
        for event in classify(text) {
            tracing::debug!(kind = event.kind(), "classified event");
            let record = self.machine.apply(&event, line.arrival_time);
            self.notify(DriverEvent::Classified(event));
            if let Some(record) = record {
                self.notify(DriverEvent::Finalized(record.clone()));
                finished.push(record);
            }
        }
        finished
    }

    /// Apply the idle timeout at `now`.
    pub fn tick(&mut self, now: Timestamp, idle_timeout_ms: u64) -> Option<MatchRecord> {
        let record = self.machine.check_idle(now, idle_timeout_ms)?;
        self.notify(DriverEvent::Finalized(record.clone()));
        Some(record)
    }

    /// Close any open session as quit; used when the input source ends.
    pub fn close(&mut self, now: Timestamp) -> Option<MatchRecord> {
        let record = self.machine.force_close(now)?;
        self.notify(DriverEvent::Finalized(record.clone()));
        Some(record)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.machine.snapshot()
    }

    /// `(lines processed, duplicates suppressed)`.
    pub fn line_counts(&self) -> (u64, u64) {
        (self.lines_seen, self.duplicates)
    }

    fn notify(&mut self, event: DriverEvent) {
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&event);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use frag_core::models::GameMode;
    use std::sync::{Arc, Mutex};

    fn feed(driver: &mut LineDriver, lines: &[(&str, u64)]) -> Vec<MatchRecord> {
        lines
            .iter()
            .flat_map(|(text, t)| driver.process_line(&RawLine::new(*text, *t)))
            .collect()
    }

    #[test]
    fn test_full_match_from_lines() {
        let mut driver = LineDriver::default();
        let records = feed(
            &mut driver,
            &[
                ("[auth] session ok SKID: me01", 0),
                ("game mode: special", 10),
                ("loading assets/maps/citadel_v2.glb", 20),
                ("match started", 1_000),
                ("You killed Vex", 2_000),
                ("Vex killed you", 3_000),
                ("You killed Vex", 4_000),
                ("game over", 9_000),
            ],
        );

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.mode, GameMode::Special);
        assert_eq!(r.kills, 2);
        assert_eq!(r.deaths, 1);
        assert_eq!(r.map.as_deref(), Some("Citadel"));
        assert!(r.started);
        assert!(!r.quit);
        assert_eq!(driver.machine().local_id(), Some("me01"));
    }

    #[test]
    fn test_duplicate_lines_are_suppressed() {
        let mut driver = LineDriver::default();
        feed(
            &mut driver,
            &[
                ("match started", 0),
                ("You killed Vex", 100),
                ("You killed Vex", 100),
                ("You killed Bo", 200),
                ("You killed Vex", 300),
            ],
        );
        assert_eq!(driver.snapshot().kills, 3);
        assert_eq!(driver.line_counts(), (5, 1));
    }

    #[test]
    fn test_unknown_lines_change_nothing() {
        let mut driver = LineDriver::default();
        let records = feed(&mut driver, &[("render frame 1234", 0), ("", 1)]);
        assert!(records.is_empty());
        assert_eq!(driver.snapshot(), LiveSnapshot::default());
    }

    #[test]
    fn test_subscribers_see_events_and_records() {
        let mut driver = LineDriver::default();
        let seen: Arc<Mutex<Vec<DriverEvent>>> = Arc::default();
        let sink = Arc::clone(&seen);
        driver.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        feed(&mut driver, &[("match started", 0), ("game over", 500)]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], DriverEvent::Classified(DomainEvent::SessionStarted));
        assert!(matches!(seen[2], DriverEvent::Finalized(ref r) if r.duration == 500));
    }

    #[test]
    fn test_unload_record_reaches_subscribers_and_driver_is_idle() {
        let mut driver = LineDriver::default();
        let observed: Arc<Mutex<Option<MatchRecord>>> = Arc::default();
        let sink = Arc::clone(&observed);
        driver.subscribe(move |e| {
            if let DriverEvent::Finalized(record) = e {
                *sink.lock().unwrap() = Some(record.clone());
            }
        });

        let records = feed(&mut driver, &[("match started", 0), ("unloading", 50)]);
        assert_eq!(records.len(), 1);
        assert!(records[0].quit);
        assert_eq!(observed.lock().unwrap().as_ref(), Some(&records[0]));
        assert!(!driver.snapshot().active);
    }

    #[test]
    fn test_unsubscribe() {
        let mut driver = LineDriver::default();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let id = driver.subscribe(move |_| *sink.lock().unwrap() += 1);

        feed(&mut driver, &[("match started", 0)]);
        assert!(driver.unsubscribe(id));
        assert!(!driver.unsubscribe(id));
        feed(&mut driver, &[("game over", 10)]);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_tick_and_close() {
        let mut driver = LineDriver::default();
        feed(&mut driver, &[("match started", 0)]);
        assert!(driver.tick(100, 1_000).is_none());
        assert!(driver.tick(1_000, 1_000).unwrap().quit);

        feed(&mut driver, &[("joined game", 2_000)]);
        let record = driver.close(2_500).unwrap();
        assert!(record.joined);
        assert!(driver.close(3_000).is_none());
    }
}
