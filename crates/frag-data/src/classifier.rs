//! Diagnostic line classifier.
//!
//! Turns one free-text line from the game client into the typed
//! [`DomainEvent`]s it announces. Rules run in a fixed order and each rule
//! group yields at most one event, so a single line may carry, for example, a
//! match code and a lifecycle marker at once:
//!
//! | # | group      | example line                                  |
//! |---|------------|-----------------------------------------------|
//! | 1 | auth       | `[auth] session ok SKID: a1b2c3`              |
//! | 2 | match code | `lobby code = QX7R-22`                        |
//! | 3 | map asset  | `loading assets/maps/citadel_v2.glb`          |
//! | 4 | mode       | `game mode: special`, `entered custom lobby`  |
//! | 5 | lifecycle  | `joined game`, `match started`, `game over`   |
//! | 6 | kill/death | `You killed Vex`, `Vex killed you`, `you died`|
//! | 7 | power-up   | `picked up speed power-up`                    |
//! | 8 | presence   | `player Vex joined`, `Vex connected`          |
//!
//! Matching is case-insensitive. Lines that match nothing yield no events.
//! A leading log timestamp is skipped before matching. A join only counts as
//! the local player's when it is phrased in the first person (`you joined
//! game`) or opens the line (`[net] joined game`); `Orin joined the game` is
//! presence. Duplicate-line suppression belongs to the caller.

use std::sync::LazyLock;

use frag_core::formatting::split_leading_timestamp;
use frag_core::maps::{is_known_map, normalize_map_name};
use frag_core::models::{DomainEvent, EndCause, GameMode};
use regex::Regex;
use tracing::{debug, trace};

// ── Pattern table ─────────────────────────────────────────────────────────────

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("classifier pattern is valid")
}

static AUTH: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\bskid\s*[:=]\s*([\w-]+)"));

static MATCH_CODE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:match|room|lobby)[ _-]?code\s*[:=]\s*([a-z0-9-]{3,32})"));

static MAP_ASSET: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bmaps/([\w-]+)\.(?:glb|gltf|json|bin)\b"));

static MODE_DECLARED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bgame[ _-]?mode\s*[:=]\s*(normal|special|custom)\b"));
static CUSTOM_LOBBY: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bcustom (?:lobby|room|game)\b"));
static SPECIAL_EVENT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bspecial (?:event|mode)\b"));

static GAME_OVER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:game|match|round) (?:over|ended|finished)\b"));
static EXIT_CONFIRMED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bexit (?:confirmed|confirmation)\b"));
static UNLOAD: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:beforeunload|unloading|reloading)\b"));
static STARTED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:game|match|round) start(?:ed)?\b"));
static JOINED: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)(?:^(?:\[[^\]]*\]\s*)*|\byou\s+)joined (?:the )?(?:game|match|room)\b")
});

static YOU_KILLED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\byou killed ([\w.-]+)"));
static KILLED_YOU: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b([\w.-]+) killed you\b"));
static KILLED_BY: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\byou were killed by ([\w.-]+)"));
static YOU_DIED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\byou (?:died|were eliminated)\b"));
static WAS_KILLED_BY: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b([\w.-]+) was killed by ([\w.-]+)"));
static OTHER_KILLED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b([\w.-]+) killed ([\w.-]+)"));

static POWERUP_COLLECTED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:picked up|collected)\b.*\bpower[ -]?up\b"));
static POWERUP_USED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:used|activated)\b.*\bpower[ -]?up\b"));

static PLAYER_PRESENT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bplayer (?:joined|connected)\s*[:=]\s*([\w.-]+)"));
static PLAYER_NAMED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bplayer ([\w.-]+) (?:joined|connected)\b"));
static OTHER_JOINED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b([\w.-]+) joined (?:the )?(?:game|match|room)\b"));
static CONNECTED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)^(?:\[[^\]]*\]\s*)*([\w.-]+) connected\b"));

// ── Public API ────────────────────────────────────────────────────────────────

/// Classify one line into the events it announces, in rule order.
///
/// Returns an empty vec for blank or unrecognised lines.
pub fn classify(line: &str) -> Vec<DomainEvent> {
    let line = match split_leading_timestamp(line) {
        Some((_, rest)) => rest.trim(),
        None => line.trim(),
    };
    if line.is_empty() {
        return Vec::new();
    }

    let events: Vec<DomainEvent> = [
        detect_auth(line),
        detect_match_code(line),
        detect_map(line),
        detect_mode(line),
        detect_lifecycle(line),
        detect_combat(line),
        detect_power_up(line),
        detect_player(line),
    ]
    .into_iter()
    .flatten()
    .collect();

    if !events.is_empty() {
        trace!(line, count = events.len(), "classified line");
    }
    events
}

// ── Rule groups ───────────────────────────────────────────────────────────────

fn detect_auth(line: &str) -> Option<DomainEvent> {
    let cap = AUTH.captures(line)?;
    Some(DomainEvent::AuthIdentified {
        id: cap[1].to_string(),
    })
}

fn detect_match_code(line: &str) -> Option<DomainEvent> {
    let cap = MATCH_CODE.captures(line)?;
    Some(DomainEvent::MatchCodeDetected {
        code: cap[1].to_uppercase(),
    })
}

fn detect_map(line: &str) -> Option<DomainEvent> {
    let cap = MAP_ASSET.captures(line)?;
    let slug = &cap[1];
    if !is_known_map(slug) {
        debug!(slug, "map asset not in the arena table");
    }
    Some(DomainEvent::MapDetected {
        name: normalize_map_name(slug),
    })
}

fn detect_mode(line: &str) -> Option<DomainEvent> {
    let mode = if let Some(cap) = MODE_DECLARED.captures(line) {
        cap[1].parse::<GameMode>().ok()?
    } else if CUSTOM_LOBBY.is_match(line) {
        GameMode::Custom
    } else if SPECIAL_EVENT.is_match(line) {
        GameMode::Special
    } else {
        return None;
    };
    Some(DomainEvent::ModeDeclared { mode })
}

fn detect_lifecycle(line: &str) -> Option<DomainEvent> {
    if GAME_OVER.is_match(line) {
        return Some(DomainEvent::SessionEnded {
            quit: false,
            cause: EndCause::GameOver,
        });
    }
    if EXIT_CONFIRMED.is_match(line) {
        return Some(DomainEvent::SessionEnded {
            quit: true,
            cause: EndCause::ExitConfirmed,
        });
    }
    if UNLOAD.is_match(line) {
        return Some(DomainEvent::SessionEnded {
            quit: true,
            cause: EndCause::Unload,
        });
    }
    if STARTED.is_match(line) {
        return Some(DomainEvent::SessionStarted);
    }
    if JOINED.is_match(line) {
        return Some(DomainEvent::SessionJoined);
    }
    None
}

fn detect_combat(line: &str) -> Option<DomainEvent> {
    if let Some(cap) = YOU_KILLED.captures(line) {
        return Some(DomainEvent::PlayerKilled {
            subject_is_local: true,
            killer: None,
            victim: Some(cap[1].to_string()),
        });
    }
    if let Some(cap) = KILLED_YOU.captures(line).or_else(|| KILLED_BY.captures(line)) {
        return Some(DomainEvent::PlayerDied {
            subject_is_local: true,
            killer: Some(cap[1].to_string()),
        });
    }
    if YOU_DIED.is_match(line) {
        return Some(DomainEvent::PlayerDied {
            subject_is_local: true,
            killer: None,
        });
    }
    if let Some(cap) = WAS_KILLED_BY.captures(line) {
        let victim = cap[1].to_string();
        let killer = cap[2].to_string();
        if killer.eq_ignore_ascii_case("you") {
            return Some(DomainEvent::PlayerKilled {
                subject_is_local: true,
                killer: None,
                victim: Some(victim),
            });
        }
        return Some(DomainEvent::PlayerKilled {
            subject_is_local: false,
            killer: Some(killer),
            victim: Some(victim),
        });
    }
    if let Some(cap) = OTHER_KILLED.captures(line) {
        return Some(DomainEvent::PlayerKilled {
            subject_is_local: false,
            killer: Some(cap[1].to_string()),
            victim: Some(cap[2].to_string()),
        });
    }
    None
}

fn detect_power_up(line: &str) -> Option<DomainEvent> {
    if POWERUP_COLLECTED.is_match(line) {
        Some(DomainEvent::PowerUpCollected)
    } else if POWERUP_USED.is_match(line) {
        Some(DomainEvent::PowerUpUsed)
    } else {
        None
    }
}

fn detect_player(line: &str) -> Option<DomainEvent> {
    let name = [&PLAYER_PRESENT, &PLAYER_NAMED, &OTHER_JOINED, &CONNECTED]
        .into_iter()
        .find_map(|re| re.captures(line))
        .map(|cap| cap[1].to_string())?;
    if is_pronoun(&name) {
        return None;
    }
    Some(DomainEvent::PlayerDetected { name })
}

/// Words the presence rules can capture that never name another player.
fn is_pronoun(word: &str) -> bool {
    ["you", "player", "i", "we"]
        .iter()
        .any(|p| word.eq_ignore_ascii_case(p))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
