//! Display helpers for match summaries and history listings, plus parsing of
//! the timestamp prefix some client logs carry.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use crate::models::Timestamp;

/// Format an integer count with thousands separators.
///
/// # Examples
///
/// ```
/// use frag_core::formatting::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234), "1,234");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
pub fn format_count(value: u64) -> String {
    group_thousands(&value.to_string())
}

/// Format a ratio with two decimal places.
///
/// # Examples
///
/// ```
/// use frag_core::formatting::format_ratio;
///
/// assert_eq!(format_ratio(2.0), "2.00");
/// assert_eq!(format_ratio(1.0 / 3.0), "0.33");
/// ```
pub fn format_ratio(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    format!("{:.2}", value)
}

/// Format a millisecond duration for display.
///
/// * `< 1h` → `"7m 05s"`
/// * `≥ 1h` → `"2h 03m"`
///
/// # Examples
///
/// ```
/// use frag_core::formatting::format_duration_ms;
///
/// assert_eq!(format_duration_ms(0), "0m 00s");
/// assert_eq!(format_duration_ms(425_000), "7m 05s");
/// assert_eq!(format_duration_ms(7_380_000), "2h 03m");
/// ```
pub fn format_duration_ms(ms: u64) -> String {
    let total_secs = ms / 1_000;
    let hours = total_secs / 3_600;
    let mins = (total_secs % 3_600) / 60;
    let secs = total_secs % 60;
    if hours == 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}h {:02}m", hours, mins)
    }
}

/// Render a Unix-millis timestamp in local time, `"%Y-%m-%d %H:%M"`.
///
/// Values outside chrono's range fall back to the raw number.
pub fn format_timestamp(ts: Timestamp) -> String {
    let Ok(millis) = i64::try_from(ts) else {
        return ts.to_string();
    };
    match Utc.timestamp_millis_opt(millis).single() {
        Some(utc) => {
            let local: DateTime<Local> = utc.with_timezone(&Local);
            local.format("%Y-%m-%d %H:%M").to_string()
        }
        None => ts.to_string(),
    }
}

/// A fixed-width text bar for a 0–100 rating, e.g. `"███████░░░"`.
pub fn rating_bar(rating: u8, width: usize) -> String {
    let filled = (rating.min(100) as usize * width + 50) / 100;
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(width - filled));
    bar
}

/// Split a leading log timestamp off a line.
///
/// Accepts RFC 3339 (`2026-03-01T18:04:05.120Z`) and naive
/// `YYYY-MM-DD[T ]HH:MM:SS[.fff]` stamps, bare or inside `[...]`. Naive
/// stamps are read as local time. Returns the Unix-millis value and the rest
/// of the line, or `None` when the line does not start with a timestamp.
///
/// # Examples
///
/// ```
/// use frag_core::formatting::split_leading_timestamp;
///
/// let (ts, rest) = split_leading_timestamp("2026-03-01T18:04:05.120Z You killed Vex").unwrap();
/// assert_eq!(ts, 1_772_388_245_120);
/// assert_eq!(rest, "You killed Vex");
/// assert!(split_leading_timestamp("[feed] You killed Vex").is_none());
/// ```
pub fn split_leading_timestamp(line: &str) -> Option<(Timestamp, &str)> {
    let line = line.trim_start();
    if let Some(inner) = line.strip_prefix('[') {
        let close = inner.find(']')?;
        let ts = parse_log_time(inner[..close].trim())?;
        return Some((ts, inner[close + 1..].trim_start()));
    }

    let mut parts = line.splitn(3, ' ');
    let first = parts.next()?;
    if let Some(ts) = parse_log_time(first) {
        return Some((ts, line[first.len()..].trim_start()));
    }
    let second = parts.next()?;
    let stamp = &line[..first.len() + 1 + second.len()];
    let ts = parse_log_time(stamp)?;
    Some((ts, line[stamp.len()..].trim_start()))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn parse_log_time(text: &str) -> Option<Timestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Timestamp::try_from(dt.timestamp_millis()).ok();
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Timestamp::try_from(local.timestamp_millis()).ok()
}

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
