//! Age Resolution
//!
//! Reconciles the messy timestamp signals feeds attach to a listing into a
//! single age in fractional seconds. Interpretations are tried in a fixed
//! priority order, so the same hints always resolve the same way:
//!
//! 1. numeric millisecond epochs
//! 2. numeric second epochs
//! 3. plain numbers, read as minutes
//! 4. string duration expressions ("2h", "90m", "45s")
//! 5. string calendar dates
//!
//! Timestamps from the future clamp to zero rather than going negative.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::domain::candidate::{AgeHint, TokenCandidate};

/// Millisecond epochs are comfortably above this; second epochs are below.
const MS_EPOCH_FLOOR: f64 = 1.0e12;
const SEC_EPOCH_FLOOR: f64 = 1.0e9;

/// Age of `candidate` in fractional seconds at `now`. A canonical value
/// already attached wins; otherwise the raw hints are resolved.
pub fn resolve_age(candidate: &TokenCandidate, now: DateTime<Utc>) -> Option<f64> {
    if let Some(age) = candidate.age_seconds {
        return Some(age);
    }
    if let Some(created) = candidate.onchain_created_at {
        return Some(seconds_between(created, now));
    }
    resolve_age_from_hints(&candidate.age_hints, now)
}

/// Resolve raw hints against `now`. Each interpretation pass scans all
/// hints before the next pass is tried.
pub fn resolve_age_from_hints(hints: &[AgeHint], now: DateTime<Utc>) -> Option<f64> {
    let now_ms = now.timestamp_millis() as f64;
    let now_s = now.timestamp() as f64;

    for hint in hints {
        if let AgeHint::Number(n) = hint {
            if *n > MS_EPOCH_FLOOR {
                return Some(((now_ms - n) / 1000.0).max(0.0));
            }
        }
    }
    for hint in hints {
        if let AgeHint::Number(n) = hint {
            if *n > SEC_EPOCH_FLOOR {
                return Some((now_s - n).max(0.0));
            }
        }
    }
    for hint in hints {
        if let AgeHint::Number(n) = hint {
            if n.is_finite() && *n >= 0.0 {
                return Some(n * 60.0);
            }
        }
    }
    for hint in hints {
        if let AgeHint::Text(s) = hint {
            if let Some(secs) = parse_duration_expr(s) {
                return Some(secs);
            }
            if let Some(when) = parse_calendar(s) {
                return Some(seconds_between(when, now));
            }
        }
    }
    None
}

/// Parse a duration expression into fractional seconds. A bare number is
/// read as minutes, matching the legacy feed convention.
pub fn parse_duration_expr(expr: &str) -> Option<f64> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }
    if let Ok(minutes) = expr.parse::<f64>() {
        if minutes.is_finite() && minutes >= 0.0 {
            return Some(minutes * 60.0);
        }
        return None;
    }
    if !expr.is_ascii() {
        return None;
    }
    let (value, unit) = expr.split_at(expr.len() - 1);
    let value: f64 = value.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let factor = match unit {
        "s" | "S" => 1.0,
        "m" | "M" => 60.0,
        "h" | "H" => 3600.0,
        "d" | "D" => 86400.0,
        _ => return None,
    };
    Some(value * factor)
}

/// Parse a calendar timestamp in the formats feeds actually emit.
fn parse_calendar(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(when) = DateTime::parse_from_rfc3339(s) {
        return Some(when.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(when) = DateTime::parse_from_rfc2822(s) {
        return Some(when.with_timezone(&Utc));
    }
    None
}

fn seconds_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - earlier).num_milliseconds() as f64 / 1000.0).max(0.0)
}
