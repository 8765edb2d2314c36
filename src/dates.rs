// SPDX-License-Identifier: MIT
//! Natural-language due-date resolution.
//!
//! Suggestion metadata is allowed to carry a date as either an ISO timestamp
//! or loose English ("tomorrow", "next friday", "in 3 days"). This module
//! resolves the loose forms against an explicit reference time so callers
//! stay deterministic and testable.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(today|tonight|tomorrow)\b").expect("static regex"));

static IN_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bin\s+(\d+)\s+(minute|hour|day|week|month)s?\b").expect("static regex")
});

static FROM_NOW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d+)\s+(day|week|month)s?\s+(?:from\s+now|later)\b").expect("static regex")
});

static NEXT_PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnext\s+(week|month)\b").expect("static regex"));

static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:next|this)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("static regex")
});

/// Resolve a natural-language date expression relative to `now`.
///
/// Returns `None` when the text contains no recognizable date. Weekday names
/// resolve to the next occurrence strictly after today; "next week" is seven
/// days out, "next month" thirty.
pub fn parse_natural(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_lowercase();

    if let Some(caps) = RELATIVE_DAY.captures(&lower) {
        return match &caps[1] {
            "tomorrow" => Some(now + Duration::days(1)),
            // "today" and "tonight" both mean the current day.
            _ => Some(now),
        };
    }

    if let Some(caps) = IN_AMOUNT.captures(&lower) {
        let amount: i64 = caps[1].parse().ok()?;
        return Some(now + unit_duration(&caps[2], amount));
    }

    if let Some(caps) = FROM_NOW.captures(&lower) {
        let amount: i64 = caps[1].parse().ok()?;
        return Some(now + unit_duration(&caps[2], amount));
    }

    if let Some(caps) = NEXT_PERIOD.captures(&lower) {
        return match &caps[1] {
            "week" => Some(now + Duration::weeks(1)),
            _ => Some(now + Duration::days(30)),
        };
    }

    if let Some(caps) = WEEKDAY.captures(&lower) {
        let target = weekday_of(&caps[1])?;
        let today = now.weekday().num_days_from_monday() as i64;
        let wanted = target.num_days_from_monday() as i64;
        let mut ahead = (wanted - today).rem_euclid(7);
        if ahead == 0 {
            // A bare weekday never means "right now" — roll to next week.
            ahead = 7;
        }
        return Some(now + Duration::days(ahead));
    }

    None
}

fn unit_duration(unit: &str, amount: i64) -> Duration {
    match unit {
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        "day" => Duration::days(amount),
        "week" => Duration::weeks(amount),
        // Months as 30 days — due dates do not need calendar precision.
        _ => Duration::days(30 * amount),
    }
}

fn weekday_of(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}
