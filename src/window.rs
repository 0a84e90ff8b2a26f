//! Time window for one-shot operations.

use crate::error::{Result, StartupError};
use crate::utils::parse_duration;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use std::fmt;

/// Width of the window, in seconds, when no start is given.
pub const DEFAULT_SPAN_SECS: i64 = 3_600;

/// Closed time range `[start, end]` handed to copy-like operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window from the optional `--start`/`--end` strings.
    ///
    /// Missing or empty bounds default to `now - 1h` and `now`. Deterministic
    /// for a given `now`.
    pub fn parse(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> Result<Self> {
        let end = match non_empty(end) {
            Some(raw) => parse_instant("end", raw, now)?,
            None => now,
        };
        let start = match non_empty(start) {
            Some(raw) => parse_instant("start", raw, now)?,
            None => now - Duration::seconds(DEFAULT_SPAN_SECS),
        };
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Split the window into consecutive chunks of at most `step`. An
    /// inverted window has none.
    pub fn chunks(&self, step: Duration) -> Vec<TimeWindow> {
        let mut out = Vec::new();
        if self.start > self.end {
            return out;
        }
        if step <= Duration::zero() {
            out.push(*self);
            return out;
        }
        let mut cursor = self.start;
        while cursor < self.end {
            let next = (cursor + step).min(self.end);
            out.push(TimeWindow {
                start: cursor,
                end: next,
            });
            cursor = next;
        }
        if out.is_empty() {
            out.push(*self);
        }
        out
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a single bound.
///
/// Accepted: RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD` (UTC), `now`,
/// `now-<duration>`, `now+<duration>` and the shorthand `-<duration>`.
pub fn parse_instant(
    field: &'static str,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let fail = |details: String| StartupError::TimeParse {
        field,
        input: raw.to_string(),
        details,
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| fail("invalid date".to_string()));
    }

    let relative = raw.strip_prefix("now").unwrap_or(raw).trim();
    if relative.is_empty() {
        return Ok(now);
    }
    let (sign, amount) = if let Some(rest) = relative.strip_prefix('-') {
        (-1, rest)
    } else if let Some(rest) = relative.strip_prefix('+').filter(|_| raw.starts_with("now")) {
        (1, rest)
    } else {
        return Err(fail(
            "expected RFC 3339, 'YYYY-MM-DD HH:MM:SS' or now[-+]<duration>".to_string(),
        ));
    };
    let offset = parse_duration(amount.trim()).map_err(fail)?;
    let offset = Duration::from_std(offset).map_err(|e| fail(e.to_string()))?;

    let shifted = if sign < 0 {
        now.checked_sub_signed(offset)
    } else {
        now.checked_add_signed(offset)
    };
    shifted.ok_or_else(|| fail("offset out of range".to_string()))
}
