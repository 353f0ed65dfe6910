//! Recurrence rule expansion.
//!
//! Rules are a serialized subset of the iCalendar RRULE grammar:
//! `FREQ=DAILY|WEEKLY|MONTHLY`, `INTERVAL=n`, `COUNT=n` or
//! `UNTIL=YYYYMMDDTHHMMSSZ`, `BYDAY=MO,WE,FR` (weekly), `BYMONTHDAY=n`
//! (monthly). Unknown keys are ignored.
//!
//! Expansion is pure and deterministic. A malformed rule expands to an empty
//! sequence — logged, never raised — so a bad row in storage can't take the
//! caller down.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub use chrono::Weekday;

use crate::limits::MAX_OCCURRENCES;
use crate::model::{Ms, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// How a generated rule terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEnd {
    Count(u32),
    /// Inclusive: an occurrence starting exactly at this instant is kept.
    Until(Ms),
    Never,
}

/// Expansion parameters. The window is inclusive on both ends and filters on
/// occurrence start.
#[derive(Debug, Clone, Copy)]
pub struct ExpandOptions {
    pub window_start: Ms,
    pub window_end: Ms,
    /// First occurrence of the rule; also fixes the time-of-day.
    pub dtstart: Ms,
    pub duration_minutes: i64,
}

impl ExpandOptions {
    pub fn new(window_start: Ms, window_end: Ms, dtstart: Ms) -> Self {
        Self {
            window_start,
            window_end,
            dtstart,
            duration_minutes: 60,
        }
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.duration_minutes = minutes;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RuleSpec {
    freq: Frequency,
    interval: u32,
    count: Option<u32>,
    until: Option<Ms>,
    by_day: Vec<Weekday>,
    by_month_day: Option<u32>,
}

#[derive(Debug)]
enum RuleError {
    Empty,
    MissingFreq,
    BadPart(String),
    BadValue(&'static str, String),
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleError::Empty => write!(f, "empty rule"),
            RuleError::MissingFreq => write!(f, "missing FREQ"),
            RuleError::BadPart(part) => write!(f, "malformed part: {part}"),
            RuleError::BadValue(key, value) => write!(f, "bad {key} value: {value}"),
        }
    }
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    match code {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// `YYYYMMDDTHHMMSSZ`, or a bare `YYYYMMDD` meaning midnight UTC.
fn parse_until(value: &str) -> Option<Ms> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ") {
        return Some(dt.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn parse_rule(rule: &str) -> Result<RuleSpec, RuleError> {
    let body = rule.trim();
    let body = body.strip_prefix("RRULE:").unwrap_or(body);
    if body.is_empty() {
        return Err(RuleError::Empty);
    }

    let mut freq = None;
    let mut interval = 1u32;
    let mut count = None;
    let mut until = None;
    let mut by_day = Vec::new();
    let mut by_month_day = None;

    for part in body.split(';') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| RuleError::BadPart(part.to_string()))?;
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => {
                freq = Some(match value.to_ascii_uppercase().as_str() {
                    "DAILY" => Frequency::Daily,
                    "WEEKLY" => Frequency::Weekly,
                    "MONTHLY" => Frequency::Monthly,
                    _ => return Err(RuleError::BadValue("FREQ", value.to_string())),
                });
            }
            "INTERVAL" => {
                interval = value
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| RuleError::BadValue("INTERVAL", value.to_string()))?;
            }
            "COUNT" => {
                count = Some(
                    value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n >= 1)
                        .ok_or_else(|| RuleError::BadValue("COUNT", value.to_string()))?,
                );
            }
            "UNTIL" => {
                until = Some(
                    parse_until(value)
                        .ok_or_else(|| RuleError::BadValue("UNTIL", value.to_string()))?,
                );
            }
            "BYDAY" => {
                by_day = value
                    .split(',')
                    .map(parse_weekday)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| RuleError::BadValue("BYDAY", value.to_string()))?;
            }
            "BYMONTHDAY" => {
                by_month_day = Some(
                    value
                        .parse::<u32>()
                        .ok()
                        .filter(|d| (1..=31).contains(d))
                        .ok_or_else(|| RuleError::BadValue("BYMONTHDAY", value.to_string()))?,
                );
            }
            _ => {} // unknown keys tolerated
        }
    }

    Ok(RuleSpec {
        freq: freq.ok_or(RuleError::MissingFreq)?,
        interval,
        count,
        until,
        by_day,
        by_month_day,
    })
}

/// Expand a rule into concrete occurrences within the window.
///
/// Occurrences start at `dtstart` and repeat per the rule; COUNT applies to
/// the whole rule, so occurrences falling before the window still consume
/// it. Each kept start pairs with `start + duration` to form a `Span`.
/// Malformed input yields an empty vec.
pub fn expand(rule: &str, opts: &ExpandOptions) -> Vec<Span> {
    let spec = match parse_rule(rule) {
        Ok(spec) => spec,
        Err(e) => {
            tracing::warn!(rule, error = %e, "malformed recurrence rule, expanding to nothing");
            return Vec::new();
        }
    };
    if opts.duration_minutes <= 0 || opts.window_end < opts.window_start {
        tracing::warn!(
            duration = opts.duration_minutes,
            "degenerate expansion options, expanding to nothing"
        );
        return Vec::new();
    }
    let Some(dtstart) = Utc.timestamp_millis_opt(opts.dtstart).single() else {
        tracing::warn!(dtstart = opts.dtstart, "dtstart out of range");
        return Vec::new();
    };

    let duration_ms = opts.duration_minutes * 60_000;
    let starts = occurrence_starts(&spec, dtstart, opts);
    starts
        .into_iter()
        .map(|start| Span::new(start, start + duration_ms))
        .collect()
}

/// Enumerate occurrence starts in ascending order, stopping at COUNT, UNTIL,
/// the window end, or the hard cap — whichever comes first.
fn occurrence_starts(spec: &RuleSpec, dtstart: DateTime<Utc>, opts: &ExpandOptions) -> Vec<Ms> {
    let interval = spec.interval as i64;
    let count = spec.count.map(|c| c as usize);

    let mut kept: Vec<Ms> = Vec::new();
    let mut emitted = 0usize;

    // Returns false once enumeration should stop. Candidates must arrive in
    // ascending order.
    let mut accept = |candidate: DateTime<Utc>| -> bool {
        let ms = candidate.timestamp_millis();
        if spec.until.is_some_and(|u| ms > u) {
            return false;
        }
        if ms > opts.window_end {
            return false;
        }
        if ms >= opts.window_start {
            kept.push(ms);
        }
        emitted += 1;
        if count.is_some_and(|c| emitted >= c) {
            return false;
        }
        emitted < MAX_OCCURRENCES
    };

    match spec.freq {
        Frequency::Daily => {
            let mut cur = dtstart;
            loop {
                if !accept(cur) {
                    break;
                }
                cur += Duration::days(interval);
            }
        }
        Frequency::Weekly if spec.by_day.is_empty() => {
            let mut cur = dtstart;
            loop {
                if !accept(cur) {
                    break;
                }
                cur += Duration::weeks(interval);
            }
        }
        Frequency::Weekly => {
            // Weeks anchor on Monday; within a week, listed days fire in
            // calendar order at dtstart's time-of-day.
            let mut days: Vec<i64> = spec
                .by_day
                .iter()
                .map(|d| d.num_days_from_monday() as i64)
                .collect();
            days.sort_unstable();
            days.dedup();

            let time = dtstart.time();
            let mut week_start =
                dtstart.date_naive() - Duration::days(dtstart.weekday().num_days_from_monday() as i64);
            'weeks: loop {
                for &day in &days {
                    let date = week_start + Duration::days(day);
                    let candidate = Utc.from_utc_datetime(&date.and_time(time));
                    if candidate < dtstart {
                        continue; // before the rule begins
                    }
                    if !accept(candidate) {
                        break 'weeks;
                    }
                }
                week_start += Duration::weeks(interval);
            }
        }
        Frequency::Monthly => {
            let day = spec.by_month_day.unwrap_or(dtstart.day());
            let time = dtstart.time();
            let mut year = dtstart.year();
            let mut month0 = dtstart.month0() as i64; // 0-based
            loop {
                // Months without this day (e.g. Feb 30) yield no occurrence
                // but still advance the month step.
                if let Some(date) = NaiveDate::from_ymd_opt(year, month0 as u32 + 1, day) {
                    let candidate = Utc.from_utc_datetime(&date.and_time(time));
                    if candidate >= dtstart && !accept(candidate) {
                        break;
                    }
                }
                month0 += interval;
                year += (month0 / 12) as i32;
                month0 %= 12;
                // Unbounded rules terminate via accept(); a rule whose every
                // candidate month lacks the day would otherwise spin forever.
                if year > 2200 {
                    break;
                }
            }
        }
    }

    kept
}

// ── Canonical rule builders ──────────────────────────────────────

fn end_fragment(end: RuleEnd) -> String {
    match end {
        RuleEnd::Count(n) => format!(";COUNT={n}"),
        RuleEnd::Until(ms) => {
            let dt = Utc
                .timestamp_millis_opt(ms)
                .single()
                .unwrap_or(DateTime::UNIX_EPOCH);
            format!(";UNTIL={}", dt.format("%Y%m%dT%H%M%SZ"))
        }
        RuleEnd::Never => String::new(),
    }
}

/// `FREQ=DAILY;INTERVAL=n[;COUNT=n|;UNTIL=...]`
pub fn daily(interval: u32, end: RuleEnd) -> String {
    format!("FREQ=DAILY;INTERVAL={}{}", interval.max(1), end_fragment(end))
}

/// `FREQ=WEEKLY;INTERVAL=n[;BYDAY=MO,WE][;COUNT=n|;UNTIL=...]`
pub fn weekly(interval: u32, by_day: &[Weekday], end: RuleEnd) -> String {
    let mut rule = format!("FREQ=WEEKLY;INTERVAL={}", interval.max(1));
    if !by_day.is_empty() {
        let codes: Vec<&str> = by_day.iter().map(|d| weekday_code(*d)).collect();
        rule.push_str(";BYDAY=");
        rule.push_str(&codes.join(","));
    }
    rule.push_str(&end_fragment(end));
    rule
}

/// `FREQ=MONTHLY;INTERVAL=n;BYMONTHDAY=d[;COUNT=n|;UNTIL=...]`
pub fn monthly(interval: u32, month_day: u32, end: RuleEnd) -> String {
    format!(
        "FREQ=MONTHLY;INTERVAL={};BYMONTHDAY={}{}",
        interval.max(1),
        month_day.clamp(1, 31),
        end_fragment(end)
    )
}
