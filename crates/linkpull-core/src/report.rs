//! Aggregations over archived records: daily activity, message statistics,
//! call durations.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::Record;

/// Fields a message may carry its sender in, in priority order.
const SENDER_KEYS: [&str; 3] = ["senderId", "userId", "authorId"];
const TEXT_KEYS: [&str; 3] = ["text", "content", "message"];
const START_KEYS: [&str; 3] = ["startTime", "startedAt", "createdAt"];
const END_KEYS: [&str; 3] = ["endTime", "finishedAt", "endedAt"];

/// Inclusive date window ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Windows reaching past the earliest representable date start there.
    pub fn days_back(days: u32, today: NaiveDate) -> Self {
        Self {
            start: today
                .checked_sub_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MIN),
            end: today,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageStats {
    pub message_count: usize,
    /// Mean text length in characters, rounded to two decimals.
    pub average_message_length: f64,
    pub unique_senders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationSummary {
    pub activities: usize,
    pub total_minutes: i64,
    pub average_minutes: f64,
}

/// Distinct message senders per day.
pub fn daily_active_users(records: &[Record], range: Option<DateRange>) -> Vec<DailyCount> {
    let mut per_day: BTreeMap<NaiveDate, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        let (Some(date), Some(sender)) = (record_date(record), sender_id(record)) else {
            continue;
        };
        if range.map_or(true, |r| r.contains(date)) {
            per_day.entry(date).or_default().insert(sender);
        }
    }
    per_day
        .into_iter()
        .map(|(date, senders)| DailyCount {
            date,
            count: senders.len(),
        })
        .collect()
}

/// Messages per day.
pub fn daily_message_volume(records: &[Record], range: Option<DateRange>) -> Vec<DailyCount> {
    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in records.iter().filter_map(record_date) {
        if range.map_or(true, |r| r.contains(date)) {
            *per_day.entry(date).or_default() += 1;
        }
    }
    per_day
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

pub fn message_stats(records: &[Record]) -> MessageStats {
    let lengths: Vec<usize> = records
        .iter()
        .filter_map(|r| first_str(r, &TEXT_KEYS))
        .map(|text| text.chars().count())
        .collect();
    let senders: BTreeSet<String> = records.iter().filter_map(sender_id).collect();

    let average = if lengths.is_empty() {
        0.0
    } else {
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
    };

    MessageStats {
        message_count: records.len(),
        average_message_length: (average * 100.0).round() / 100.0,
        unique_senders: senders.len(),
    }
}

/// Whole minutes between two RFC 3339 timestamps; 0 when either is missing or invalid.
pub fn duration_minutes(start: &str, end: &str) -> i64 {
    match (parse_rfc3339(start), parse_rfc3339(end)) {
        (Some(s), Some(e)) => (e - s).num_minutes(),
        _ => 0,
    }
}

pub fn activity_duration(record: &Record) -> i64 {
    let start = first_str(record, &START_KEYS).unwrap_or_default();
    let end = first_str(record, &END_KEYS).unwrap_or_default();
    duration_minutes(start, end)
}

pub fn call_durations(records: &[Record]) -> DurationSummary {
    let total: i64 = records.iter().map(activity_duration).sum();
    let average = if records.is_empty() {
        0.0
    } else {
        ((total as f64 / records.len() as f64) * 100.0).round() / 100.0
    };
    DurationSummary {
        activities: records.len(),
        total_minutes: total,
        average_minutes: average,
    }
}

/// Render a millisecond epoch timestamp as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_timestamp_ms(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("invalid_timestamp_{ms}"),
    }
}

/// Sender of a message: `senderId`, `userId`, `authorId`, then `author.id`.
pub fn sender_id(record: &Record) -> Option<String> {
    SENDER_KEYS
        .iter()
        .filter_map(|k| record.get(*k))
        .chain(record.get("author").and_then(|a| a.get("id")))
        .find_map(scalar)
}

/// Calendar day of a record from `createdAtMs` or a `createdAt` string.
pub fn record_date(record: &Record) -> Option<NaiveDate> {
    if let Some(ms) = record.get("createdAtMs").and_then(Value::as_i64) {
        return DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive());
    }
    let raw = record.get("createdAt")?.as_str()?;
    parse_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn first_str<'a>(record: &'a Record, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
