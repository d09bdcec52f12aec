use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use linkpull_core::report::{
    call_durations, daily_active_users, daily_message_volume, DailyCount, DateRange,
    DurationSummary,
};
use linkpull_core::{Identifier, IdentifierSpec, Record};

use crate::cli::{ReportFormat, ReportKind};

/// Archive files under `path`: the file itself, or every `.json` below a directory.
fn collect_files(path: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !path.is_dir() {
        out.push(path.to_path_buf());
        return Ok(());
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            collect_files(&entry, out)?;
        } else if entry.extension().is_some_and(|ext| ext == "json") {
            out.push(entry);
        }
    }
    Ok(())
}

/// Records of one archive: the `items` of a fetch archive, or a bare array.
fn archive_records(path: &Path) -> Result<Option<Vec<Record>>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    Ok(Some(
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect(),
    ))
}

/// Records from every archive under `inputs`. The same record seen in more
/// than one archive (a per-chat file and the combined batch file) is kept once,
/// keyed by its chat and identifier. Records without an identifier are all kept.
pub fn load_records(inputs: &[PathBuf], identify: &IdentifierSpec) -> Result<Vec<Record>> {
    let mut files = Vec::new();
    for input in inputs {
        collect_files(input, &mut files)?;
    }

    let mut seen: BTreeSet<(String, Identifier)> = BTreeSet::new();
    let mut records = Vec::new();
    let mut repeated = 0usize;
    for file in &files {
        match archive_records(file)? {
            Some(found) => {
                info!(file = %file.display(), records = found.len(), "Loaded archive");
                for record in found {
                    if let Some(id) = identify.extract(&record) {
                        let chat = record.get("chat_id").and_then(Value::as_str).unwrap_or_default();
                        if !seen.insert((chat.to_string(), id)) {
                            repeated += 1;
                            continue;
                        }
                    }
                    records.push(record);
                }
            }
            None => warn!(file = %file.display(), "No record list in file, skipping"),
        }
    }
    if repeated > 0 {
        info!(repeated, "Skipped records already loaded from another archive");
    }
    Ok(records)
}

fn to_csv(headers: &[&str], rows: Vec<Vec<String>>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn render_daily(label: &str, counts: &[DailyCount], format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Csv => to_csv(
            &["date", label],
            counts
                .iter()
                .map(|c| vec![c.date.to_string(), c.count.to_string()])
                .collect(),
        ),
        ReportFormat::Table => {
            if counts.is_empty() {
                return Ok("No dated records.\n".to_string());
            }
            let mut out = format!("{:<12} {:>10}\n{:-<23}\n", "Date", label, "");
            for c in counts {
                out.push_str(&format!("{:<12} {:>10}\n", c.date.to_string(), c.count));
            }
            Ok(out)
        }
    }
}

pub fn render_durations(summary: &DurationSummary, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Csv => to_csv(
            &["activities", "total_minutes", "average_minutes"],
            vec![vec![
                summary.activities.to_string(),
                summary.total_minutes.to_string(),
                format!("{:.2}", summary.average_minutes),
            ]],
        ),
        ReportFormat::Table => Ok(format!(
            "Activities:      {}\nTotal minutes:   {}\nAverage minutes: {:.2}\n",
            summary.activities, summary.total_minutes, summary.average_minutes
        )),
    }
}

/// Build the requested report. `today` anchors `--days-back`.
pub fn build_report(kind: &ReportKind, today: NaiveDate) -> Result<String> {
    match kind {
        ReportKind::ActiveUsers { inputs, days_back, format } => {
            let records = load_records(inputs, &IdentifierSpec::messages())?;
            let range = days_back.map(|days| DateRange::days_back(days, today));
            render_daily("active_users", &daily_active_users(&records, range), *format)
        }
        ReportKind::MessageVolume { inputs, days_back, format } => {
            let records = load_records(inputs, &IdentifierSpec::messages())?;
            let range = days_back.map(|days| DateRange::days_back(days, today));
            render_daily("messages", &daily_message_volume(&records, range), *format)
        }
        ReportKind::CallDuration { inputs, format } => {
            let records = load_records(inputs, &IdentifierSpec::activities())?;
            render_durations(&call_durations(&records), *format)
        }
    }
}

pub fn cmd_report(kind: &ReportKind, today: NaiveDate) -> Result<()> {
    print!("{}", build_report(kind, today)?);
    Ok(())
}
