use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};

/// Timestamp embedded in archive file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Json,
    Csv,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Json => "json",
            ArchiveFormat::Csv => "csv",
        }
    }
}

/// What gets written to an archive file.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveContent {
    Json(Value),
    Csv {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl ArchiveContent {
    pub fn format(&self) -> ArchiveFormat {
        match self {
            ArchiveContent::Json(_) => ArchiveFormat::Json,
            ArchiveContent::Csv { .. } => ArchiveFormat::Csv,
        }
    }
}

/// Outcome of checking for older archives of the same prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveDecision {
    /// Write to this path; older archives have been removed.
    Write(PathBuf),
    /// An archive at least as new already exists at this path.
    SkipNewer(PathBuf),
}

/// `<prefix>_<timestamp>.<ext>`
pub fn timestamped_name(prefix: &str, extension: &str, now: NaiveDateTime) -> String {
    format!("{}_{}.{}", prefix, now.format(TIMESTAMP_FORMAT), extension)
}

/// Inverse of [`timestamped_name`]. None if the name does not belong to the prefix.
pub fn parse_timestamped_name(
    file_name: &str,
    prefix: &str,
    extension: &str,
) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(extension)?
        .strip_suffix('.')?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// Decide where an archive stamped `now` goes.
///
/// If an archive with the same prefix and a timestamp at or after `now`
/// exists, writing is skipped. Otherwise older archives are deleted. Files
/// whose names do not parse are left alone.
pub fn resolve_timestamped(
    dir: &Path,
    prefix: &str,
    extension: &str,
    now: NaiveDateTime,
) -> StateResult<SaveDecision> {
    let target = dir.join(timestamped_name(prefix, extension, now));
    if !dir.exists() {
        return Ok(SaveDecision::Write(target));
    }

    let mut older = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| StateError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| StateError::io(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stamp) = parse_timestamped_name(name, prefix, extension) else {
            continue;
        };
        if stamp >= now {
            return Ok(SaveDecision::SkipNewer(path));
        }
        older.push(path);
    }

    for path in older {
        debug!(path = %path.display(), "Removing older archive");
        fs::remove_file(&path).map_err(|e| StateError::io(&path, e))?;
    }
    Ok(SaveDecision::Write(target))
}

/// Pretty JSON through a buffer. The final flush is checked so a failed
/// write never reports success.
fn write_json<W: Write>(sink: W, value: &Value, path: &Path) -> StateResult<()> {
    let mut writer = BufWriter::new(sink);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| StateError::io(path, e))
}

/// Writes archives below a root directory.
pub struct ArchiveWriter {
    root: PathBuf,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `content` to `root/relative`, creating parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, content: &ArchiveContent) -> StateResult<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        match content {
            ArchiveContent::Json(value) => {
                let file = File::create(&path).map_err(|e| StateError::io(&path, e))?;
                write_json(file, value, &path)?;
            }
            ArchiveContent::Csv { headers, rows } => {
                let mut writer = csv::Writer::from_path(&path)?;
                writer.write_record(headers)?;
                for row in rows {
                    writer.write_record(row)?;
                }
                writer.flush().map_err(|e| StateError::io(&path, e))?;
            }
        }

        info!(path = %path.display(), "Archive written");
        Ok(path)
    }

    /// Write a timestamped archive into `root/dir`, unless a newer one exists.
    pub fn write_timestamped(
        &self,
        dir: impl AsRef<Path>,
        prefix: &str,
        content: &ArchiveContent,
        now: NaiveDateTime,
    ) -> StateResult<SaveDecision> {
        let dir = self.root.join(dir);
        let extension = content.format().extension();
        match resolve_timestamped(&dir, prefix, extension, now)? {
            SaveDecision::Write(path) => {
                let relative = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
                let written = self.write(relative, content)?;
                Ok(SaveDecision::Write(written))
            }
            skip @ SaveDecision::SkipNewer(_) => {
                info!(prefix, "Newer archive exists, skipping");
                Ok(skip)
            }
        }
    }
}
