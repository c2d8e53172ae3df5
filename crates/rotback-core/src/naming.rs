//! On-disk naming grammar shared by the generation store and the age sweep.
//!
//! Generation entries are named `<index>.<timestamp>.<label>[.<extension>]`
//! and dated dumps `<timestamp>.<label>[.<extension>]`. The index is written
//! zero-padded to the number of decimal digits in the retention limit so
//! lexicographic and numeric order agree; any width is accepted on read.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Result, RotbackError};

pub const SEPARATOR: char = '.';
pub const TIMESTAMP_LEN: usize = 14;

/// Prefix of in-progress clone directories. Never parsed as a generation.
pub const STAGING_PREFIX: &str = ".rotback-staging-";

/// Render a timestamp as `YYYYMMDDHHMMSS`.
pub fn format_timestamp(t: NaiveDateTime) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute(),
        t.second()
    )
}

/// Parse exactly 14 ASCII digits as `YYYYMMDDHHMMSS`.
/// Returns `None` for anything else, including impossible dates.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if s.len() != TIMESTAMP_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let num = |range: std::ops::Range<usize>| s[range].parse::<u32>().ok();
    let year = num(0..4)? as i32;
    NaiveDate::from_ymd_opt(year, num(4..6)?, num(6..8)?)?.and_hms_opt(
        num(8..10)?,
        num(10..12)?,
        num(12..14)?,
    )
}

/// Number of decimal digits used for indices under the given retention limit.
pub fn index_width(keep: u32) -> usize {
    keep.max(1).to_string().len()
}

pub fn format_index(index: u32, keep: u32) -> String {
    format!("{index:0width$}", width = index_width(keep))
}

fn parse_index(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Labels are opaque but may not be empty or contain the separator.
pub fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(RotbackError::Config("label must not be empty".into()));
    }
    if label.contains(SEPARATOR) || label.contains('/') {
        return Err(RotbackError::Config(format!(
            "label '{label}' must not contain '{SEPARATOR}' or '/'"
        )));
    }
    Ok(())
}

/// Split `<timestamp>.<label>[.<extension>]` after the timestamp has been
/// stripped off.
fn split_label(rest: &str) -> Option<(String, Option<String>)> {
    let (label, extension) = match rest.split_once(SEPARATOR) {
        Some((label, ext)) => (label, Some(ext)),
        None => (rest, None),
    };
    if label.is_empty() || extension.is_some_and(str::is_empty) {
        return None;
    }
    Some((label.to_string(), extension.map(str::to_string)))
}

/// Parsed name of one managed generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationName {
    pub index: u32,
    pub timestamp: NaiveDateTime,
    pub label: String,
    pub extension: Option<String>,
}

impl GenerationName {
    pub fn new(index: u32, timestamp: NaiveDateTime, label: impl Into<String>) -> Self {
        Self {
            index,
            timestamp,
            label: label.into(),
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension.filter(|e| !e.is_empty());
        self
    }

    /// Parse a directory entry name. Non-conforming names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let (index, rest) = name.split_once(SEPARATOR)?;
        let index = parse_index(index)?;
        let (timestamp, rest) = rest.split_once(SEPARATOR)?;
        let timestamp = parse_timestamp(timestamp)?;
        let (label, extension) = split_label(rest)?;
        Some(Self {
            index,
            timestamp,
            label,
            extension,
        })
    }

    /// Render with the index padded for the given retention limit.
    pub fn render(&self, keep: u32) -> String {
        let mut out = format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            format_index(self.index, keep),
            format_timestamp(self.timestamp),
            self.label
        );
        if let Some(ext) = &self.extension {
            out.push(SEPARATOR);
            out.push_str(ext);
        }
        out
    }

    pub fn at_index(&self, index: u32) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }

    pub fn at_time(&self, timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    /// True when both names describe the same capture (timestamp, label, extension).
    pub fn same_capture(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.label == other.label
            && self.extension == other.extension
    }
}

/// Parsed name of one dated flat entry (age-based retention).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedName {
    pub timestamp: NaiveDateTime,
    pub label: Option<String>,
    pub extension: Option<String>,
}

impl DatedName {
    pub fn new(timestamp: NaiveDateTime, label: impl Into<String>, extension: Option<&str>) -> Self {
        Self {
            timestamp,
            label: Some(label.into()),
            extension: extension.filter(|e| !e.is_empty()).map(str::to_string),
        }
    }

    /// Parse `<timestamp>` or `<timestamp>.<label>[.<extension>]`.
    pub fn parse(name: &str) -> Option<Self> {
        let (timestamp, rest) = match name.split_once(SEPARATOR) {
            Some((ts, rest)) => (ts, Some(rest)),
            None => (name, None),
        };
        let timestamp = parse_timestamp(timestamp)?;
        let (label, extension) = match rest {
            Some(rest) => {
                let (label, ext) = split_label(rest)?;
                (Some(label), ext)
            }
            None => (None, None),
        };
        Some(Self {
            timestamp,
            label,
            extension,
        })
    }

    pub fn render(&self) -> String {
        let mut out = format_timestamp(self.timestamp);
        for part in [&self.label, &self.extension].into_iter().flatten() {
            out.push(SEPARATOR);
            out.push_str(part);
        }
        out
    }
}

impl fmt::Display for DatedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
