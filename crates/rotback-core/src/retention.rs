//! Age-based retention for flat dated entries (`<timestamp>.<label>.<ext>`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::error::{IoResultExt, Result, RotbackError};
use crate::naming::DatedName;
use crate::platform::fs::remove_entry;

/// Outcome of one sweep. Individual delete failures do not abort the sweep;
/// they are collected here.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub retained: usize,
    pub failures: Vec<RotbackError>,
}

impl SweepReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One dated entry of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedEntry {
    pub name: DatedName,
    pub path: PathBuf,
}

/// Dumps sharing one capture timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedGroup {
    pub timestamp: NaiveDateTime,
    pub entries: Vec<DatedEntry>,
}

impl DatedGroup {
    pub fn labels(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| e.name.label.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AgeRetentionPolicy {
    keep_days: u32,
}

impl AgeRetentionPolicy {
    pub fn new(keep_days: u32) -> Self {
        Self { keep_days }
    }

    pub fn keep_days(&self) -> u32 {
        self.keep_days
    }

    /// Entries strictly older than this are deleted. A window reaching past
    /// the earliest representable date keeps everything.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        Duration::try_days(i64::from(self.keep_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(NaiveDateTime::MIN)
    }

    /// Delete every dated entry in `store_root` older than the cutoff.
    /// Fails up front only if the store itself is unusable.
    pub fn sweep(&self, store_root: &Path, now: NaiveDateTime) -> Result<SweepReport> {
        self.sweep_with(store_root, now, remove_entry)
    }

    pub(crate) fn sweep_with(
        &self,
        store_root: &Path,
        now: NaiveDateTime,
        mut remove: impl FnMut(&Path) -> Result<()>,
    ) -> Result<SweepReport> {
        let entries = scan_dated(store_root)?;
        let cutoff = self.cutoff(now);
        let mut report = SweepReport::default();

        for entry in entries {
            if entry.name.timestamp >= cutoff {
                report.retained += 1;
                continue;
            }
            debug!(path = %entry.path.display(), "deleting expired entry");
            match remove(&entry.path) {
                Ok(()) => report.deleted.push(entry.path),
                Err(err) => {
                    warn!(path = %entry.path.display(), error = %err, "failed to delete expired entry");
                    report.failures.push(err);
                }
            }
        }

        info!(
            store = %store_root.display(),
            deleted = report.deleted.len(),
            retained = report.retained,
            failed = report.failures.len(),
            "age sweep complete"
        );
        Ok(report)
    }
}

fn ensure_store(store_root: &Path) -> Result<()> {
    if !store_root.is_dir() {
        return Err(RotbackError::StoreUnavailable(store_root.to_path_buf()));
    }
    Ok(())
}

/// All entries of `store_root` whose names start with a valid timestamp,
/// oldest first.
pub fn scan_dated(store_root: &Path) -> Result<Vec<DatedEntry>> {
    ensure_store(store_root)?;
    let mut entries = Vec::new();
    for entry in fs::read_dir(store_root).at(store_root)? {
        let entry = entry.at(store_root)?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(DatedName::parse) else {
            continue;
        };
        entries.push(DatedEntry {
            name,
            path: entry.path(),
        });
    }
    entries.sort_by(|a, b| {
        a.name
            .timestamp
            .cmp(&b.name.timestamp)
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(entries)
}

/// Dated entries grouped by capture time, newest group first.
pub fn list_dated(store_root: &Path) -> Result<Vec<DatedGroup>> {
    let mut groups: BTreeMap<NaiveDateTime, Vec<DatedEntry>> = BTreeMap::new();
    for entry in scan_dated(store_root)? {
        groups.entry(entry.name.timestamp).or_default().push(entry);
    }
    Ok(groups
        .into_iter()
        .rev()
        .map(|(timestamp, entries)| DatedGroup { timestamp, entries })
        .collect())
}

/// Sweep `store_root` with the local wall clock.
pub fn sweep(keep_days: u32, store_root: impl AsRef<Path>) -> Result<SweepReport> {
    AgeRetentionPolicy::new(keep_days).sweep(store_root.as_ref(), Local::now().naive_local())
}
