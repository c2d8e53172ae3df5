//! Single-instance lock: one marker file per store in a lock directory.
//!
//! Jobs and ad-hoc commands lock a store under a name derived from its
//! canonical path, so every spelling of one store maps to one marker.
//!
//! The marker is created with `create_new`, so two processes can never both
//! believe they hold it. The guard removes the marker when released or
//! dropped, which covers error and unwinding exits as well.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IoResultExt, Result, RotbackError};
use crate::platform;

const LOCK_PREFIX: &str = "rotback-";
const LOCK_SUFFIX: &str = ".lock";
const DEFAULT_STALE_LOCK_SECS: i64 = 6 * 60 * 60; // 6 hours

#[derive(Debug, Serialize, Deserialize)]
struct LockEntry {
    hostname: String,
    pid: u32,
    time: String,
}

/// Proof that the lock for one job is held.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    name: String,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the marker, reporting failure instead of only logging it.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RotbackError::io(&self.path, e)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(lock = %self.path.display(), error = %e, "failed to remove lock marker");
            }
        }
    }
}

/// Marker path for a lock name.
pub fn lock_path(lock_dir: &Path, name: &str) -> PathBuf {
    lock_dir.join(format!("{LOCK_PREFIX}{name}{LOCK_SUFFIX}"))
}

/// Acquire the lock for `name`, replacing a stale marker once.
pub fn acquire_lock(lock_dir: &Path, name: &str) -> Result<LockGuard> {
    fs::create_dir_all(lock_dir).at(lock_dir)?;
    let path = lock_path(lock_dir, name);

    for attempt in 0..2 {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let entry = LockEntry {
                    hostname: platform::hostname(),
                    pid: std::process::id(),
                    time: Utc::now().to_rfc3339(),
                };
                let guard = LockGuard {
                    path: path.clone(),
                    name: name.to_string(),
                    released: false,
                };
                let data = serde_json::to_vec(&entry)
                    .map_err(|e| RotbackError::Config(format!("lock serialize: {e}")))?;
                file.write_all(&data).at(&path)?;
                debug!(lock = %path.display(), "lock acquired");
                return Ok(guard);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if attempt == 0 && is_stale(&path, Duration::seconds(DEFAULT_STALE_LOCK_SECS)) {
                    warn!(lock = %path.display(), "removing stale lock marker");
                    match fs::remove_file(&path) {
                        Ok(()) => continue,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                        Err(e) => return Err(RotbackError::io(&path, e)),
                    }
                }
                return Err(RotbackError::Locked(path));
            }
            Err(e) => return Err(RotbackError::io(&path, e)),
        }
    }
    Err(RotbackError::Locked(path))
}

/// Release a lock explicitly.
pub fn release_lock(guard: LockGuard) -> Result<()> {
    guard.release()
}

/// Run `action` while holding the lock for `name`. The lock is released on
/// every exit path; if both the action and the release fail, the action's
/// error wins.
pub fn with_lock<T>(
    lock_dir: &Path,
    name: &str,
    action: impl FnOnce(&LockGuard) -> Result<T>,
) -> Result<T> {
    let guard = acquire_lock(lock_dir, name)?;
    let result = action(&guard);

    match guard.release() {
        Ok(()) => result,
        Err(release_err) => {
            if result.is_err() {
                warn!("failed to release lock: {release_err}");
                result
            } else {
                Err(release_err)
            }
        }
    }
}

/// Lock name for the store at `store_root`. Fails with `StoreUnavailable`
/// when the store cannot be resolved.
pub fn store_lock_name(store_root: &Path) -> Result<String> {
    let canonical = fs::canonicalize(store_root)
        .map_err(|_| RotbackError::StoreUnavailable(store_root.to_path_buf()))?;
    let sanitized: String = canonical
        .to_string_lossy()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    Ok(format!("store{sanitized}"))
}

/// Run `action` while holding the lock of the store at `store_root`.
pub fn with_store_lock<T>(
    lock_dir: &Path,
    store_root: &Path,
    action: impl FnOnce(&LockGuard) -> Result<T>,
) -> Result<T> {
    let name = store_lock_name(store_root)?;
    with_lock(lock_dir, &name, action)
}

/// Forcibly remove every rotback lock marker in `lock_dir`.
/// Returns the number of markers removed.
pub fn break_lock(lock_dir: &Path) -> Result<usize> {
    let mut removed = 0usize;
    let entries = match fs::read_dir(lock_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(RotbackError::io(lock_dir, e)),
    };
    for entry in entries {
        let entry = entry.at(lock_dir)?;
        let is_marker = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(LOCK_PREFIX) && n.ends_with(LOCK_SUFFIX));
        if is_marker {
            fs::remove_file(entry.path()).at(&entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// A marker is stale when its process is gone on this host, or when it is
/// older than `max_age` and cannot be checked (other host, unreadable body).
fn is_stale(path: &Path, max_age: Duration) -> bool {
    let entry = fs::read(path)
        .ok()
        .and_then(|data| serde_json::from_slice::<LockEntry>(&data).ok());

    match entry {
        Some(entry) if entry.hostname == platform::hostname() => {
            !platform::process_alive(entry.pid)
        }
        Some(entry) => DateTime::parse_from_rfc3339(&entry.time)
            .map(|t| Utc::now().signed_duration_since(t.with_timezone(&Utc)) > max_age)
            .unwrap_or(true),
        None => fs::metadata(path)
            .and_then(|m| m.modified())
            .map(|modified| {
                let modified: DateTime<Utc> = modified.into();
                Utc::now().signed_duration_since(modified) > max_age
            })
            .unwrap_or(false),
    }
}
