//! External collaborators that fill a store: rsync mirrors for generation
//! stores and shell dumps for dated stores.

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::config::{DumpConfig, RsyncConfig};
use crate::error::{IoResultExt, Result, RotbackError};
use crate::naming::DatedName;
use crate::platform::fs::remove_entry;
use crate::platform::shell::{command_for_script, shell_escape};

/// Source argument for one configured path.
pub fn rsync_source(config: &RsyncConfig, path: &str) -> String {
    match &config.server {
        Some(server) => format!("{}@{server}:{path}", config.user),
        None => path.to_string(),
    }
}

/// Arguments for mirroring `path` into `target`.
pub fn rsync_args(config: &RsyncConfig, path: &str, target: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-avR", "--ignore-errors", "--delete", "--delete-excluded"]
        .into_iter()
        .map(OsString::from)
        .collect();
    for pattern in &config.exclude {
        args.push("--exclude".into());
        args.push(pattern.into());
    }
    if let Some(rsh) = &config.rsh {
        args.push("-e".into());
        args.push(rsh.into());
    }
    args.push(rsync_source(config, path).into());
    args.push(target.as_os_str().to_owned());
    args
}

/// Mirror every configured path into `target`.
///
/// rsync exits non-zero for vanished or unreadable files on a live system,
/// so a failed run is only logged. Failing to start rsync at all is an error.
pub fn run_rsync(
    config: &RsyncConfig,
    target: &Path,
    shutdown: Option<&AtomicBool>,
) -> Result<()> {
    for path in &config.paths {
        if shutdown.is_some_and(|f| f.load(Ordering::SeqCst)) {
            return Err(RotbackError::Interrupted);
        }
        let args = rsync_args(config, path, target);
        debug!(binary = %config.binary, ?args, "running rsync");
        let status = Command::new(&config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| {
                RotbackError::Transfer(format!("failed to start '{}': {e}", config.binary))
            })?;
        if status.success() {
            info!(source = %rsync_source(config, path), target = %target.display(), "mirrored");
        } else {
            warn!(
                source = %rsync_source(config, path),
                code = ?status.code(),
                "rsync finished with errors"
            );
        }
    }
    Ok(())
}

/// Result of dumping every label of one job.
#[derive(Debug, Default)]
pub struct DumpReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<(String, RotbackError)>,
}

impl DumpReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Shell command for one label, with `{label}` substituted.
pub fn dump_command(config: &DumpConfig, label: &str) -> String {
    config.command.replace("{label}", &shell_escape(label))
}

/// Run the dump command once per label, each into
/// `<store>/<timestamp>.<label>.<extension>`. A failing label does not stop
/// the others.
pub fn run_dumps(
    config: &DumpConfig,
    store_root: &Path,
    now: NaiveDateTime,
    shutdown: Option<&AtomicBool>,
) -> Result<DumpReport> {
    let mut report = DumpReport::default();
    for label in &config.labels {
        if shutdown.is_some_and(|f| f.load(Ordering::SeqCst)) {
            return Err(RotbackError::Interrupted);
        }
        let name = DatedName::new(now, label.as_str(), Some(&config.extension));
        let target = store_root.join(name.render());
        match dump_one(config, label, &target) {
            Ok(()) => {
                info!(label = %label, path = %target.display(), "dump written");
                report.written.push(target);
            }
            Err(err) => {
                warn!(label = %label, error = %err, "dump failed");
                if let Err(cleanup) = remove_entry(&target) {
                    warn!(path = %target.display(), error = %cleanup, "failed to remove partial dump");
                }
                report.failures.push((label.clone(), err));
            }
        }
    }
    Ok(report)
}

fn dump_one(config: &DumpConfig, label: &str, target: &Path) -> Result<()> {
    let file = File::create(target).at(target)?;
    let command = dump_command(config, label);
    debug!(label = %label, command = %command, "running dump command");

    let output = command_for_script(&command)
        .stdin(Stdio::null())
        .stdout(Stdio::from(file))
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| RotbackError::Transfer(format!("failed to start dump for '{label}': {e}")))?;

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RotbackError::Transfer(format!(
            "dump for '{label}' failed (exit code {code}): {}",
            stderr.trim()
        )));
    }
    Ok(())
}
