use std::path::Path;

use rotback_core::config::{JobConfig, RotbackConfig};

use crate::cli::Commands;
use crate::cmd;
use crate::signal::SHUTDOWN;

/// Commands that work on explicit paths and need no config file.
pub(crate) fn is_standalone(cmd: &Commands) -> bool {
    matches!(cmd, Commands::Rotate { .. } | Commands::Sweep { .. })
}

/// Run a standalone command, locking its store in `lock_dir`.
pub(crate) fn dispatch_standalone(
    cmd: &Commands,
    lock_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Commands::Rotate { keep, store, label } => {
            cmd::rotate::run_rotate(*keep, store, label.as_deref(), lock_dir, &SHUTDOWN)
        }
        Commands::Sweep { keep_days, store } => cmd::sweep::run_sweep(*keep_days, store, lock_dir),
        _ => Err(format!("'{}' needs a config file", cmd.name()).into()),
    }
}

/// Jobs selected by `--job`, or all jobs.
pub(crate) fn select_jobs<'a>(
    config: &'a RotbackConfig,
    selector: Option<&str>,
) -> Result<Vec<&'a JobConfig>, Box<dyn std::error::Error>> {
    match selector {
        Some(name) => match config.select_job(name) {
            Some(job) => Ok(vec![job]),
            None => {
                let available: Vec<&str> = config.jobs.iter().map(|j| j.name.as_str()).collect();
                Err(format!(
                    "no job named '{name}' (available: {})",
                    available.join(", ")
                )
                .into())
            }
        },
        None => Ok(config.jobs.iter().collect()),
    }
}

/// Commands that act on the loaded config. Returns `Ok(false)` when the
/// command finished but some job failed.
pub(crate) fn dispatch_command(
    cmd: &Commands,
    config: &RotbackConfig,
) -> Result<bool, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Run { job } => {
            let jobs = select_jobs(config, job.as_deref())?;
            cmd::run::run_jobs(config, &jobs, &SHUTDOWN)
        }
        Commands::List { job } => {
            let jobs = select_jobs(config, job.as_deref())?;
            let multi = jobs.len() > 1;
            for job in jobs {
                if multi {
                    println!("--- Job: {} ({}) ---", job.name, job.policy);
                }
                cmd::list::run_list(job)?;
            }
            Ok(true)
        }
        Commands::BreakLock => {
            cmd::break_lock::run_break_lock(&config.lock_dir())?;
            Ok(true)
        }
        Commands::Rotate { .. } | Commands::Sweep { .. } | Commands::Config { .. } => {
            Err(format!("'{}' is handled before config loading", cmd.name()).into())
        }
    }
}
