//! Per-job orchestration: pick the retention policy, make room, and hand the
//! resulting target to the transfer collaborator.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::config::{JobConfig, Policy, RotbackConfig};
use crate::error::{IoResultExt, Result, RotbackError};
use crate::lock::{with_store_lock, LockGuard};
use crate::retention::{AgeRetentionPolicy, SweepReport};
use crate::store::{Generation, GenerationStore};
use crate::transfer::{run_dumps, run_rsync, DumpReport};

/// What one job run did.
#[derive(Debug)]
pub struct JobReport {
    pub job: String,
    pub policy: Policy,
    /// Surviving generations after rotation, newest first.
    pub generations: Vec<Generation>,
    /// Where the snapshot of this run was written.
    pub target: Option<PathBuf>,
    pub sweep: Option<SweepReport>,
    pub dumps: Option<DumpReport>,
}

impl JobReport {
    fn new(job: &JobConfig) -> Self {
        Self {
            job: job.name.clone(),
            policy: job.policy,
            generations: Vec::new(),
            target: None,
            sweep: None,
            dumps: None,
        }
    }

    /// False when a sweep delete or a dump label failed.
    pub fn is_clean(&self) -> bool {
        self.sweep.as_ref().map_or(true, SweepReport::is_clean)
            && self.dumps.as_ref().map_or(true, DumpReport::is_clean)
    }
}

/// Selects and runs the retention policy of one job, then its transfer.
#[derive(Debug)]
pub struct RotationDriver<'a> {
    job: &'a JobConfig,
    shutdown: Option<&'a AtomicBool>,
}

impl<'a> RotationDriver<'a> {
    pub fn new(job: &'a JobConfig) -> Self {
        Self {
            job,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: &'a AtomicBool) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Rotate or sweep only, without running the transfer.
    pub fn prepare(&self, _lock: &LockGuard, now: NaiveDateTime) -> Result<JobReport> {
        let mut report = JobReport::new(self.job);
        match self.job.policy {
            Policy::Generations => {
                let store = GenerationStore::open(self.job.store_path(), self.job.keep)?;
                let generations = store.rotate(now, self.shutdown)?;
                let target = match generations.first() {
                    Some(head) if head.index() == 0 => head.path.clone(),
                    _ => store.zero_path(now, &self.job.name, None),
                };
                report.generations = generations;
                report.target = Some(target);
            }
            Policy::Age => {
                let policy = AgeRetentionPolicy::new(self.job.keep);
                report.sweep = Some(policy.sweep(&self.job.store_path(), now)?);
            }
        }
        Ok(report)
    }

    /// Full run: make room, then fill the store.
    pub fn run(&self, lock: &LockGuard, now: NaiveDateTime) -> Result<JobReport> {
        let mut report = self.prepare(lock, now)?;
        match self.job.policy {
            Policy::Generations => {
                let rsync = self.job.rsync.as_ref().ok_or_else(|| {
                    RotbackError::Config(format!("job '{}' has no rsync section", self.job.name))
                })?;
                if let Some(target) = &report.target {
                    fs::create_dir_all(target).at(target)?;
                    run_rsync(rsync, target, self.shutdown)?;
                }
            }
            Policy::Age => {
                let dump = self.job.dump.as_ref().ok_or_else(|| {
                    RotbackError::Config(format!("job '{}' has no dump section", self.job.name))
                })?;
                report.dumps = Some(run_dumps(dump, &self.job.store_path(), now, self.shutdown)?);
            }
        }

        if report.is_clean() {
            info!(job = %self.job.name, "job complete");
        } else {
            warn!(job = %self.job.name, "job completed with failures");
        }
        Ok(report)
    }
}

/// Run `job` holding its store's lock in `config`'s lock directory. Jobs
/// sharing a store exclude each other.
pub fn run_job(
    config: &RotbackConfig,
    job: &JobConfig,
    now: NaiveDateTime,
    shutdown: Option<&AtomicBool>,
) -> Result<JobReport> {
    with_store_lock(&config.lock_dir(), &job.store_path(), |guard| {
        let mut driver = RotationDriver::new(job);
        if let Some(flag) = shutdown {
            driver = driver.with_shutdown(flag);
        }
        driver.run(guard, now)
    })
}
