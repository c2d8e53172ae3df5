use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::error::{Result, RotbackError};
use crate::naming::validate_label;
use crate::platform::paths::default_lock_dir;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotbackConfig {
    /// Directory for single-instance lock markers. Default: system temp dir.
    #[serde(default)]
    pub lock_dir: Option<String>,
    pub jobs: Vec<JobConfig>,
}

impl RotbackConfig {
    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_lock_dir)
    }

    pub fn select_job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(RotbackError::Config("'jobs:' must not be empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for job in &self.jobs {
            if !seen.insert(job.name.as_str()) {
                return Err(RotbackError::Config(format!(
                    "duplicate job name: '{}'",
                    job.name
                )));
            }
            job.validate()?;
        }
        Ok(())
    }
}

/// How a job's store is kept within budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Numbered generations with hard-link clones; `keep` counts generations.
    Generations,
    /// Flat dated dumps; `keep` counts days.
    Age,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Generations => f.write_str("generations"),
            Policy::Age => f.write_str("age"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Job name; also the label embedded in generation names.
    pub name: String,
    /// Local store directory. Must already exist.
    pub store: String,
    #[serde(default = "default_policy")]
    pub policy: Policy,
    #[serde(default = "default_keep")]
    pub keep: u32,
    #[serde(default)]
    pub rsync: Option<RsyncConfig>,
    #[serde(default)]
    pub dump: Option<DumpConfig>,
}

impl JobConfig {
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store)
    }

    pub fn validate(&self) -> Result<()> {
        validate_label(&self.name)
            .map_err(|e| RotbackError::Config(format!("job '{}': {e}", self.name)))?;
        if self.store.trim().is_empty() {
            return Err(RotbackError::Config(format!(
                "job '{}': store must not be empty",
                self.name
            )));
        }
        match self.policy {
            Policy::Generations => {
                if self.keep == 0 {
                    return Err(RotbackError::Config(format!(
                        "job '{}': keep must be at least 1",
                        self.name
                    )));
                }
                let Some(rsync) = &self.rsync else {
                    return Err(RotbackError::Config(format!(
                        "job '{}': policy 'generations' requires an 'rsync' section",
                        self.name
                    )));
                };
                if rsync.paths.is_empty() {
                    return Err(RotbackError::Config(format!(
                        "job '{}': rsync.paths must not be empty",
                        self.name
                    )));
                }
            }
            Policy::Age => {
                let Some(dump) = &self.dump else {
                    return Err(RotbackError::Config(format!(
                        "job '{}': policy 'age' requires a 'dump' section",
                        self.name
                    )));
                };
                if dump.labels.is_empty() {
                    return Err(RotbackError::Config(format!(
                        "job '{}': dump.labels must not be empty",
                        self.name
                    )));
                }
                for label in &dump.labels {
                    validate_label(label)
                        .map_err(|e| RotbackError::Config(format!("job '{}': {e}", self.name)))?;
                }
            }
        }
        Ok(())
    }
}

/// Mirror local or remote paths into the newest generation with rsync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RsyncConfig {
    pub paths: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Pull from this host over SSH instead of the local filesystem.
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_remote_user")]
    pub user: String,
    /// Remote shell passed as `rsync -e`, e.g. `ssh -p 2222`.
    #[serde(default)]
    pub rsh: Option<String>,
    #[serde(default = "default_rsync_binary")]
    pub binary: String,
}

/// Produce one dated file per label from a shell command's stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpConfig {
    /// Shell command; `{label}` is replaced with the shell-escaped label.
    pub command: String,
    pub labels: Vec<String>,
    #[serde(default = "default_dump_extension")]
    pub extension: String,
}
