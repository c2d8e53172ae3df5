//! Numbered-generation store: discovery and rotation.
//!
//! A store is one directory holding entries named
//! `<index>.<timestamp>.<label>[.<extension>]`, index 0 being the newest.
//! Rotation makes room for a new snapshot: older entries shift up one index,
//! entries falling off the retention limit are deleted, and a directory at
//! index 0 is hard-link cloned to index 1 before the original is renamed to a
//! fresh timestamp so the next transfer only rewrites changed files.
//!
//! Every pass is derived from the names currently on disk, so a pass that
//! stopped half way is finished by simply running it again.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, NaiveDateTime, Timelike};
use tracing::{debug, info, warn};

use crate::error::{IoResultExt, Result, RotbackError};
use crate::naming::{GenerationName, STAGING_PREFIX};
use crate::platform::fs::{entry_exists, hardlink_clone, remove_entry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Directory,
    File,
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationKind::Directory => f.write_str("dir"),
            GenerationKind::File => f.write_str("file"),
        }
    }
}

/// One managed entry of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub name: GenerationName,
    pub kind: GenerationKind,
    pub path: PathBuf,
}

impl Generation {
    pub fn index(&self) -> u32 {
        self.name.index
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.name.timestamp
    }

    pub fn label(&self) -> &str {
        &self.name.label
    }
}

/// A single filesystem operation of a rotation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Evict { path: PathBuf, index: u32 },
    Rename { from: PathBuf, to: PathBuf },
    Clone { from: PathBuf, to: PathBuf },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Evict { path, .. } => write!(f, "evict  {}", path.display()),
            Step::Rename { from, to } => {
                write!(f, "rename {} -> {}", from.display(), to.display())
            }
            Step::Clone { from, to } => {
                write!(f, "clone  {} -> {}", from.display(), to.display())
            }
        }
    }
}

/// The ordered steps of a rotation and the generations that survive it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationPlan {
    pub steps: Vec<Step>,
    /// Surviving generations after the pass, newest first.
    pub survivors: Vec<Generation>,
}

impl RotationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.survivors.is_empty()
    }

    /// The index-0 path the next snapshot must be written into, if the pass
    /// produces one.
    pub fn target(&self) -> Option<&Generation> {
        self.survivors.first().filter(|g| g.index() == 0)
    }
}

/// Handle on one store directory with its retention limit.
#[derive(Debug, Clone)]
pub struct GenerationStore {
    root: PathBuf,
    keep: u32,
}

impl GenerationStore {
    /// Open an existing store. `keep` must be at least 1.
    pub fn open(root: impl AsRef<Path>, keep: u32) -> Result<Self> {
        if keep == 0 {
            return Err(RotbackError::Config(
                "keep must be at least 1 for a generation store".into(),
            ));
        }
        let root = root.as_ref();
        let canonical = fs::canonicalize(root)
            .map_err(|_| RotbackError::StoreUnavailable(root.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(RotbackError::StoreUnavailable(root.to_path_buf()));
        }
        Ok(Self {
            root: canonical,
            keep,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keep(&self) -> u32 {
        self.keep
    }

    pub fn path_for(&self, name: &GenerationName) -> PathBuf {
        self.root.join(name.render(self.keep))
    }

    /// Conventional index-0 path for a brand-new generation.
    pub fn zero_path(
        &self,
        now: NaiveDateTime,
        label: &str,
        extension: Option<&str>,
    ) -> PathBuf {
        let name = GenerationName::new(0, now, label)
            .with_extension(extension.map(str::to_string));
        self.path_for(&name)
    }

    /// Scan the store one level deep. Entries whose names do not follow the
    /// grammar are ignored. Returned in ascending index order.
    pub fn discover(&self) -> Result<Vec<Generation>> {
        let mut generations: Vec<Generation> = Vec::new();

        for entry in fs::read_dir(&self.root).at(&self.root)? {
            let entry = entry.at(&self.root)?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(name) = GenerationName::parse(file_name) else {
                continue;
            };
            let file_type = entry.file_type().at(&entry.path())?;
            let kind = if file_type.is_dir() {
                GenerationKind::Directory
            } else {
                GenerationKind::File
            };
            generations.push(Generation {
                name,
                kind,
                path: entry.path(),
            });
        }

        generations.sort_by(|a, b| a.index().cmp(&b.index()).then(a.path.cmp(&b.path)));
        if let Some(pair) = generations.windows(2).find(|w| w[0].index() == w[1].index()) {
            return Err(RotbackError::NamingConflict(pair[1].path.clone()));
        }
        Ok(generations)
    }

    /// Compute the steps that rotate `generations` (as returned by
    /// [`discover`](Self::discover)) with `now` as the new index-0 timestamp.
    ///
    /// Older entries are renumbered by rank, so gaps left by an interrupted
    /// pass close up instead of pushing entries past the limit. A directory
    /// at index 1 carrying the same capture as index 0 is the finished clone
    /// of an interrupted pass and is reused.
    ///
    /// A directory head can only be renewed to a strictly later timestamp.
    /// Renewing it in the same second, or with a clock that went backwards,
    /// would leave two entries with one capture and is a `NamingConflict`.
    pub fn plan(&self, generations: &[Generation], now: NaiveDateTime) -> Result<RotationPlan> {
        // names only carry whole seconds
        let now = now.with_nanosecond(0).unwrap_or(now);
        let keep = u64::from(self.keep);
        let (head, older) = match generations.split_first() {
            Some((first, rest)) if first.index() == 0 => (Some(first), rest),
            _ => (None, generations),
        };

        let head_is_dir = head.is_some_and(|h| h.kind == GenerationKind::Directory);
        if let Some(head) = head.filter(|_| head_is_dir) {
            if now <= head.timestamp() {
                warn!(
                    head = %head.path.display(),
                    now = %now,
                    "clock is not past the newest generation"
                );
                return Err(RotbackError::NamingConflict(head.path.clone()));
            }
        }
        let clone_in_place = head_is_dir
            && keep > 1
            && older.first().is_some_and(|o| {
                o.index() == 1
                    && o.kind == GenerationKind::Directory
                    && head.is_some_and(|h| o.name.same_capture(&h.name))
            });
        let head_takes_one = head.is_some() && !clone_in_place && (!head_is_dir || keep > 1);
        let base: u64 = if head_takes_one { 2 } else { 1 };

        let mut evictions: Vec<&Generation> = Vec::new();
        let mut downward: Vec<Step> = Vec::new();
        let mut upward: Vec<Step> = Vec::new();
        let mut survivors: Vec<Generation> = Vec::new();

        for (rank, generation) in older.iter().enumerate() {
            let target = rank as u64 + base;
            if u64::from(generation.index()) >= keep || target >= keep {
                evictions.push(generation);
                continue;
            }
            let survivor = self.moved(generation, generation.name.at_index(target as u32));
            if survivor.path != generation.path {
                let step = Step::Rename {
                    from: generation.path.clone(),
                    to: survivor.path.clone(),
                };
                match target.cmp(&u64::from(generation.index())) {
                    CmpOrdering::Greater => upward.push(step),
                    _ => downward.push(step),
                }
            }
            survivors.push(survivor);
        }

        let mut head_steps: Vec<Step> = Vec::new();
        let mut head_survivors: Vec<Generation> = Vec::new();
        if let Some(head) = head {
            match head.kind {
                GenerationKind::Directory => {
                    if keep > 1 && !clone_in_place {
                        let clone = self.moved(head, head.name.at_index(1));
                        head_steps.push(Step::Clone {
                            from: head.path.clone(),
                            to: clone.path.clone(),
                        });
                        head_survivors.push(clone);
                    }
                    let renewed = self.moved(head, head.name.at_time(now));
                    head_steps.push(Step::Rename {
                        from: head.path.clone(),
                        to: renewed.path.clone(),
                    });
                    head_survivors.insert(0, renewed);
                }
                GenerationKind::File if keep > 1 => {
                    let shifted = self.moved(head, head.name.at_index(1));
                    head_steps.push(Step::Rename {
                        from: head.path.clone(),
                        to: shifted.path.clone(),
                    });
                    head_survivors.push(shifted);
                }
                GenerationKind::File => evictions.push(head),
            }
        }

        // Highest index first, so an interrupted pass never leaves a younger
        // entry deleted while an older one survives.
        evictions.sort_by(|a, b| b.index().cmp(&a.index()));
        upward.reverse();

        let mut steps: Vec<Step> = evictions
            .into_iter()
            .map(|g| Step::Evict {
                path: g.path.clone(),
                index: g.index(),
            })
            .collect();
        steps.extend(downward);
        steps.extend(upward);
        steps.extend(head_steps);

        head_survivors.extend(survivors);
        Ok(RotationPlan {
            steps,
            survivors: head_survivors,
        })
    }

    /// Rotate the store. Returns every generation left after the pass, newest
    /// first, including those whose path did not change (an entry already in
    /// place, or a clone reused on resume). When the first one has index 0 it
    /// is the path the next snapshot goes into.
    ///
    /// `shutdown` is checked before every filesystem step; a step that has
    /// started always runs to completion. The pass stops at the first failed
    /// step and returns its error; steps already done are not undone.
    pub fn rotate(
        &self,
        now: NaiveDateTime,
        shutdown: Option<&AtomicBool>,
    ) -> Result<Vec<Generation>> {
        self.remove_stale_staging()?;

        let generations = self.discover()?;
        if generations.is_empty() {
            debug!(store = %self.root.display(), "no generations to rotate");
            return Ok(Vec::new());
        }

        let plan = self.plan(&generations, now)?;
        self.execute(&plan, shutdown)?;
        Ok(plan.survivors)
    }

    /// Run the steps of `plan` in order.
    pub(crate) fn execute(
        &self,
        plan: &RotationPlan,
        shutdown: Option<&AtomicBool>,
    ) -> Result<()> {
        let mut evicted = 0usize;
        let mut moved = 0usize;

        for step in &plan.steps {
            if shutdown.is_some_and(|f| f.load(Ordering::SeqCst)) {
                return Err(RotbackError::Interrupted);
            }
            match step {
                Step::Evict { path, index } => {
                    debug!(index, path = %path.display(), "evicting generation");
                    remove_entry(path)?;
                    evicted += 1;
                }
                Step::Rename { from, to } => {
                    debug!(from = %from.display(), to = %to.display(), "renaming generation");
                    ensure_vacant(to)?;
                    fs::rename(from, to).at(from)?;
                    moved += 1;
                }
                Step::Clone { from, to } => {
                    self.clone_generation(from, to)?;
                }
            }
        }

        info!(
            store = %self.root.display(),
            evicted,
            moved,
            survivors = plan.survivors.len(),
            "rotation complete"
        );
        Ok(())
    }

    /// Current generations, newest first, without modifying anything.
    pub fn list(&self) -> Result<Vec<Generation>> {
        self.discover()
    }

    fn moved(&self, from: &Generation, name: GenerationName) -> Generation {
        Generation {
            path: self.path_for(&name),
            name,
            kind: from.kind,
        }
    }

    fn staging_path(&self, target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.root.join(format!("{STAGING_PREFIX}{name}"))
    }

    /// Clone into a hidden staging directory, then move it into place so a
    /// crash never leaves a half-built tree under a managed name.
    fn clone_generation(&self, from: &Path, to: &Path) -> Result<()> {
        ensure_vacant(to)?;
        let staging = self.staging_path(to);
        remove_entry(&staging)?;

        debug!(from = %from.display(), to = %to.display(), "hard-link cloning generation");
        if let Err(err) = hardlink_clone(from, &staging) {
            if let Err(cleanup) = remove_entry(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "failed to remove partial clone");
            }
            return Err(err);
        }
        fs::rename(&staging, to).at(&staging)
    }

    fn remove_stale_staging(&self) -> Result<()> {
        for entry in fs::read_dir(&self.root).at(&self.root)? {
            let entry = entry.at(&self.root)?;
            let is_staging = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(STAGING_PREFIX));
            if is_staging {
                warn!(path = %entry.path().display(), "removing partial clone from an interrupted rotation");
                remove_entry(&entry.path())?;
            }
        }
        Ok(())
    }
}

fn ensure_vacant(path: &Path) -> Result<()> {
    if entry_exists(path) {
        return Err(RotbackError::NamingConflict(path.to_path_buf()));
    }
    Ok(())
}

/// Rotate `store_root` with retention limit `keep` using the local wall clock.
pub fn rotate(keep: u32, store_root: impl AsRef<Path>) -> Result<Vec<Generation>> {
    let store = GenerationStore::open(store_root, keep)?;
    store.rotate(Local::now().naive_local(), None)
}
