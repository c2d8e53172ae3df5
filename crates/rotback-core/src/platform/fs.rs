use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{IoResultExt, Result, RotbackError};

/// Counts reported by [`hardlink_clone`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CloneStats {
    pub directories: u64,
    pub files: u64,
    pub symlinks: u64,
    pub skipped: u64,
}

/// Recreate the tree at `src` under the new path `dst`, hard-linking every
/// regular file so the clone shares file data with the source.
///
/// Directories are recreated with the source's permissions and modification
/// time, symlinks are recreated verbatim, and special files (FIFOs, devices,
/// sockets) are skipped. `dst` must not exist. The source is never modified.
///
/// The operation is not atomic: on error `dst` may be left partially
/// populated, so callers clone into a staging path and rename it afterwards.
pub fn hardlink_clone(src: &Path, dst: &Path) -> Result<CloneStats> {
    let mut stats = CloneStats::default();
    let mut directories: Vec<(PathBuf, fs::Metadata)> = Vec::new();

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            RotbackError::io(path, e.into())
        })?;

        let target = match entry.path().strip_prefix(src) {
            Ok(rel) if rel.as_os_str().is_empty() => dst.to_path_buf(),
            Ok(rel) => dst.join(rel),
            Err(_) => continue,
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir(&target).at(&target)?;
            let metadata = entry.metadata().map_err(|e| {
                RotbackError::io(entry.path(), e.into())
            })?;
            directories.push((target, metadata));
            stats.directories += 1;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).at(entry.path())?;
            create_symlink(&link, &target).at(&target)?;
            stats.symlinks += 1;
        } else if file_type.is_file() {
            fs::hard_link(entry.path(), &target).at(&target)?;
            stats.files += 1;
        } else {
            warn!(path = %entry.path().display(), "skipping special file during clone");
            stats.skipped += 1;
        }
    }

    // Children before parents: a read-only parent must not block its contents,
    // and populating a directory would reset its mtime.
    for (dir, metadata) in directories.iter().rev() {
        fs::set_permissions(dir, metadata.permissions()).at(dir)?;
        if let Ok(modified) = metadata.modified() {
            let (secs, nanos) = split_system_time(modified);
            set_file_mtime(dir, secs, nanos).at(dir)?;
        }
    }

    debug!(
        src = %src.display(),
        dst = %dst.display(),
        files = stats.files,
        directories = stats.directories,
        "hard-link clone complete"
    );
    Ok(stats)
}

/// Remove a file, symlink or directory tree. A missing path is not an error.
///
/// Read-only directories inside the tree are made writable and the removal
/// retried once, matching `rm -rf` as the backup owner.
pub fn remove_entry(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(RotbackError::io(path, e)),
    };

    if !metadata.is_dir() {
        return fs::remove_file(path).at(path);
    }

    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            debug!(path = %path.display(), "retrying removal after making tree writable");
            make_tree_writable(path);
            fs::remove_dir_all(path).at(path)
        }
        Err(e) => Err(RotbackError::io(path, e)),
    }
}

/// True if anything (including a dangling symlink) exists at `path`.
pub fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn make_tree_writable(root: &Path) {
    for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            let mut perms = metadata.permissions();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                perms.set_mode(perms.mode() | 0o700);
            }
            #[cfg(not(unix))]
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            let _ = fs::set_permissions(entry.path(), perms);
        }
    }
}

fn split_system_time(t: SystemTime) -> (i64, u32) {
    match t.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => {
            let d = e.duration();
            if d.subsec_nanos() == 0 {
                (-(d.as_secs() as i64), 0)
            } else {
                (-(d.as_secs() as i64) - 1, 1_000_000_000 - d.subsec_nanos())
            }
        }
    }
}

pub fn create_symlink(link_target: &Path, target: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(link_target, target)
    }

    #[cfg(windows)]
    {
        let file_err = match std::os::windows::fs::symlink_file(link_target, target) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        std::os::windows::fs::symlink_dir(link_target, target).map_err(|dir_err| {
            std::io::Error::new(
                dir_err.kind(),
                format!(
                    "failed to create symlink as file ({file_err}) and directory ({dir_err})"
                ),
            )
        })
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (link_target, target);
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlink creation is not supported on this platform",
        ))
    }
}

/// Set the modification time of a file or directory, leaving atime untouched.
pub fn set_file_mtime(path: &Path, secs: i64, nanos: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains null")
        })?;
        let times = [
            libc::timespec {
                tv_sec: 0,
                tv_nsec: libc::UTIME_OMIT,
            },
            libc::timespec {
                tv_sec: secs as _,
                tv_nsec: nanos as _,
            },
        ];
        if unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) } == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (path, secs, nanos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_file_mtime_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let target_secs: i64 = 1_700_000_000;
        set_file_mtime(&sub, target_secs, 0).unwrap();

        let mtime = fs::metadata(&sub).unwrap().modified().unwrap();
        let since_epoch = mtime.duration_since(SystemTime::UNIX_EPOCH).unwrap();
        let diff = (since_epoch.as_secs() as i64 - target_secs).unsigned_abs();
        assert!(diff <= 1, "mtime off by {diff} seconds");
    }

    #[test]
    fn split_pre_epoch_time() {
        let t = SystemTime::UNIX_EPOCH - std::time::Duration::from_millis(1500);
        assert_eq!(split_system_time(t), (-2, 500_000_000));
        let t = SystemTime::UNIX_EPOCH - std::time::Duration::from_secs(3);
        assert_eq!(split_system_time(t), (-3, 0));
    }

    #[test]
    fn remove_entry_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_entry(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn remove_entry_handles_files_and_trees() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        remove_entry(&file).unwrap();
        assert!(!file.exists());

        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("a/b")).unwrap();
        fs::write(tree.join("a/b/c"), b"x").unwrap();
        remove_entry(&tree).unwrap();
        assert!(!tree.exists());
    }
}
