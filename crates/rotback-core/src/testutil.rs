use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::naming::{parse_timestamp, GenerationName};

pub fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

/// Directory generation holding `data.txt` with its timestamp as content.
pub fn mk_dir_generation(root: &Path, keep: u32, index: u32, stamp: &str, label: &str) -> PathBuf {
    let path = root.join(GenerationName::new(index, ts(stamp), label).render(keep));
    fs::create_dir(&path).unwrap();
    fs::write(path.join("data.txt"), stamp).unwrap();
    path
}

/// File generation such as a compressed database dump.
pub fn mk_file_generation(
    root: &Path,
    keep: u32,
    index: u32,
    stamp: &str,
    label: &str,
    extension: &str,
) -> PathBuf {
    let name = GenerationName::new(index, ts(stamp), label)
        .with_extension(Some(extension.to_string()));
    let path = root.join(name.render(keep));
    fs::write(&path, stamp).unwrap();
    path
}

/// Entry names of `root`, sorted.
pub fn entry_names(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
