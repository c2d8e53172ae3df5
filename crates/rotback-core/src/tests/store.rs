use std::fs;
use std::sync::atomic::AtomicBool;

use crate::error::RotbackError;
use crate::naming::STAGING_PREFIX;
use crate::platform::fs::{hardlink_clone, remove_entry};
use crate::store::{GenerationKind, GenerationStore, Step};
use crate::testutil::{entry_names, mk_dir_generation, mk_file_generation, ts};

const T2: &str = "20260101000000";
const T1: &str = "20260102000000";
const T0: &str = "20260103000000";
const NOW: &str = "20260104000000";

fn three_generations(root: &std::path::Path) {
    mk_dir_generation(root, 3, 0, T0, "nightly");
    mk_dir_generation(root, 3, 1, T1, "nightly");
    mk_dir_generation(root, 3, 2, T2, "nightly");
}

fn rotated_names() -> Vec<String> {
    vec![
        format!("0.{NOW}.nightly"),
        format!("1.{T0}.nightly"),
        format!("2.{T1}.nightly"),
    ]
}

#[test]
fn rotate_shifts_clones_and_evicts() {
    let dir = tempfile::tempdir().unwrap();
    three_generations(dir.path());

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    let result = store.rotate(ts(NOW), None).unwrap();

    assert_eq!(entry_names(dir.path()), rotated_names());
    let indices: Vec<u32> = result.iter().map(|g| g.index()).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(result[0].timestamp(), ts(NOW));
    assert_eq!(result[0].path, store.root().join(format!("0.{NOW}.nightly")));
    assert!(result.iter().all(|g| g.kind == GenerationKind::Directory));

    // The new head still holds the previous snapshot until the transfer runs.
    assert_eq!(fs::read_to_string(result[0].path.join("data.txt")).unwrap(), T0);
    assert_eq!(fs::read_to_string(result[2].path.join("data.txt")).unwrap(), T1);
}

#[test]
fn rotate_keeps_indices_contiguous_and_ordered_by_age() {
    let dir = tempfile::tempdir().unwrap();
    let store = GenerationStore::open(dir.path(), 5).unwrap();
    mk_dir_generation(dir.path(), 5, 0, "20260110000000", "n");

    let mut now = ts("20260110000000");
    for _ in 0..8 {
        now += chrono::Duration::days(1);
        let result = store.rotate(now, None).unwrap();

        for (i, generation) in result.iter().enumerate() {
            assert_eq!(generation.index() as usize, i);
            assert!(generation.index() < 5);
        }
        for pair in result.windows(2) {
            assert!(pair[0].timestamp() >= pair[1].timestamp());
        }
        assert_eq!(store.list().unwrap(), result);
    }
    assert_eq!(store.list().unwrap().len(), 5);
}

#[test]
fn eviction_removes_oldest_at_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    three_generations(dir.path());

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    store.rotate(ts(NOW), None).unwrap();

    let names = entry_names(dir.path());
    assert!(!names.iter().any(|n| n.contains(T2)), "oldest survived: {names:?}");
    assert!(store.list().unwrap().iter().all(|g| g.index() < 3));
}

#[test]
fn entries_beyond_limit_are_deleted() {
    let dir = tempfile::tempdir().unwrap();
    mk_dir_generation(dir.path(), 3, 0, T0, "nightly");
    mk_dir_generation(dir.path(), 3, 1, T1, "nightly");
    mk_dir_generation(dir.path(), 3, 5, "20251201000000", "nightly");
    mk_dir_generation(dir.path(), 3, 9, "20251101000000", "nightly");

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    store.rotate(ts(NOW), None).unwrap();

    assert_eq!(entry_names(dir.path()), rotated_names());
}

#[test]
fn gaps_close_up_without_losing_generations() {
    let dir = tempfile::tempdir().unwrap();
    mk_dir_generation(dir.path(), 5, 0, T0, "nightly");
    mk_dir_generation(dir.path(), 5, 3, T1, "nightly");

    let store = GenerationStore::open(dir.path(), 5).unwrap();
    let plan = store.plan(&store.discover().unwrap(), ts(NOW)).unwrap();
    assert!(matches!(plan.steps[0], Step::Rename { .. }));
    store.rotate(ts(NOW), None).unwrap();

    assert_eq!(entry_names(dir.path()), rotated_names());
}

#[cfg(unix)]
#[test]
fn clone_is_independent_of_next_transfer() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempfile::tempdir().unwrap();
    let head = mk_dir_generation(dir.path(), 3, 0, T0, "nightly");
    fs::create_dir(head.join("etc")).unwrap();
    fs::write(head.join("etc/hosts"), "unchanged").unwrap();

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    let result = store.rotate(ts(NOW), None).unwrap();
    let (new_head, clone) = (&result[0].path, &result[1].path);

    let shared = fs::metadata(new_head.join("etc/hosts")).unwrap();
    assert_eq!(shared.ino(), fs::metadata(clone.join("etc/hosts")).unwrap().ino());
    assert_eq!(shared.nlink(), 2);

    // Simulate the transfer: write a temp file, then rename over the old one.
    let tmp = new_head.join(".data.txt.partial");
    fs::write(&tmp, "fresh").unwrap();
    fs::rename(&tmp, new_head.join("data.txt")).unwrap();

    assert_eq!(fs::read_to_string(new_head.join("data.txt")).unwrap(), "fresh");
    assert_eq!(fs::read_to_string(clone.join("data.txt")).unwrap(), T0);
    assert_eq!(fs::read_to_string(clone.join("etc/hosts")).unwrap(), "unchanged");
}

#[cfg(unix)]
#[test]
fn file_generations_are_shifted_never_cloned() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempfile::tempdir().unwrap();
    mk_file_generation(dir.path(), 3, 0, T0, "crm", "sql.gz");
    mk_file_generation(dir.path(), 3, 1, T1, "crm", "sql.gz");
    mk_file_generation(dir.path(), 3, 2, T2, "crm", "sql.gz");

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    let result = store.rotate(ts(NOW), None).unwrap();

    assert_eq!(
        entry_names(dir.path()),
        vec![format!("1.{T0}.crm.sql.gz"), format!("2.{T1}.crm.sql.gz")]
    );
    assert_eq!(result[0].index(), 1);
    assert!(result.iter().all(|g| g.kind == GenerationKind::File));
    assert_eq!(fs::metadata(&result[0].path).unwrap().nlink(), 1);

    // No index-0 entry: the caller writes the next dump at the conventional path.
    assert_eq!(
        store.zero_path(ts(NOW), "crm", Some("sql.gz")),
        store.root().join(format!("0.{NOW}.crm.sql.gz"))
    );
}

/// Run the first `done` steps of a pass by hand, then let `rotate` finish it.
fn resume_after(done: usize, with_partial_clone: bool) {
    let dir = tempfile::tempdir().unwrap();
    three_generations(dir.path());
    let store = GenerationStore::open(dir.path(), 3).unwrap();

    let plan = store.plan(&store.discover().unwrap(), ts(NOW)).unwrap();
    assert_eq!(plan.steps.len(), 4);
    for step in &plan.steps[..done] {
        match step {
            Step::Evict { path, .. } => remove_entry(path).unwrap(),
            Step::Rename { from, to } => fs::rename(from, to).unwrap(),
            Step::Clone { from, to } => {
                hardlink_clone(from, to).unwrap();
            }
        }
    }
    if with_partial_clone {
        let staging = dir.path().join(format!("{STAGING_PREFIX}1.{T0}.nightly"));
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("half"), "x").unwrap();
    }

    store.rotate(ts(NOW), None).unwrap();
    assert_eq!(
        entry_names(dir.path()),
        rotated_names(),
        "resume after {done} steps"
    );
}

#[test]
fn interrupted_pass_resumes_to_the_same_state() {
    for done in 0..4 {
        resume_after(done, false);
    }
}

#[test]
fn partial_clone_is_discarded_on_resume() {
    resume_after(2, true);
}

#[test]
fn empty_store_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("README"), "not a generation").unwrap();
    fs::create_dir(dir.path().join("lost+found")).unwrap();

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    let result = store.rotate(ts(NOW), None).unwrap();

    assert!(result.is_empty());
    assert_eq!(entry_names(dir.path()), vec!["README", "lost+found"]);
}

#[test]
fn duplicate_index_is_a_naming_conflict() {
    let dir = tempfile::tempdir().unwrap();
    mk_dir_generation(dir.path(), 3, 1, T1, "nightly");
    fs::create_dir(dir.path().join(format!("01.{T2}.nightly"))).unwrap();

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    let err = store.rotate(ts(NOW), None).unwrap_err();
    assert!(matches!(err, RotbackError::NamingConflict(_)), "got {err:?}");
    assert_eq!(entry_names(dir.path()).len(), 2);
}

#[test]
fn missing_store_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = GenerationStore::open(dir.path().join("missing"), 3).unwrap_err();
    assert!(matches!(err, RotbackError::StoreUnavailable(_)));

    let file = dir.path().join("plain");
    fs::write(&file, "").unwrap();
    let err = GenerationStore::open(&file, 3).unwrap_err();
    assert!(matches!(err, RotbackError::StoreUnavailable(_)));
}

#[test]
fn zero_keep_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = GenerationStore::open(dir.path(), 0).unwrap_err();
    assert!(matches!(err, RotbackError::Config(_)));
}

#[test]
fn keep_one_renews_directory_head_without_clone() {
    let dir = tempfile::tempdir().unwrap();
    mk_dir_generation(dir.path(), 1, 0, T0, "nightly");
    mk_dir_generation(dir.path(), 1, 1, T1, "nightly");

    let store = GenerationStore::open(dir.path(), 1).unwrap();
    let result = store.rotate(ts(NOW), None).unwrap();

    assert_eq!(entry_names(dir.path()), vec![format!("0.{NOW}.nightly")]);
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].index(), 0);
}

#[test]
fn keep_one_evicts_file_head() {
    let dir = tempfile::tempdir().unwrap();
    mk_file_generation(dir.path(), 1, 0, T0, "crm", "sql");

    let store = GenerationStore::open(dir.path(), 1).unwrap();
    let result = store.rotate(ts(NOW), None).unwrap();

    assert!(result.is_empty());
    assert!(entry_names(dir.path()).is_empty());
}

#[test]
fn shutdown_flag_stops_before_any_step() {
    let dir = tempfile::tempdir().unwrap();
    three_generations(dir.path());
    let before = entry_names(dir.path());

    let flag = AtomicBool::new(true);
    let store = GenerationStore::open(dir.path(), 3).unwrap();
    let err = store.rotate(ts(NOW), Some(&flag)).unwrap_err();

    assert!(matches!(err, RotbackError::Interrupted));
    assert_eq!(entry_names(dir.path()), before);
}

#[test]
fn changed_keep_rewrites_index_width() {
    let dir = tempfile::tempdir().unwrap();
    mk_dir_generation(dir.path(), 90, 0, T0, "nightly");
    mk_dir_generation(dir.path(), 90, 1, T1, "nightly");
    assert!(entry_names(dir.path())[0].starts_with("00."));

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    store.rotate(ts(NOW), None).unwrap();

    assert_eq!(entry_names(dir.path()), rotated_names());
}

#[test]
fn clock_behind_head_is_a_naming_conflict() {
    let dir = tempfile::tempdir().unwrap();
    mk_dir_generation(dir.path(), 3, 0, T0, "nightly");

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    let err = store.rotate(ts(T1), None).unwrap_err();

    assert!(matches!(err, RotbackError::NamingConflict(_)), "got {err:?}");
    assert_eq!(entry_names(dir.path()), vec![format!("0.{T0}.nightly")]);
}

#[test]
fn same_second_rotation_never_loses_a_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let head = mk_dir_generation(dir.path(), 3, 0, T2, "nightly");
    let store = GenerationStore::open(dir.path(), 3).unwrap();

    let sub_second = ts(T2) + chrono::Duration::milliseconds(400);
    let err = store.rotate(sub_second, None).unwrap_err();
    assert!(matches!(err, RotbackError::NamingConflict(_)), "got {err:?}");
    assert_eq!(entry_names(dir.path()), vec![format!("0.{T2}.nightly")]);

    // The next transfer lands in the untouched head; the following pass
    // must still preserve it as its own generation.
    fs::write(head.join("data.txt"), "night2").unwrap();
    let result = store.rotate(ts(T1), None).unwrap();

    assert_eq!(
        entry_names(dir.path()),
        vec![format!("0.{T1}.nightly"), format!("1.{T2}.nightly")]
    );
    assert_eq!(fs::read_to_string(result[1].path.join("data.txt")).unwrap(), "night2");

    // Transfers replace files by rename, leaving the clone's links alone.
    let partial = result[0].path.join(".data.txt.partial");
    fs::write(&partial, "night3").unwrap();
    fs::rename(&partial, result[0].path.join("data.txt")).unwrap();
    let result = store.rotate(ts(T0), None).unwrap();
    let contents: Vec<String> = result
        .iter()
        .map(|g| fs::read_to_string(g.path.join("data.txt")).unwrap())
        .collect();
    assert_eq!(contents, vec!["night3", "night3", "night2"]);
}

#[test]
fn resume_returns_generations_already_in_place() {
    let dir = tempfile::tempdir().unwrap();
    mk_dir_generation(dir.path(), 3, 0, T0, "nightly");
    mk_dir_generation(dir.path(), 3, 1, T0, "nightly");
    mk_dir_generation(dir.path(), 3, 2, T1, "nightly");

    let store = GenerationStore::open(dir.path(), 3).unwrap();
    let plan = store.plan(&store.discover().unwrap(), ts(NOW)).unwrap();
    assert_eq!(plan.steps.len(), 1, "only the head rename is left: {:?}", plan.steps);

    let result = store.rotate(ts(NOW), None).unwrap();
    let names: Vec<String> = result
        .iter()
        .map(|g| g.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, rotated_names());
}

#[test]
fn failed_rename_stops_the_pass_with_its_path() {
    let dir = tempfile::tempdir().unwrap();
    // Written at one-digit width; keep 10 re-pads to two digits, which
    // pushes this name one byte past the usual 255-byte limit.
    let long_label = "x".repeat(255 - format!("1.{T1}.").len());
    mk_dir_generation(dir.path(), 9, 0, T0, "nightly");
    let long = mk_dir_generation(dir.path(), 9, 1, T1, &long_label);
    mk_dir_generation(dir.path(), 9, 12, T2, "nightly");

    let store = GenerationStore::open(dir.path(), 10).unwrap();
    let err = store.rotate(ts(NOW), None).unwrap_err();

    match err {
        RotbackError::Io { path, .. } => {
            assert_eq!(path, store.root().join(long.file_name().unwrap()))
        }
        other => panic!("expected Io, got {other:?}"),
    }
    // The eviction before the failure stays done; nothing after it ran.
    assert_eq!(
        entry_names(dir.path()),
        vec![format!("0.{T0}.nightly"), format!("1.{T1}.{long_label}")]
    );
}

#[test]
fn plan_orders_steps_for_a_contiguous_store() {
    let dir = tempfile::tempdir().unwrap();
    three_generations(dir.path());
    let store = GenerationStore::open(dir.path(), 3).unwrap();

    let plan = store.plan(&store.discover().unwrap(), ts(NOW)).unwrap();
    let kinds: Vec<&str> = plan
        .steps
        .iter()
        .map(|s| match s {
            Step::Evict { .. } => "evict",
            Step::Rename { .. } => "rename",
            Step::Clone { .. } => "clone",
        })
        .collect();
    assert_eq!(kinds, vec!["evict", "rename", "clone", "rename"]);
    assert_eq!(plan.target().unwrap().timestamp(), ts(NOW));
    assert_eq!(entry_names(dir.path()).len(), 3, "planning must not mutate");
}
