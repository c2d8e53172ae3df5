use std::path::Path;

use chrono::Local;
use rotback_core::lock::with_store_lock;
use rotback_core::retention::AgeRetentionPolicy;

use crate::format::count_noun;

pub(crate) fn run_sweep(
    keep_days: u32,
    store: &str,
    lock_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = Path::new(store);
    let now = Local::now().naive_local();
    let policy = AgeRetentionPolicy::new(keep_days);

    let report = with_store_lock(lock_dir, root, |_| policy.sweep(root, now))?;

    println!(
        "Deleted {}, kept {}.",
        count_noun(report.deleted_count(), "expired entry", "expired entries"),
        report.retained
    );
    for failure in &report.failures {
        eprintln!("Warning: {failure}");
    }
    if !report.is_clean() {
        return Err(format!(
            "{} could not be deleted",
            count_noun(report.failures.len(), "entry", "entries")
        )
        .into());
    }
    Ok(())
}
