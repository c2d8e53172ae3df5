use std::path::Path;
use std::sync::atomic::AtomicBool;

use chrono::Local;
use rotback_core::lock::with_store_lock;
use rotback_core::naming::validate_label;
use rotback_core::store::GenerationStore;

/// Rotate one store and print every resulting path, newest first. With
/// `label`, a store without an index-0 entry gets the conventional write
/// target printed first.
pub(crate) fn run_rotate(
    keep: u32,
    store: &str,
    label: Option<&str>,
    lock_dir: &Path,
    shutdown: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(label) = label {
        validate_label(label)?;
    }
    let store = GenerationStore::open(store, keep)?;
    let now = Local::now().naive_local();

    let generations = with_store_lock(lock_dir, store.root(), |_| {
        store.rotate(now, Some(shutdown))
    })?;

    if let Some(label) = label {
        if generations.first().map_or(true, |g| g.index() != 0) {
            println!("{}", store.zero_path(now, label, None).display());
        }
    }
    for generation in &generations {
        println!("{}", generation.path.display());
    }
    Ok(())
}
