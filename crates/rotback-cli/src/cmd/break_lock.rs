use std::path::Path;

pub(crate) fn run_break_lock(lock_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let removed = rotback_core::lock::break_lock(lock_dir)?;

    if removed == 0 {
        println!("No locks found.");
    } else {
        println!("Removed {removed} lock(s).");
    }
    Ok(())
}
