use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use rotback_core::config::{JobConfig, RotbackConfig};
use rotback_core::driver::{run_job, JobReport};

use crate::format::count_noun;

/// Run each job in order. Returns `Ok(false)` if any job failed; a failed
/// job does not stop the next one.
pub(crate) fn run_jobs(
    config: &RotbackConfig,
    jobs: &[&JobConfig],
    shutdown: &AtomicBool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let multi = jobs.len() > 1;
    let mut all_ok = true;

    for job in jobs {
        if shutdown.load(Ordering::SeqCst) {
            eprintln!("Interrupted, skipping remaining jobs.");
            return Ok(false);
        }
        if multi {
            eprintln!("--- Job: {} ---", job.name);
        }

        let now = Local::now().naive_local();
        match run_job(config, job, now, Some(shutdown)) {
            Ok(report) => {
                print_report(&report);
                if !report.is_clean() {
                    all_ok = false;
                }
            }
            Err(e) => {
                eprintln!("Error: job '{}': {e}", job.name);
                all_ok = false;
            }
        }
    }
    Ok(all_ok)
}

fn print_report(report: &JobReport) {
    if let Some(target) = &report.target {
        println!("Snapshot written to: {}", target.display());
        println!(
            "Previous generations kept: {}",
            report.generations.iter().filter(|g| g.index() > 0).count()
        );
    }
    if let Some(sweep) = &report.sweep {
        println!(
            "Deleted {}.",
            count_noun(sweep.deleted_count(), "expired entry", "expired entries")
        );
        for failure in &sweep.failures {
            eprintln!("Warning: {failure}");
        }
    }
    if let Some(dumps) = &report.dumps {
        for path in &dumps.written {
            println!("Dump written to: {}", path.display());
        }
        for (label, error) in &dumps.failures {
            eprintln!("Error: dump '{label}': {error}");
        }
    }
}
