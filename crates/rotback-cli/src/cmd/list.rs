use comfy_table::Cell;

use rotback_core::config::{JobConfig, Policy};
use rotback_core::retention::list_dated;
use rotback_core::store::GenerationStore;

use crate::format::format_time;
use crate::table::CliTableTheme;

pub(crate) fn run_list(job: &JobConfig) -> Result<(), Box<dyn std::error::Error>> {
    let theme = CliTableTheme::detect();

    match job.policy {
        Policy::Generations => {
            let store = GenerationStore::open(job.store_path(), job.keep)?;
            let generations = store.list()?;
            if generations.is_empty() {
                println!("No generations found.");
                return Ok(());
            }
            let mut table = theme.new_data_table(&["Index", "Date", "Kind", "Path"]);
            for generation in &generations {
                table.add_row(vec![
                    Cell::new(generation.index()),
                    Cell::new(format_time(generation.timestamp())),
                    Cell::new(generation.kind),
                    Cell::new(generation.path.display()),
                ]);
            }
            println!("{table}");
        }
        Policy::Age => {
            let groups = list_dated(&job.store_path())?;
            if groups.is_empty() {
                println!("No dumps found.");
                return Ok(());
            }
            let mut table = theme.new_data_table(&["Date", "Label", "Path"]);
            for group in &groups {
                for entry in &group.entries {
                    table.add_row(vec![
                        Cell::new(format_time(group.timestamp)),
                        Cell::new(entry.name.label.as_deref().unwrap_or("-")),
                        Cell::new(entry.path.display()),
                    ]);
                }
            }
            println!("{table}");
        }
    }
    Ok(())
}
