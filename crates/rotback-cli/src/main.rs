mod cli;
mod cmd;
mod config_gen;
mod dispatch;
mod format;
mod signal;
mod table;

use std::path::PathBuf;

use clap::Parser;

use rotback_core::config;
use rotback_core::platform::paths::default_lock_dir;

use cli::{Cli, Commands};
use config_gen::run_config_generate;
use dispatch::{dispatch_command, dispatch_standalone, is_standalone};

/// Lock directory for standalone commands. A config file, when one is found,
/// supplies it so standalone passes and jobs contend for the same markers.
fn standalone_lock_dir(cli_config: Option<&str>) -> PathBuf {
    let Some(source) = config::resolve_config_path(cli_config) else {
        return default_lock_dir();
    };
    match config::load_config(source.path()) {
        Ok(cfg) => cfg.lock_dir(),
        Err(e) => {
            tracing::warn!("ignoring config {source} for the lock directory: {e}");
            default_lock_dir()
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // `config` needs no config file
    if let Some(Commands::Config { dest }) = &cli.command {
        if let Err(e) = run_config_generate(dest.as_deref()) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    signal::install_signal_handlers();

    if let Some(command) = cli.command.as_ref().filter(|c| is_standalone(c)) {
        let lock_dir = standalone_lock_dir(cli.config.as_deref());
        if let Err(e) = dispatch_standalone(command, &lock_dir) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    // Resolve config file
    let source = match config::resolve_config_path(cli.config.as_deref()) {
        Some(s) => s,
        None => {
            eprintln!("Error: no configuration file found.");
            eprintln!("Searched:");
            for (path, level) in config::default_config_search_paths() {
                eprintln!("  {} ({})", path.display(), level);
            }
            eprintln!();
            eprintln!("Run `rotback config` to generate a starter config file.");
            std::process::exit(1);
        }
    };

    tracing::info!("Using config: {source}");

    let cfg = match config::load_config(source.path()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let default_command = Commands::Run { job: None };
    let command = cli.command.as_ref().unwrap_or(&default_command);

    match dispatch_command(command, &cfg) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
