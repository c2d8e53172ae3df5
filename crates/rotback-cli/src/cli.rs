use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rotback",
    version,
    about = "Rotating hard-link snapshot backups",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $ROTBACK_CONFIG             (environment variable)
  3. ./rotback.yaml              (project)
  4. Platform user config dir + /rotback/config.yaml (e.g. ~/.config)
  5. /etc/rotback/config.yaml    (system)

Environment variables:
  ROTBACK_CONFIG    Path to configuration file (overrides default search)
  ROTBACK_LOCK_DIR  Lock directory when the config does not set lock_dir"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides ROTBACK_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Rotate a generation store and print the resulting paths, newest first
    Rotate {
        /// Number of generations to keep
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        keep: u32,

        /// Store directory
        #[arg(short, long)]
        store: String,

        /// Label used for the new index-0 path when rotation does not produce one
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Delete dated entries older than the given number of days
    Sweep {
        /// Days to keep
        #[arg(short = 'd', long)]
        keep_days: u32,

        /// Store directory
        #[arg(short, long)]
        store: String,
    },

    /// Run configured jobs (default when no subcommand is given)
    Run {
        /// Only run the job with this name
        #[arg(short, long)]
        job: Option<String>,
    },

    /// Show the contents of configured stores
    List {
        /// Only list the job with this name
        #[arg(short, long)]
        job: Option<String>,
    },

    /// Remove lock markers left behind by killed runs
    BreakLock,

    /// Generate a minimal configuration file
    Config {
        /// Destination path (prompts for a location when omitted)
        #[arg(short, long)]
        dest: Option<String>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Rotate { .. } => "rotate",
            Commands::Sweep { .. } => "sweep",
            Commands::Run { .. } => "run",
            Commands::List { .. } => "list",
            Commands::BreakLock => "break-lock",
            Commands::Config { .. } => "config",
        }
    }
}
