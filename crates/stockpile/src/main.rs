//! Stockpile - a versioned inventory.
//!
//! This is the main entry point for the stockpile CLI.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::*;
use std::path::PathBuf;
use stockpile_snapshot::{Config, Inventory};
use stockpile_storage::FileStore;
use stockpile_util::{LogConfig, LogLevel};

#[derive(Parser)]
#[command(name = "stockpile")]
#[command(author, version, about = "Versioned inventory with content-addressed history", long_about = None)]
struct Cli {
    /// Directory of the store (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Extra config file, merged over the global one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Also append logs to the log file in the data directory
    #[arg(long, global = true)]
    log_to_file: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current inventory
    Show {
        /// Print items as JSON
        #[arg(long)]
        json: bool,
        /// Only show items with this tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Add or update an item
    Set {
        /// Item name
        name: String,
        /// Quantity (non-integers and negatives become 1)
        #[arg(short, long, allow_negative_numbers = true)]
        quantity: Option<f64>,
        /// Tag, repeatable or comma-separated
        #[arg(short, long = "tag", value_delimiter = ',')]
        tags: Vec<String>,
        /// Rename this item to NAME
        #[arg(long)]
        rename_from: Option<String>,
    },
    /// Remove an item
    Rm {
        /// Item name
        name: String,
    },
    /// Replace all items with the contents of a JSON file
    Import {
        /// Input file, or `-` for stdin
        input: String,
    },
    /// Print all items as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the ancestry of the current version
    History,
    /// List every stored version
    Versions,
    /// Make an earlier version's items current again
    Restore {
        /// Version digest or unique prefix
        hash: String,
    },
    /// Check the integrity of the store
    Verify,
    /// Print the inventory whenever another process changes it
    Watch,
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level {s:?}"))
}

/// Build the logging config from flags and the loaded config.
fn log_config(cli: &Cli, config: &Config) -> LogConfig {
    let level = match cli.log_level {
        Some(level) => level,
        None if cli.verbose => LogLevel::Debug,
        None => config.log_level.unwrap_or(LogLevel::Warn),
    };
    LogConfig {
        print: true,
        level,
        include_location: cli.verbose,
        file: if cli.log_to_file {
            stockpile_util::log::default_log_path()
        } else {
            None
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) =
        Config::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }

    if let Err(e) = stockpile_util::log::init(log_config(&cli, &config)) {
        eprintln!("Warning: Could not initialize logging: {e}");
    }
    tracing::debug!(sources = ?sources, "Config sources");

    let store_dir = config
        .store_dir()
        .context("Could not determine a data directory; pass --data-dir")?;
    tracing::debug!(path = %store_dir.display(), "Opening store");
    let store = FileStore::new(&store_dir);
    let inventory = Inventory::from_config(store.clone(), &config);

    match cli.command {
        Commands::Show { json, tag } => show(&inventory, json, tag.as_deref()),
        Commands::Set {
            name,
            quantity,
            tags,
            rename_from,
        } => set_item(&inventory, &name, quantity, tags, rename_from.as_deref()),
        Commands::Rm { name } => remove_item(&inventory, &name),
        Commands::Import { input } => handle_import(&inventory, &input),
        Commands::Export { output } => handle_export(&inventory, output.as_deref()),
        Commands::History => show_history(&inventory),
        Commands::Versions => list_versions(&inventory),
        Commands::Restore { hash } => restore(&inventory, &hash),
        Commands::Verify => verify(&inventory),
        Commands::Watch => watch(&inventory, &store).await,
    }
}
