//! Command handlers for the stockpile CLI.
//!
//! This module contains handlers for the various CLI subcommands,
//! split into logical groups.

pub mod history;
pub mod inventory;
pub mod transfer;
pub mod watch;

pub use history::*;
pub use inventory::*;
pub use transfer::*;
pub use watch::*;

use stockpile_snapshot::{Commit, Inventory, ResolveOutcome, Resolved};
use stockpile_storage::FileStore;

/// The inventory every command operates on.
pub type FileInventory = Inventory<FileStore>;

/// Tell the user when resolving had to touch the store.
fn report_outcome(resolved: &Resolved) {
    match &resolved.outcome {
        ResolveOutcome::Current => {}
        ResolveOutcome::Seeded => {
            eprintln!("Started a new inventory ({})", resolved.hash.short());
        }
        ResolveOutcome::Repaired { dangling: Some(old) } => {
            eprintln!(
                "Current version {} was unusable; switched to {}",
                old.short(),
                resolved.hash.short()
            );
        }
        ResolveOutcome::Repaired { dangling: None } => {
            eprintln!("No current version was set; switched to {}", resolved.hash.short());
        }
    }
}

fn print_commit(action: &str, commit: &Commit) {
    println!(
        "{action}: {} (from {})",
        commit.hash.short(),
        commit.parent.short()
    );
}
