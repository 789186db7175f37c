//! Import and export command handlers.

use super::{print_commit, FileInventory};
use anyhow::Context;
use std::io::Read;
use std::path::Path;

/// Handle the import command. `-` reads from stdin.
pub fn handle_import(inventory: &FileInventory, input: &str) -> anyhow::Result<()> {
    let text = if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        text
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))?
    };

    let commit = inventory.import_json(&text)?;
    print_commit(
        &format!("Imported {} items", commit.snapshot.items().len()),
        &commit,
    );
    Ok(())
}

/// Handle the export command.
pub fn handle_export(inventory: &FileInventory, output: Option<&Path>) -> anyhow::Result<()> {
    let json = inventory.export_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
