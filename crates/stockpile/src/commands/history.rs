//! Version history command handlers.
//!
//! Handles browsing, restoring and verifying versions.

use super::{print_commit, report_outcome, FileInventory};
use anyhow::Context;
use stockpile_snapshot::{VersionEntry, VersionHash};

fn print_entries(entries: &[VersionEntry], current: &VersionHash) {
    println!("  {:<12} {:<23} {:>5}  {:<12}", "VERSION", "TIMESTAMP", "ITEMS", "PARENT");
    println!("{}", "-".repeat(60));
    for entry in entries {
        let marker = if &entry.hash == current { '*' } else { ' ' };
        let parent = entry
            .snapshot
            .previous_version()
            .map(VersionHash::short)
            .unwrap_or("-");
        println!(
            "{marker} {:<12} {:<23} {:>5}  {:<12}",
            entry.hash.short(),
            entry.snapshot.timestamp().format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.snapshot.items().len(),
            parent
        );
    }
}

/// Handle the history command.
pub fn show_history(inventory: &FileInventory) -> anyhow::Result<()> {
    let chain = inventory.history().context("Failed to read history")?;
    if let Some(head) = chain.first() {
        print_entries(&chain, &head.hash);
    }
    Ok(())
}

/// Handle the versions command.
pub fn list_versions(inventory: &FileInventory) -> anyhow::Result<()> {
    let resolved = inventory.resolve_current()?;
    report_outcome(&resolved);
    let entries = inventory.list_all_versions()?;
    println!("{} versions", entries.len());
    print_entries(&entries, &resolved.hash);
    Ok(())
}

/// Find the stored version named by a full digest or a unique prefix.
pub fn find_version(inventory: &FileInventory, prefix: &str) -> anyhow::Result<VersionHash> {
    let prefix = prefix.trim().to_ascii_lowercase();
    if prefix.is_empty() {
        anyhow::bail!("Version must not be empty");
    }

    let mut matches: Vec<VersionHash> = inventory
        .versions()
        .version_hashes()?
        .into_iter()
        .filter(|h| h.as_str().starts_with(&prefix))
        .collect();

    match matches.len() {
        0 => anyhow::bail!("Version not found: {prefix}"),
        1 => Ok(matches.remove(0)),
        n => anyhow::bail!("Version prefix {prefix} is ambiguous ({n} matches)"),
    }
}

/// Handle the restore command.
pub fn restore(inventory: &FileInventory, hash: &str) -> anyhow::Result<()> {
    let target = find_version(inventory, hash)?;
    let commit = inventory
        .restore_to(&target)
        .with_context(|| format!("Failed to restore {}", target.short()))?;
    print_commit(&format!("Restored {}", target.short()), &commit);
    Ok(())
}

/// Handle the verify command. Fails if any problem was found.
pub fn verify(inventory: &FileInventory) -> anyhow::Result<()> {
    let report = inventory.verify()?;
    println!("Checked {} versions", report.checked);

    for mismatch in &report.hash_mismatches {
        println!(
            "hash mismatch: stored as {} but hashes to {}",
            mismatch.stored, mismatch.computed
        );
    }
    for (key, reason) in &report.malformed {
        println!("unreadable: {key}: {reason}");
    }
    for dangling in &report.dangling_parents {
        println!(
            "missing parent: {} -> {}",
            dangling.child.short(),
            dangling.parent
        );
    }
    match (&report.current, report.current_valid) {
        (Some(hash), true) => println!("current: {}", hash.short()),
        (Some(hash), false) => println!("current: {hash} does not name a readable version"),
        (None, _) => println!("current: not set"),
    }

    if report.is_clean() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Store has integrity problems")
    }
}
