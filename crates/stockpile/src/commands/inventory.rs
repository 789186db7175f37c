//! Item command handlers.
//!
//! Handles showing, setting and removing items.

use super::{print_commit, report_outcome, FileInventory};
use anyhow::Context;
use stockpile_snapshot::{ItemDraft, Items};

/// Handle the show command. With `tag`, only items carrying it are shown.
pub fn show(inventory: &FileInventory, json: bool, tag: Option<&str>) -> anyhow::Result<()> {
    let resolved = inventory
        .resolve_current()
        .context("Failed to read the current inventory")?;
    report_outcome(&resolved);

    let items = filter_by_tag(resolved.snapshot.items(), tag);
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!(
        "Version {} ({})",
        resolved.hash.short(),
        resolved.snapshot.timestamp().format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    print_items(&items);
    Ok(())
}

fn filter_by_tag(items: &Items, tag: Option<&str>) -> Items {
    items
        .iter()
        .filter(|(_, item)| match tag {
            Some(tag) => item.has_tag(tag),
            None => true,
        })
        .map(|(name, item)| (name.clone(), item.clone()))
        .collect()
}

/// Print items as a table.
pub fn print_items(items: &Items) {
    if items.is_empty() {
        println!("No items.");
        return;
    }

    let width = items.keys().map(|n| n.chars().count()).max().unwrap_or(4).max(4);
    println!("{:<width$}  {:>10}  TAGS", "NAME", "QUANTITY");
    println!("{}", "-".repeat(width + 18));
    for (name, item) in items {
        println!("{:<width$}  {:>10}  {}", name, item.quantity, item.tags.join(", "));
    }
}

/// Handle the set command.
///
/// Without `--rename-from`, an existing item is updated in place. Unspecified
/// quantity and tags are taken from the item being edited.
pub fn set_item(
    inventory: &FileInventory,
    name: &str,
    quantity: Option<f64>,
    tags: Vec<String>,
    rename_from: Option<&str>,
) -> anyhow::Result<()> {
    let old_name = rename_from.unwrap_or(name);
    let tags = clean_tags(tags);

    let existing = inventory.current_items()?.remove(old_name);
    if rename_from.is_some() && existing.is_none() {
        anyhow::bail!("No item named {old_name:?}");
    }

    let mut draft = match existing {
        Some(item) => ItemDraft::from(item),
        None => ItemDraft::new(1.0, Vec::<String>::new()),
    };
    if let Some(quantity) = quantity {
        draft.quantity = quantity;
    }
    if !tags.is_empty() {
        draft.tags = tags;
    }

    let commit = inventory.upsert_item(Some(old_name), name, draft)?;
    print_commit("Saved", &commit);
    Ok(())
}

/// Handle the rm command.
pub fn remove_item(inventory: &FileInventory, name: &str) -> anyhow::Result<()> {
    let present = inventory.current_items()?.contains_key(name);
    let commit = inventory.delete_item(name)?;
    if !present {
        eprintln!("No item named {name:?}; nothing removed");
    }
    print_commit("Removed", &commit);
    Ok(())
}

/// Trim tags and drop empty ones.
fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
