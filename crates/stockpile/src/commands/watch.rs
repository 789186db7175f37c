//! The watch command: follow changes made by other processes.

use super::{print_items, report_outcome, FileInventory};
use stockpile_snapshot::{ChangeKind, ChangeNotifier};
use stockpile_storage::FileStore;
use tokio::sync::mpsc;
use tracing::debug;

/// Print the inventory, then reprint it after every external change until Ctrl-C.
pub async fn watch(inventory: &FileInventory, store: &FileStore) -> anyhow::Result<()> {
    let notifier = ChangeNotifier::watching(store)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = notifier.subscribe(move |change| {
        let _ = tx.send(change.clone());
    });

    print_current(inventory)?;
    eprintln!("Watching {} (Ctrl-C to stop)", store.base_path().display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = rx.recv() => {
                let Some(change) = change else { break };
                debug!(key = %change.key, "Store changed");

                // A commit arrives as a version write then a pointer move; wait for the move.
                let mut moved = matches!(change.kind, ChangeKind::CurrentPointer);
                while let Ok(next) = rx.try_recv() {
                    moved |= matches!(next.kind, ChangeKind::CurrentPointer);
                }
                if moved {
                    println!();
                    print_current(inventory)?;
                }
            }
        }
    }

    Ok(())
}

fn print_current(inventory: &FileInventory) -> anyhow::Result<()> {
    let resolved = inventory.resolve_current()?;
    report_outcome(&resolved);
    println!(
        "Version {} ({})",
        resolved.hash.short(),
        resolved.snapshot.timestamp().format("%Y-%m-%d %H:%M:%S")
    );
    print_items(resolved.snapshot.items());
    Ok(())
}
