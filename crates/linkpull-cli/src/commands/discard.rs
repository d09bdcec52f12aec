use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;

use linkpull_core::CheckpointStore;

/// Delete a checkpoint. Returns whether one was removed.
pub fn cmd_discard<S: CheckpointStore>(store: &S, key: &str, yes: bool) -> Result<bool> {
    let Some(checkpoint) = store.load(key)? else {
        println!("{} No checkpoint named '{}'", "warning:".yellow(), key);
        return Ok(false);
    };

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Discard '{}' ({}/{} done, {} records)?",
                key,
                checkpoint.processed_count,
                checkpoint.total_count,
                checkpoint.snapshot.accumulated.len()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(false);
        }
    }

    store.delete(key)?;
    println!("{} checkpoint '{}'", "Discarded".green(), key);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpull_core::{Checkpoint, MemoryCheckpointStore, PaginationState};

    #[test]
    fn test_discard_with_yes() {
        let store = MemoryCheckpointStore::new();
        store
            .save("messages-c1", &Checkpoint::new(0, 1, PaginationState::default()))
            .unwrap();

        assert!(cmd_discard(&store, "messages-c1", true).unwrap());
        assert!(store.load("messages-c1").unwrap().is_none());
    }

    #[test]
    fn test_discard_missing_key() {
        let store = MemoryCheckpointStore::new();
        assert!(!cmd_discard(&store, "nothing", true).unwrap());
        assert_eq!(store.deletes(), 0);
    }
}
