use anyhow::Result;

use linkpull_core::CheckpointStore;

use crate::summary::truncate;

/// One line of the status table per saved checkpoint.
pub fn status_lines<S: CheckpointStore>(store: &S) -> Result<Vec<String>> {
    let checkpoints = store.list()?;
    Ok(checkpoints
        .into_iter()
        .map(|(key, checkpoint)| {
            format!(
                "{:<40} {:>10} {:>10} {:>10} {:<20}",
                truncate(&key, 40),
                format!("{}/{}", checkpoint.processed_count, checkpoint.total_count),
                checkpoint.snapshot.accumulated.len(),
                checkpoint.failures.len(),
                checkpoint.timestamp.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect())
}

pub fn cmd_status<S: CheckpointStore>(store: &S) -> Result<()> {
    let lines = status_lines(store)?;

    if lines.is_empty() {
        println!("No checkpoints saved. Interrupted or truncated fetches leave one here.");
        return Ok(());
    }

    println!("\nCheckpoints:");
    println!(
        "{:<40} {:>10} {:>10} {:>10} {:<20}",
        "Key", "Progress", "Records", "Failures", "Saved (UTC)"
    );
    println!("{:-<94}", "");
    for line in lines {
        println!("{}", line);
    }
    println!("\nResume with --resume, or drop one with 'linkpull discard <key>'.");
    Ok(())
}
