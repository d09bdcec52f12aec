use colored::Colorize;

use linkpull_core::{ErrorHistogram, ResourceFailure};

/// Print the per-kind failure counts and the failed resources.
pub fn print_failures(failures: &[ResourceFailure], histogram: &ErrorHistogram) {
    if histogram.is_empty() {
        println!("{}", "No failures.".green());
        return;
    }

    println!("\n{}", "Failures by kind:".red().bold());
    println!("{:<22} {:>6}  {}", "Kind", "Count", "Meaning");
    println!("{:-<70}", "");
    for (kind, count) in histogram.iter() {
        let retry = if kind.is_retryable() { "(retry later)" } else { "" };
        println!(
            "{:<22} {:>6}  {} {}",
            kind.as_str(),
            count,
            kind.description(),
            retry.dimmed()
        );
    }

    println!("\n{:<30} {:<22} {}", "Resource", "Kind", "Message");
    println!("{:-<90}", "");
    for failure in failures {
        println!(
            "{:<30} {:<22} {}",
            truncate(&failure.resource, 30),
            failure.kind.as_str(),
            truncate(&failure.message, 80)
        );
    }
    println!("\nTotal: {} incomplete", histogram.total());
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
