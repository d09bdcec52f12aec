use anyhow::Result;
use colored::Colorize;

use linkpull_core::Registry;

pub fn cmd_list(registry: &Registry) -> Result<()> {
    println!("\nKnown endpoints ({}):", registry.len());

    for (category, specs) in registry.categories() {
        println!("\n{}", category.bold());
        println!("{:<32} {:<52} {}", "Name", "Path", "Description");
        println!("{:-<110}", "");
        for spec in specs {
            let path = format!("{:<52}", spec.path);
            let path = if spec.is_parameterized() {
                path.yellow().to_string()
            } else {
                path
            };
            println!("{:<32} {} {}", spec.name, path, spec.description);
        }
    }

    let (plain, parameterized) = registry.partition();
    println!(
        "\n{} without parameters (run with `linkpull extract --all`), {} need --param",
        plain.len(),
        parameterized.len()
    );
    Ok(())
}
