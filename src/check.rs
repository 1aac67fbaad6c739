use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::bulk::partition;
use crate::config::load_config;
use crate::run::{invalid_line, select};

/// CLI command: show which configured repositories a run would touch.
///
/// Nothing is executed; only the pre-scheduling checks run.
///
/// Example output:
/// ```text
/// ✔ web-app /src/web-app
/// ! api locked: release freeze
/// ```
///
/// # Errors
/// - Returns an error if `config.toml` cannot be loaded or parsed.
/// - Returns an error if a `--repo` pattern matches nothing.
pub fn cmd_check(config_path: Option<&Path>, repos: &[String]) -> Result<()> {
    let cfg = load_config(config_path)?;
    let targets = select(&cfg.targets()?, repos)?;
    let split = partition(&targets, &cfg.locks());

    for t in &split.valid {
        println!("{} {} {}", "✔".green(), t.name.bold(), t.path.display());
    }
    for i in &split.invalid {
        println!("{}", invalid_line(i));
    }
    println!(
        "{} valid, {} invalid",
        split.valid.len(),
        split.invalid.len()
    );
    Ok(())
}
