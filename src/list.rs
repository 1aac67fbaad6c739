use crate::config::load_config;
use anyhow::Result;
use std::path::Path;

/// CLI command: print configured repositories in file order.
///
/// Example output:
/// ```text
/// - web-app [web] ~/src/web-app
/// - api [api] repos/api (locked: release freeze)
/// ```
///
/// # Errors
/// - Returns an error if `config.toml` cannot be loaded or parsed.
pub fn cmd_list(config_path: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;
    for r in &cfg.repositories {
        let lock = r
            .locked
            .as_deref()
            .map(|reason| format!(" (locked: {})", reason))
            .unwrap_or_default();
        println!("- {} [{}] {}{}", r.display_name(), r.id(), r.path, lock);
    }
    Ok(())
}
