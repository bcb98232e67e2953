//! Effective configuration command handler.

use anyhow::{Context, Result};

use convostate::StateConfig;

/// Print the merged file + environment configuration.
pub(crate) fn cmd_config(config: &StateConfig) -> Result<()> {
    let json =
        serde_json::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    println!("{}", json);
    println!();
    println!("Config path: {}", StateConfig::default_path().display());
    Ok(())
}
