//! Generic configuration parsing utilities.
//!
//! Reads a TOML file and deserializes it into any `DeserializeOwned` type,
//! attaching the file path to every error so a broken config is easy to find:
//!
//! ```text
//! Failed to parse config file: /home/me/.cbscan/config.toml
//! Caused by:
//!     invalid type: string "ten", expected u64
//! ```

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a TOML configuration file into the specified type.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its content does not match
/// the shape of `T`.
pub fn parse_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: T = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}
