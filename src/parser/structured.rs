//! Key extraction for JSON and YAML siblings of DSL files.
//!
//! Only the key set matters here: every mapping key becomes a dotted path
//! (`nginx.sites.a`). Keys of mappings nested in sequences share the
//! sequence's path.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use super::facts::ParsedFile;

/// Data format of a structured file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Yaml,
}

/// Parse `source` and collect its dotted key paths.
pub fn parse(source: &str, file: &Path, format: DataFormat) -> Result<ParsedFile> {
    if source.trim().is_empty() {
        return Ok(ParsedFile::default());
    }
    let value: Value = match format {
        DataFormat::Json => serde_json::from_str(source)
            .with_context(|| format!("Failed to parse JSON file: {}", file.display()))?,
        DataFormat::Yaml => serde_yaml::from_str(source)
            .with_context(|| format!("Failed to parse YAML file: {}", file.display()))?,
    };
    Ok(ParsedFile {
        keys: key_paths(&value),
        ..ParsedFile::default()
    })
}

/// Dotted paths of every mapping key, in document order, without duplicates.
#[must_use]
pub fn key_paths(value: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<(Option<String>, &Value)> = vec![(None, value)];

    while let Some((prefix, value)) = stack.pop() {
        if let Some(path) = &prefix
            && seen.insert(path.clone())
        {
            keys.push(path.clone());
        }
        match value {
            Value::Object(map) => {
                // reversed so the stack pops in document order
                for (key, child) in map.iter().rev() {
                    let path = match &prefix {
                        Some(prefix) => format!("{prefix}.{key}"),
                        None => key.clone(),
                    };
                    stack.push((Some(path), child));
                }
            }
            Value::Array(items) => {
                for item in items.iter().rev() {
                    stack.push((prefix.clone(), item));
                }
            }
            _ => {}
        }
    }
    keys
}
