//! Read `metadata.rb` / `metadata.json` from a cookbook directory.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::LazyLock;

use crate::constants::{METADATA_JSON, METADATA_RB};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*name\s*\(?\s*['"]([^'"]+)['"]"#).expect("valid regex")
});
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*version\s*\(?\s*['"]([^'"]+)['"]"#).expect("valid regex")
});
static DEPENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*depends\s*\(?\s*['"]([^'"]+)['"](?:\s*,\s*['"]([^'"]+)['"])?"#)
        .expect("valid regex")
});

/// Identity and declared dependencies of a cookbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookbookMetadata {
    /// Declared cookbook name
    pub name: Option<String>,
    /// Declared version
    pub version: Option<String>,
    /// `depends` entries: (cookbook, optional constraint)
    pub depends: Vec<(String, Option<String>)>,
}

#[derive(Deserialize)]
struct JsonMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: serde_json::Map<String, JsonValue>,
}

/// Metadata reader for cookbook directories.
///
/// `metadata.rb` wins over `metadata.json` when both exist. The Ruby form is
/// read line by line: only literal `name`, `version` and `depends` calls are
/// understood, which covers what the resolver and strategies need.
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Read metadata from `dir`, or `None` when neither file exists.
    ///
    /// # Errors
    ///
    /// Fails if a metadata file exists but cannot be read, or if
    /// `metadata.json` is not valid JSON.
    pub fn from_dir(dir: &Path) -> Result<Option<CookbookMetadata>> {
        let rb = dir.join(METADATA_RB);
        if rb.is_file() {
            let content = std::fs::read_to_string(&rb)
                .with_context(|| format!("Failed to read {}", rb.display()))?;
            return Ok(Some(Self::from_ruby(&content)));
        }

        let json = dir.join(METADATA_JSON);
        if json.is_file() {
            let content = std::fs::read_to_string(&json)
                .with_context(|| format!("Failed to read {}", json.display()))?;
            return Self::from_json(&content)
                .with_context(|| format!("Invalid cookbook metadata in {}", json.display()))
                .map(Some);
        }

        Ok(None)
    }

    /// Declared cookbook name in `dir`, ignoring unreadable metadata.
    #[must_use]
    pub fn cookbook_name(dir: &Path) -> Option<String> {
        match Self::from_dir(dir) {
            Ok(metadata) => metadata.and_then(|m| m.name),
            Err(e) => {
                tracing::debug!("Ignoring metadata in {}: {:#}", dir.display(), e);
                None
            }
        }
    }

    /// Parse the Ruby metadata DSL.
    #[must_use]
    pub fn from_ruby(content: &str) -> CookbookMetadata {
        let mut metadata = CookbookMetadata::default();
        for line in content.lines() {
            if line.trim_start().starts_with('#') {
                continue;
            }
            if metadata.name.is_none()
                && let Some(caps) = NAME_RE.captures(line)
            {
                metadata.name = Some(caps[1].to_string());
            } else if metadata.version.is_none()
                && let Some(caps) = VERSION_RE.captures(line)
            {
                metadata.version = Some(caps[1].to_string());
            } else if let Some(caps) = DEPENDS_RE.captures(line) {
                metadata
                    .depends
                    .push((caps[1].to_string(), caps.get(2).map(|m| m.as_str().to_string())));
            }
        }
        metadata
    }

    /// Parse `metadata.json`.
    ///
    /// # Errors
    ///
    /// Fails on invalid JSON.
    pub fn from_json(content: &str) -> Result<CookbookMetadata> {
        let raw: JsonMetadata = serde_json::from_str(content)?;
        Ok(CookbookMetadata {
            name: raw.name,
            version: raw.version,
            depends: raw
                .dependencies
                .into_iter()
                .map(|(name, constraint)| (name, constraint.as_str().map(str::to_string)))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ruby_metadata() {
        let content = r#"
# name 'commented'
name 'nginx'
maintainer 'Ops'
version '1.2.3'
depends 'apt'
depends "openssl", '~> 4.0'
"#;
        let metadata = MetadataExtractor::from_ruby(content);
        assert_eq!(metadata.name.as_deref(), Some("nginx"));
        assert_eq!(metadata.version.as_deref(), Some("1.2.3"));
        assert_eq!(
            metadata.depends,
            vec![
                ("apt".to_string(), None),
                ("openssl".to_string(), Some("~> 4.0".to_string()))
            ]
        );
    }

    #[test]
    fn test_json_metadata() {
        let metadata = MetadataExtractor::from_json(
            r#"{"name": "redis", "version": "3.0.0", "dependencies": {"sysctl": ">= 0.0.0"}}"#,
        )
        .unwrap();
        assert_eq!(metadata.name.as_deref(), Some("redis"));
        assert_eq!(metadata.depends, vec![("sysctl".to_string(), Some(">= 0.0.0".to_string()))]);
    }

    #[test]
    fn test_from_dir_prefers_ruby() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("metadata.rb"), "name 'from_rb'\n").unwrap();
        std::fs::write(temp.path().join("metadata.json"), r#"{"name": "from_json"}"#).unwrap();
        assert_eq!(MetadataExtractor::cookbook_name(temp.path()).as_deref(), Some("from_rb"));
    }

    #[test]
    fn test_from_dir_missing() {
        let temp = tempdir().unwrap();
        assert!(MetadataExtractor::from_dir(temp.path()).unwrap().is_none());
        assert!(MetadataExtractor::cookbook_name(temp.path()).is_none());
    }

    #[test]
    fn test_invalid_json_metadata() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("metadata.json"), "{").unwrap();
        assert!(MetadataExtractor::from_dir(temp.path()).is_err());
        assert!(MetadataExtractor::cookbook_name(temp.path()).is_none());
    }
}
