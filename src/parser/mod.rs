//! Source file parsing.
//!
//! Ruby-syntax files go through the structural parser in [`ruby`], which
//! yields [`ParsedFileFact`]s plus the file's execution order. JSON and YAML
//! siblings go through [`structured`] and only yield their key set.
//!
//! - [`lexer`] - hand-written tokenizer for the DSL
//! - [`literal`] - static evaluation of literal right-hand sides
//! - [`facts`] - the fact and execution-item types

pub mod facts;
pub mod lexer;
pub mod literal;
pub mod ruby;
pub mod structured;

use anyhow::{Context, Result};
use std::path::Path;

pub use facts::{
    AttributeAssignment, ConditionalBlock, ConditionalKind, ExecutionItem, LoopConstruct,
    ParsedFile, ParsedFileFact, Precedence, RecipeReference, ReferenceKind, ResourceInvocation,
};
pub use structured::DataFormat;

use crate::config::AnalyzerConfig;
use crate::constants::DEFAULT_VALUE_DISPLAY_LIMIT;

/// Parser limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Characters of an attribute value kept in `display_value`
    pub value_display_limit: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            value_display_limit: DEFAULT_VALUE_DISPLAY_LIMIT,
        }
    }
}

impl ParseOptions {
    #[must_use]
    pub const fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            value_display_limit: config.analysis.value_display_limit,
        }
    }
}

/// Format of a source file, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Ruby,
    Data(DataFormat),
}

impl SourceFormat {
    /// `None` for files the analyzer does not read.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "rb" => Some(Self::Ruby),
            "json" => Some(Self::Data(DataFormat::Json)),
            "yml" | "yaml" => Some(Self::Data(DataFormat::Yaml)),
            _ => None,
        }
    }
}

/// Parse in-memory `source` as if it were read from `file`.
///
/// # Errors
///
/// Only structured-data files fail, when they are not valid JSON or YAML.
pub fn parse_source(source: &str, file: &Path, options: &ParseOptions) -> Result<ParsedFile> {
    match SourceFormat::from_path(file) {
        Some(SourceFormat::Ruby) | None => Ok(ruby::parse(source, file, options)),
        Some(SourceFormat::Data(format)) => structured::parse(source, file, format),
    }
}

/// Read and parse `path`.
///
/// Invalid UTF-8 is replaced rather than rejected; cookbooks in the wild
/// carry Latin-1 comments.
///
/// # Errors
///
/// Fails if the file cannot be read or is invalid structured data.
pub fn parse_file(path: &Path, options: &ParseOptions) -> Result<ParsedFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let source = String::from_utf8_lossy(&bytes);
    parse_source(&source, path, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dispatch_by_extension() {
        let options = ParseOptions::default();
        let rb = parse_source("package 'x'\n", Path::new("r.rb"), &options).unwrap();
        assert_eq!(rb.resources().count(), 1);

        let json = parse_source(r#"{"name": "web"}"#, Path::new("metadata.json"), &options)
            .unwrap();
        assert_eq!(json.keys, vec!["name"]);
        assert!(json.facts.is_empty());
    }

    #[test]
    fn test_parse_file_lossy_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("default.rb");
        std::fs::write(&path, b"# caf\xe9\npackage 'x'\n").unwrap();
        let parsed = parse_file(&path, &ParseOptions::default()).unwrap();
        assert_eq!(parsed.resources().next().map(|r| r.line), Some(2));
        assert_eq!(parsed.facts[0].file(), &path);
    }

    #[test]
    fn test_parse_file_missing() {
        let err = parse_file(Path::new("/nonexistent/x.rb"), &ParseOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
