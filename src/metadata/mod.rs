//! Cookbook metadata extraction.
//!
//! Every cookbook directory declares its identity in `metadata.rb` (Ruby DSL)
//! or `metadata.json`. Strategies use it to name the cookbook under analysis;
//! the path resolver uses it to match directories whose name does not equal
//! the cookbook name.

pub mod extractor;

pub use extractor::{CookbookMetadata, MetadataExtractor};
