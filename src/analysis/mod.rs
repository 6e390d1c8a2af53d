//! Cookbook-set analysis.
//!
//! [`collect_cookbooks`] walks cookbook directories and parses every recipe,
//! provider, attribute and metadata file into a [`FileAnalysis`].
//! [`StructuralAnalysis::build`] aggregates those into the merged attribute
//! tree and the iterable-collections index the tree builder expands loops
//! against.

pub mod aggregate;
pub mod collector;

pub use aggregate::{AnalysisSummary, IterableCollection, StructuralAnalysis};
pub use collector::{FileAnalysis, FileKind, collect_cookbook, collect_cookbooks, is_cookbook_root};
