//! cbscan - static structure and execution-flow analysis for Chef cookbooks
//!
//! cbscan takes a cookbook directory and answers three questions without
//! running Chef:
//!
//! 1. **Where do the dependencies live?** A [`strategy`] detects whether the
//!    cookbook uses a `Policyfile.lock.json` or a `Berksfile`, optionally runs
//!    `chef export` / `berks vendor`, and maps every dependency to a directory.
//! 2. **What does each file contain?** The [`parser`] turns recipes,
//!    providers and attribute files into facts: resource invocations,
//!    attribute assignments, include references and loops.
//! 3. **What actually runs?** The [`tree`] builder follows `include_recipe`
//!    from an entry recipe, expands `.each` loops over attribute collections
//!    and stops at circular includes.
//!
//! # Architecture
//!
//! Data flows leaf first:
//!
//! ```text
//! lockfile -> strategy -> resolver -> parser -> analysis -> tree
//! ```
//!
//! - [`lockfile`] - lock document parsing and the dependency graph
//! - [`strategy`] - Policyfile and Berkshelf dependency resolution
//! - [`tools`] - the external-tool port and its process implementation
//! - [`resolver`] - stateless recipe / provider / attribute path lookup
//! - [`parser`] - Ruby DSL structural parser and JSON/YAML key extraction
//! - [`analysis`] - per-file analyses and the aggregate with iterable
//!   collections
//! - [`tree`] - execution tree building and rendering
//! - [`cli`] - the `cbscan` commands
//!
//! Supporting modules: [`config`], [`core`] (errors), [`constants`],
//! [`metadata`], [`utils`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cbscan_cli::analysis::{StructuralAnalysis, collect_cookbooks};
//! use cbscan_cli::parser::ParseOptions;
//! use cbscan_cli::tree::{TreeBuilder, render_tree};
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dirs = vec![PathBuf::from("cookbooks")];
//! let analysis = StructuralAnalysis::build(collect_cookbooks(&dirs, &ParseOptions::default()));
//! let tree = TreeBuilder::new(&analysis, dirs).build_for_recipe(&"web::default".parse()?)?;
//! println!("{}", render_tree(&tree));
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod lockfile;
pub mod metadata;
pub mod parser;
pub mod resolver;
pub mod strategy;
pub mod tools;
pub mod tree;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
