//! Integration test suite for cbscan
//!
//! These tests exercise the library end to end against cookbook trees
//! written into temporary directories, and the `cbscan` binary through
//! `assert_cmd`. External tools are never required: strategy tests use the
//! fake runner from `test_utils`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **end_to_end**: dependency lookup, parsing, aggregation and tree
//!   building over real files
//! - **strategies**: strategy detection, fetch and cleanup with a fake runner
//! - **cli**: the `deps`, `analyze` and `tree` commands

mod cli;
mod end_to_end;
mod strategies;
