//! Core types for cbscan.
//!
//! Currently this is the error system: [`CbscanError`] enumerates every failure
//! mode of the analysis core and [`ErrorContext`] adds the suggestion/details
//! shown to CLI users. See [`error`] for the taxonomy.

pub mod error;

pub use error::{CbscanError, ErrorContext, is_tool_failure, user_friendly_error};
