//! Global constants used throughout the cbscan codebase.
//!
//! This module contains timeout durations, well-known file names and other
//! fixed values that are used across multiple modules. Defining them
//! centrally makes magic strings and numbers discoverable.

use std::time::Duration;

/// Default timeout for a single external tool invocation (300 seconds).
///
/// `chef install` and `berks install` may download a large number of
/// cookbooks from a supermarket, so this is deliberately generous.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// How many parent directories are searched for a policy lock file.
pub const DEFAULT_LOCK_SEARCH_DEPTH: usize = 5;

/// File name of the Policyfile lock document.
pub const POLICYFILE_LOCK: &str = "Policyfile.lock.json";

/// File name of the Policyfile itself.
pub const POLICYFILE: &str = "Policyfile.rb";

/// Berkshelf manifest file name.
pub const BERKSFILE: &str = "Berksfile";

/// Cookbook metadata file (Ruby DSL form).
pub const METADATA_RB: &str = "metadata.rb";

/// Cookbook metadata file (compiled JSON form).
pub const METADATA_JSON: &str = "metadata.json";

/// Default name of the directory `chef export` writes into.
pub const DEFAULT_EXPORT_DIR: &str = "policy-export";

/// Default name of the directory `berks vendor` writes into.
pub const DEFAULT_VENDOR_DIR: &str = "berks-cookbooks";

/// Folder inside a policy export that holds one directory per cookbook.
pub const COOKBOOK_ARTIFACTS_DIR: &str = "cookbook_artifacts";

/// Location tag `berks list` uses for the cookbook being analyzed.
pub const BERKS_SELF_LOCATION: &str = "source at .";

/// Default executable for the Policyfile workflow.
pub const DEFAULT_CHEF_TOOL: &str = "chef";

/// Default executable for the Berkshelf workflow.
pub const DEFAULT_BERKS_TOOL: &str = "berks";

/// Extensions tried, in order, when resolving a recipe file.
pub const RECIPE_EXTENSIONS: &[&str] = &["rb", "yml", "yaml"];

/// Primary DSL source extension.
pub const DSL_EXTENSION: &str = "rb";

/// Maximum characters of an attribute value kept for display.
pub const DEFAULT_VALUE_DISPLAY_LIMIT: usize = 80;

/// Maximum recipe include depth the tree builder will follow.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 64;

/// Marker identifying an iteration construct in a conditional's text.
pub const LOOP_MARKER: &str = ".each";

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "CBSCAN_CONFIG";

/// Environment variable disabling progress spinners.
pub const NO_PROGRESS_ENV_VAR: &str = "CBSCAN_NO_PROGRESS";
