//! Command-line interface for cbscan.
//!
//! # Commands
//!
//! - `deps` - show the dependency strategy and dependencies of a cookbook
//! - `analyze` - parse every cookbook file and summarize the aggregate
//! - `tree` - print the execution tree of an entry recipe
//!
//! # Global options
//!
//! - `--verbose` / `-v` - debug logging
//! - `--quiet` / `-q` - errors only
//! - `--config` / `-c` - configuration file (else `$CBSCAN_CONFIG`, else
//!   `~/.cbscan/config.toml`)
//! - `--no-progress` - no spinners
//!
//! `RUST_LOG` overrides the verbosity flags.
//!
//! # Examples
//!
//! ```bash
//! cbscan deps cookbooks/web --fetch
//! cbscan analyze cookbooks/web --format json
//! cbscan tree cookbooks/web --recipe web::server --depth 3
//! ```

mod analyze;
pub mod common;
mod deps;
mod tree;

use anyhow::Result;
use clap::{Parser, Subcommand};

use common::{CommandContext, load_config};

/// Resolved global options.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    pub no_progress: bool,
    pub config_path: Option<String>,
}

/// Static structure and execution-flow analysis for Chef cookbooks.
#[derive(Parser, Debug)]
#[command(
    name = "cbscan",
    about = "Cookbook scanner - static structure and execution-flow analysis for Chef cookbooks",
    version,
    long_about = "cbscan resolves a cookbook's dependencies (Policyfile or Berkshelf), parses its \
                  recipes, providers and attribute files, and reconstructs the execution tree of \
                  an entry recipe with loop expansion."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Disable progress spinners
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the dependency strategy and dependencies of a cookbook
    Deps(deps::DepsCommand),
    /// Parse cookbook files and summarize the structural analysis
    Analyze(analyze::AnalyzeCommand),
    /// Print the execution tree of a recipe
    Tree(tree::TreeCommand),
}

impl Cli {
    /// Global options as a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };
        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Run the selected command.
    ///
    /// # Errors
    ///
    /// Whatever the command reports; the binary turns it into a
    /// user-friendly message.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Run the selected command with explicit global options.
    ///
    /// # Errors
    ///
    /// Configuration loading or command failure.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let ctx = CommandContext {
            config: load_config(config.config_path.as_deref())?,
            no_progress: config.no_progress,
        };

        match self.command {
            Commands::Deps(cmd) => cmd.execute(&ctx).await,
            Commands::Analyze(cmd) => cmd.execute(&ctx).await,
            Commands::Tree(cmd) => cmd.execute(&ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_levels() {
        let cli = Cli::parse_from(["cbscan", "tree", "--verbose", "--no-progress"]);
        let config = cli.build_config();
        assert_eq!(config.log_level, "debug");
        assert!(config.no_progress);

        let cli = Cli::parse_from(["cbscan", "-q", "deps", "cookbooks/web"]);
        assert_eq!(cli.build_config().log_level, "error");

        let cli = Cli::parse_from(["cbscan", "analyze", "-c", "/tmp/c.toml"]);
        let config = cli.build_config();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.config_path.as_deref(), Some("/tmp/c.toml"));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["cbscan", "-v", "-q", "tree"]).is_err());
    }

    #[test]
    fn test_clap_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
