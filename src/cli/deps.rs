//! `cbscan deps`: show how a cookbook resolves its dependencies.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::common::{CommandContext, Session, SessionOptions, validate_format};
use crate::lockfile::DependencyGraph;
use crate::strategy::{DependencySpec, DependencyStrategy, ResolvedDependencyPath};
use crate::tools::{SystemToolRunner, ToolRunner};

const FORMATS: &[&str] = &["text", "json"];

/// Show the dependency strategy and dependencies of a cookbook.
///
/// Without `--fetch` the dependencies come from the lock file or from
/// `depends` lines in `metadata.rb`. With `--fetch` the strategy's tool runs
/// and every dependency is matched to its exported or vendored directory.
#[derive(Args, Debug)]
pub struct DepsCommand {
    /// Cookbook directory
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Run `chef export` / `berks vendor` and resolve on-disk paths
    #[arg(long)]
    fetch: bool,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    format: String,
}

#[derive(Debug, Serialize)]
struct DepsReport {
    cookbook: String,
    strategy: &'static str,
    dependencies: Vec<DependencySpec>,
    resolved: Vec<ResolvedDependencyPath>,
    missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycle: Option<Vec<String>>,
    #[serde(skip)]
    tree: Option<String>,
}

impl DepsCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        validate_format(&self.format, FORMATS)?;
        let report = self.report(&self.path, SystemToolRunner::new(), ctx).await?;
        self.print(&report)
    }

    async fn report<R: ToolRunner>(
        &self,
        dir: &Path,
        runner: R,
        ctx: &CommandContext,
    ) -> Result<DepsReport> {
        let options = SessionOptions {
            fetch: self.fetch,
            require_strategy: true,
        };
        let mut session = Session::open(dir, runner, ctx, options).await?;

        let graph = match session.strategy() {
            Some(DependencyStrategy::Policyfile(policy)) => {
                Some(DependencyGraph::from_registry(policy.registry()))
            }
            _ => None,
        };
        let cycle = graph.as_ref().and_then(DependencyGraph::find_cycle);
        if let Some(cycle) = &cycle {
            tracing::info!("Dependency cycle in lock file: {}", cycle.join(" -> "));
        }

        let report = DepsReport {
            cookbook: session.name.clone(),
            strategy: session.strategy_name(),
            dependencies: session.dependencies.clone(),
            resolved: session.resolved.resolved.clone(),
            missing: session.resolved.missing.clone(),
            cycle,
            tree: graph.map(|g| g.to_tree_string(&session.name)),
        };
        session.cleanup();
        Ok(report)
    }

    fn print(&self, report: &DepsReport) -> Result<()> {
        if self.format == "json" {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        println!("{} ({})", report.cookbook.cyan().bold(), report.strategy);
        if report.dependencies.is_empty() {
            println!("No dependencies found.");
            return Ok(());
        }

        println!("\n{}", "Dependencies:".bold());
        for dep in &report.dependencies {
            let status = if report.missing.contains(&dep.name) {
                " [missing]".red().to_string()
            } else {
                String::new()
            };
            println!("  {} {}{}", dep.name, dep.version.dimmed(), status);
        }

        if !report.resolved.is_empty() {
            println!("\n{}", "Resolved paths:".bold());
            for dep in &report.resolved {
                println!("  {} -> {}", dep.name, dep.path.display());
            }
        }

        if let Some(tree) = &report.tree {
            println!("\n{}", "Lock graph:".bold());
            print!("{tree}");
        }
        if let Some(cycle) = &report.cycle {
            println!("\n{} {}", "Cycle:".yellow(), cycle.join(" -> "));
        }
        Ok(())
    }
}
