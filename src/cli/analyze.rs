//! `cbscan analyze`: parse every cookbook file and summarize the aggregate.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::common::{CommandContext, Session, SessionOptions, validate_format};
use crate::analysis::{AnalysisSummary, StructuralAnalysis};
use crate::tools::{SystemToolRunner, ToolRunner};

const FORMATS: &[&str] = &["text", "json"];

/// Parse recipes, providers and attribute files of a cookbook set.
///
/// The text format prints counts and the iterable collections found in the
/// merged attributes; the JSON format emits the whole analysis, every fact
/// included.
#[derive(Args, Debug)]
pub struct AnalyzeCommand {
    /// Cookbook directory, or a directory of cookbooks
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Fetch dependencies first and analyze them too
    #[arg(long)]
    fetch: bool,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    format: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeReport {
    cookbook: String,
    strategy: &'static str,
    summary: AnalysisSummary,
    missing_dependencies: Vec<String>,
    analysis: StructuralAnalysis,
}

impl AnalyzeCommand {
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
    ) -> Result<AnalyzeReport> {
        let options = SessionOptions {
            fetch: self.fetch,
            require_strategy: false,
        };
        let mut session = Session::open(dir, runner, ctx, options).await?;
        let analysis = session.analyze(ctx);
        let report = AnalyzeReport {
            cookbook: session.name.clone(),
            strategy: session.strategy_name(),
            summary: analysis.summary(),
            missing_dependencies: session.resolved.missing.clone(),
            analysis,
        };
        session.cleanup();
        Ok(report)
    }

    fn print(&self, report: &AnalyzeReport) -> Result<()> {
        if self.format == "json" {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        let s = &report.summary;
        println!("{} ({})", report.cookbook.cyan().bold(), report.strategy);
        println!(
            "  {} file(s): {} recipe(s), {} provider(s), {} attribute file(s)",
            s.files, s.recipes, s.providers, s.attribute_files
        );
        println!(
            "  {} resource(s), {} attribute assignment(s), {} reference(s), {} loop(s)",
            s.resources, s.assignments, s.references, s.loops
        );

        let collections = report.analysis.iterable_collections();
        if !collections.is_empty() {
            println!("\n{}", "Iterable collections:".bold());
            for collection in collections {
                println!("  {} [{}]", collection.path.green(), collection.items.join(", "));
            }
        }

        if !report.missing_dependencies.is_empty() {
            println!(
                "\n{} {}",
                "Not analyzed:".yellow(),
                report.missing_dependencies.join(", ")
            );
        }
        Ok(())
    }
}
