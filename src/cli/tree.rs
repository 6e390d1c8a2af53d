//! `cbscan tree`: print the execution tree of a recipe.

use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use super::common::{CommandContext, Session, SessionOptions, validate_format};
use crate::resolver::RecipeName;
use crate::tools::{SystemToolRunner, ToolRunner};
use crate::tree::{
    ExecutionNode, TreeBuilder, TreeOptions, render_json, render_tree, render_tree_with_depth,
};

const FORMATS: &[&str] = &["tree", "json"];

/// Build and print the execution tree of an entry recipe.
///
/// Includes are followed across the local cookbooks and, with `--fetch`,
/// the fetched dependencies. Loops over attribute collections are expanded
/// once per collection item.
#[derive(Args, Debug)]
pub struct TreeCommand {
    /// Cookbook directory
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Entry recipe (`cookbook::recipe`); defaults to `<cookbook>::default`
    #[arg(short = 'r', long)]
    recipe: Option<String>,

    /// Fetch dependencies first so their recipes expand
    #[arg(long)]
    fetch: bool,

    /// Maximum depth to display (unlimited if not specified)
    #[arg(short = 'd', long)]
    depth: Option<usize>,

    /// Output format (tree, json)
    #[arg(short = 'f', long, default_value = "tree")]
    format: String,
}

impl TreeCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        self.validate_arguments()?;
        let tree = self.build(&self.path, SystemToolRunner::new(), ctx).await?;
        self.print(&tree)
    }

    fn validate_arguments(&self) -> Result<()> {
        validate_format(&self.format, FORMATS)?;
        if let Some(recipe) = &self.recipe {
            recipe.parse::<RecipeName>()?;
        }
        if self.depth == Some(0) {
            return Err(crate::core::CbscanError::Other {
                message: "--depth must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn build<R: ToolRunner>(
        &self,
        dir: &Path,
        runner: R,
        ctx: &CommandContext,
    ) -> Result<ExecutionNode> {
        let options = SessionOptions {
            fetch: self.fetch,
            require_strategy: false,
        };
        let mut session = Session::open(dir, runner, ctx, options).await?;

        let result = self.recipe_name(&session.name).and_then(|entry| {
            let analysis = session.analyze(ctx);
            TreeBuilder::new(&analysis, session.search_dirs())
                .with_options(TreeOptions::from_config(&ctx.config))
                .build_for_recipe(&entry)
        });
        session.cleanup();
        result
    }

    fn recipe_name(&self, cookbook: &str) -> Result<RecipeName> {
        Ok(self.recipe.as_deref().unwrap_or(cookbook).parse()?)
    }

    fn print(&self, tree: &ExecutionNode) -> Result<()> {
        let output = match (self.format.as_str(), self.depth) {
            ("json", _) => render_json(tree)?,
            (_, Some(depth)) => render_tree_with_depth(tree, depth),
            (_, None) => render_tree(tree),
        };
        println!("{}", output.trim_end());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CbscanError;
    use crate::test_utils::{CookbookFixture, FakeRunner};
    use crate::tree::NodeKind;

    fn command(recipe: Option<&str>) -> TreeCommand {
        TreeCommand {
            path: PathBuf::from("."),
            recipe: recipe.map(str::to_string),
            fetch: false,
            depth: None,
            format: "tree".to_string(),
        }
    }

    #[tokio::test]
    async fn test_defaults_to_cookbook_default_recipe() {
        let fixture = CookbookFixture::new().unwrap();
        fixture.cookbook("web").unwrap();
        fixture.cookbook("cache").unwrap();
        fixture.recipe("web", "default", "include_recipe 'cache::default'\n").unwrap();
        fixture.recipe("cache", "default", "package 'redis'\n").unwrap();

        let tree = command(None)
            .build(&fixture.cookbook_dir("web"), FakeRunner::new(), &CommandContext::default())
            .await
            .unwrap();
        assert_eq!(tree.name, "web::default");
        assert_eq!(tree.children[0].name, "cache::default");
        assert_eq!(tree.children[0].children[0].kind, NodeKind::Resource);
    }

    #[tokio::test]
    async fn test_unknown_entry_recipe() {
        let fixture = CookbookFixture::new().unwrap();
        fixture.cookbook("web").unwrap();
        fixture.recipe("web", "default", "package 'x'\n").unwrap();

        let err = command(Some("web::missing"))
            .build(&fixture.cookbook_dir("web"), FakeRunner::new(), &CommandContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CbscanError>(),
            Some(CbscanError::RecipeNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_arguments() {
        assert!(command(Some("web::default")).validate_arguments().is_ok());
        let mut bad = command(None);
        bad.format = "dot".to_string();
        assert!(bad.validate_arguments().is_err());
        let mut zero = command(None);
        zero.depth = Some(0);
        assert!(zero.validate_arguments().is_err());
    }
}
