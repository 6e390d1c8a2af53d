//! Per-file analyses and the walk that produces them.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::{METADATA_JSON, METADATA_RB};
use crate::metadata::MetadataExtractor;
use crate::parser::{ParseOptions, ParsedFile, SourceFormat, parse_file};
use crate::utils::normalize_path;

/// Role of a file inside its cookbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Recipe,
    /// `providers/` or `resources/` (custom resource implementations)
    Provider,
    Attributes,
    Metadata,
}

impl FileKind {
    /// Subdirectory scanned for this kind, in scan order.
    const LAYOUT: [(&'static str, Self); 4] = [
        ("attributes", Self::Attributes),
        ("recipes", Self::Recipe),
        ("resources", Self::Provider),
        ("providers", Self::Provider),
    ];
}

/// One parsed file with its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileAnalysis {
    pub path: PathBuf,
    /// Cookbook the file belongs to
    pub cookbook: String,
    pub kind: FileKind,
    pub parsed: ParsedFile,
}

impl FileAnalysis {
    /// `cookbook::recipe` for recipe files.
    #[must_use]
    pub fn recipe_name(&self) -> Option<String> {
        if self.kind != FileKind::Recipe {
            return None;
        }
        let stem = self.path.file_stem()?.to_str()?;
        Some(format!("{}::{}", self.cookbook, stem))
    }
}

/// Whether `dir` looks like a cookbook root.
#[must_use]
pub fn is_cookbook_root(dir: &Path) -> bool {
    dir.join(METADATA_RB).is_file()
        || dir.join(METADATA_JSON).is_file()
        || dir.join("recipes").is_dir()
}

fn cookbook_name(dir: &Path) -> String {
    MetadataExtractor::cookbook_name(dir).unwrap_or_else(|| {
        dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
    })
}

/// Analyze every file of the cookbook rooted at `dir`.
///
/// Files that fail to parse are logged and skipped.
#[must_use]
pub fn collect_cookbook(dir: &Path, options: &ParseOptions) -> Vec<FileAnalysis> {
    let cookbook = cookbook_name(dir);
    let mut files = Vec::new();

    for name in [METADATA_RB, METADATA_JSON] {
        let path = dir.join(name);
        if path.is_file() {
            push_parsed(&mut files, path, &cookbook, FileKind::Metadata, options);
        }
    }

    for (subdir, kind) in FileKind::LAYOUT {
        let root = dir.join(subdir);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(target: "analysis", "Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if entry.file_type().is_file() && SourceFormat::from_path(entry.path()).is_some() {
                push_parsed(&mut files, entry.into_path(), &cookbook, kind, options);
            }
        }
    }

    tracing::debug!(
        target: "analysis",
        "Collected {} file(s) from cookbook '{}' at {}",
        files.len(),
        cookbook,
        dir.display()
    );
    files
}

fn push_parsed(
    files: &mut Vec<FileAnalysis>,
    path: PathBuf,
    cookbook: &str,
    kind: FileKind,
    options: &ParseOptions,
) {
    match parse_file(&path, options) {
        Ok(parsed) => files.push(FileAnalysis {
            path,
            cookbook: cookbook.to_string(),
            kind,
            parsed,
        }),
        Err(e) => tracing::warn!(target: "analysis", "Skipping {}: {e:#}", path.display()),
    }
}

/// Analyze every cookbook reachable from `dirs`.
///
/// Each directory is either a cookbook root or a folder of cookbooks
/// (scanned one level deep, in name order). A cookbook reachable through
/// several directories is analyzed once.
#[must_use]
pub fn collect_cookbooks(dirs: &[PathBuf], options: &ParseOptions) -> Vec<FileAnalysis> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for dir in dirs {
        let roots = if is_cookbook_root(dir) {
            vec![dir.clone()]
        } else {
            let mut children: Vec<PathBuf> = std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .map(|e| e.path())
                        .filter(|p| p.is_dir() && is_cookbook_root(p))
                        .collect()
                })
                .unwrap_or_default();
            children.sort();
            children
        };

        for root in roots {
            if seen.insert(normalize_path(&root)) {
                files.extend(collect_cookbook(&root, options));
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::CookbookFixture;

    #[test]
    fn test_collect_cookbook_kinds_and_order() {
        let fixture = CookbookFixture::new().unwrap();
        fixture.cookbook("web").unwrap();
        fixture.attributes("web", "default['web']['port'] = 80\n").unwrap();
        fixture.recipe("web", "default", "package 'nginx'\n").unwrap();
        fixture.provider("web", "site", "action :create do\nend\n").unwrap();
        fixture.write("cookbooks/web/templates/site.erb", "<%= @x %>").unwrap();

        let files = collect_cookbook(&fixture.cookbook_dir("web"), &ParseOptions::default());
        let kinds: Vec<_> = files.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FileKind::Metadata,
                FileKind::Attributes,
                FileKind::Recipe,
                FileKind::Provider,
            ]
        );
        assert!(files.iter().all(|f| f.cookbook == "web"));
        assert_eq!(files[2].recipe_name().as_deref(), Some("web::default"));
    }

    #[test]
    fn test_yaml_recipe_is_collected() {
        let fixture = CookbookFixture::new().unwrap();
        fixture.cookbook("app").unwrap();
        fixture.write("cookbooks/app/recipes/default.yml", "resources:\n  - type: package\n").unwrap();

        let files = collect_cookbook(&fixture.cookbook_dir("app"), &ParseOptions::default());
        let recipe = files.iter().find(|f| f.kind == FileKind::Recipe).unwrap();
        assert_eq!(recipe.parsed.keys, vec!["resources", "resources.type"]);
    }

    #[test]
    fn test_collect_cookbooks_from_parent_and_root() {
        let fixture = CookbookFixture::new().unwrap();
        fixture.cookbook("a").unwrap();
        fixture.cookbook("b").unwrap();
        fixture.recipe("a", "default", "package 'x'\n").unwrap();
        fixture.recipe("b", "default", "package 'y'\n").unwrap();

        let dirs = vec![fixture.cookbooks_dir(), fixture.cookbook_dir("a")];
        let files = collect_cookbooks(&dirs, &ParseOptions::default());
        let recipes: Vec<_> = files.iter().filter_map(FileAnalysis::recipe_name).collect();
        assert_eq!(recipes, vec!["a::default", "b::default"]);
    }

    #[test]
    fn test_broken_structured_file_is_skipped() {
        let fixture = CookbookFixture::new().unwrap();
        fixture.cookbook("c").unwrap();
        fixture.write("cookbooks/c/recipes/bad.json", "{").unwrap();
        fixture.recipe("c", "default", "package 'ok'\n").unwrap();

        let files = collect_cookbook(&fixture.cookbook_dir("c"), &ParseOptions::default());
        assert_eq!(files.iter().filter(|f| f.kind == FileKind::Recipe).count(), 1);
    }
}
