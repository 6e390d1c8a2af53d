//! Name-to-file resolution across an ordered list of cookbook directories.
//!
//! A candidate directory is either a cookbook itself or a folder of
//! cookbooks (`cookbooks/`, a vendor directory, an export's
//! `cookbook_artifacts/`). A directory is cookbook `name` when:
//!
//! 1. its file name is exactly `name`, or
//! 2. its file name is `name-<suffix>` where the suffix is a version
//!    (`nginx-1.2.3`) or a content identifier (`nginx-3f2a9c...`), or
//! 3. its `metadata.rb` / `metadata.json` declares `name`.
//!
//! Resolution is first-match-wins over the candidate order; within one
//! candidate the candidate itself is tried before its immediate
//! subdirectories, which are visited in name order.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::names::{CookbookName, ProviderName, RecipeName};
use crate::constants::{DSL_EXTENSION, RECIPE_EXTENSIONS};
use crate::metadata::MetadataExtractor;

static HEX_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{7,64}$").expect("valid regex"));
static DOTTED_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*$").expect("valid regex"));

/// Whether `suffix` looks like a version or content identifier.
pub(crate) fn is_version_or_id(suffix: &str) -> bool {
    semver::Version::parse(suffix).is_ok()
        || DOTTED_VERSION.is_match(suffix)
        || HEX_ID.is_match(suffix)
}

/// Whether directory `dir` is cookbook `name`.
#[must_use]
pub fn matches_cookbook(dir: &Path, name: &str) -> bool {
    let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if dir_name == name {
        return true;
    }
    if let Some(suffix) = dir_name.strip_prefix(name).and_then(|rest| rest.strip_prefix('-'))
        && is_version_or_id(suffix)
    {
        return true;
    }
    MetadataExtractor::cookbook_name(dir).is_some_and(|declared| declared == name)
}

/// Cookbook directories for `name` under `candidate`, in search order.
fn cookbook_dirs(candidate: &Path, name: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if candidate.is_dir() && matches_cookbook(candidate, name) {
        found.push(candidate.to_path_buf());
    }

    let Ok(entries) = std::fs::read_dir(candidate) else {
        return found;
    };
    let mut children: Vec<PathBuf> =
        entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()).collect();
    children.sort();
    found.extend(children.into_iter().filter(|child| matches_cookbook(child, name)));
    found
}

/// First existing `relative` file inside cookbook `name` across `dirs`.
fn resolve_in(name: &str, dirs: &[PathBuf], relatives: &[String]) -> Option<PathBuf> {
    for candidate in dirs {
        for cookbook in cookbook_dirs(candidate, name) {
            for relative in relatives {
                let path = cookbook.join(relative);
                if path.is_file() {
                    tracing::trace!("Resolved {} in {}", relative, cookbook.display());
                    return Some(path);
                }
            }
        }
    }
    None
}

/// Locate `recipes/{recipe}.rb` (then `.yml`, `.yaml`) for a recipe name.
#[must_use]
pub fn resolve_recipe_path(name: &RecipeName, dirs: &[PathBuf]) -> Option<PathBuf> {
    let relatives: Vec<String> = RECIPE_EXTENSIONS
        .iter()
        .map(|ext| format!("recipes/{}.{ext}", name.recipe))
        .collect();
    let resolved = resolve_in(name.cookbook.as_str(), dirs, &relatives);
    if resolved.is_none() {
        tracing::debug!("Recipe {} not found in {} candidate directories", name, dirs.len());
    }
    resolved
}

/// Locate the provider (or custom resource) file for a resource type name.
///
/// Every underscore split is tried in order; the first split whose cookbook
/// holds `providers/{provider}.rb` or `resources/{provider}.rb` wins.
#[must_use]
pub fn resolve_provider_path(name: &ProviderName, dirs: &[PathBuf]) -> Option<PathBuf> {
    name.candidate_splits().into_iter().find_map(|(cookbook, provider)| {
        let relatives = [
            format!("providers/{provider}.{DSL_EXTENSION}"),
            format!("resources/{provider}.{DSL_EXTENSION}"),
        ];
        resolve_in(&cookbook, dirs, &relatives)
    })
}

/// Locate `attributes/default.rb` for a cookbook.
#[must_use]
pub fn resolve_attributes_path(name: &CookbookName, dirs: &[PathBuf]) -> Option<PathBuf> {
    resolve_in(name.as_str(), dirs, &[format!("attributes/default.{DSL_EXTENSION}")])
}

/// Locate a cookbook's root directory.
#[must_use]
pub fn resolve_cookbook_dir(name: &CookbookName, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|candidate| cookbook_dirs(candidate, name.as_str()).into_iter().next())
}
