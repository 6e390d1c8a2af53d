//! Execution tree construction.
//!
//! Starting from an entry recipe, every execution item is turned into a
//! node: resources become leaves, conditionals keep their children, and
//! includes are resolved through the path resolver and expanded in place.
//! Expansion uses an explicit stack of open containers, so neither include
//! chains nor deeply nested conditionals grow the call stack.
//!
//! Each build owns its visited-recipe set. A recipe reached a second time
//! within the same build becomes a `circular` leaf.
//!
//! When a container is complete, its direct children get a second pass:
//! conditionals whose text contains `.each` are matched against the
//! iterable collections and replaced by a `loop` node with one `loop_item`
//! per collection key, each holding a copy of the loop body.

use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use strsim::levenshtein;

use super::node::{ExecutionNode, NodeKind};
use crate::analysis::{IterableCollection, StructuralAnalysis};
use crate::config::AnalyzerConfig;
use crate::constants::{DEFAULT_MAX_TREE_DEPTH, LOOP_MARKER};
use crate::core::CbscanError;
use crate::parser::{
    ConditionalBlock, ExecutionItem, ParseOptions, RecipeReference, ResourceInvocation, parse_file,
};
use crate::resolver::path::is_version_or_id;
use crate::resolver::{ProviderName, RecipeName, resolve_provider_path, resolve_recipe_path};
use crate::utils::normalize_path;

/// Path segments after which the cookbook directory follows.
const COOKBOOK_SEGMENTS: &[&str] = &["cookbooks", "cookbook", "cookbook_artifacts"];

/// Maximum edit distance for suggestions, as a percentage of the name.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Builder limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOptions {
    /// Include depth after which recipes are not expanded
    pub max_depth: usize,
    /// Used for recipes not already in the aggregate
    pub parse: ParseOptions,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_TREE_DEPTH,
            parse: ParseOptions::default(),
        }
    }
}

impl TreeOptions {
    #[must_use]
    pub const fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            max_depth: config.analysis.max_tree_depth,
            parse: ParseOptions::from_config(config),
        }
    }
}

/// `cookbook::recipe` for a recipe file path.
///
/// The cookbook is the segment after the last `cookbooks`, `cookbook` or
/// `cookbook_artifacts` component, with a version or identifier suffix
/// stripped (`cache-3f2a9c...` is `cache`). Without such a component the
/// directory holding `recipes/` is used.
#[must_use]
pub fn recipe_display_name(path: &Path) -> String {
    let recipe = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let components: Vec<String> =
        path.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();

    let after_marker = components
        .iter()
        .rposition(|c| COOKBOOK_SEGMENTS.contains(&c.as_str()))
        .and_then(|i| components.get(i + 1))
        .filter(|c| *c != "recipes");
    let directory = path
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().to_string());

    let cookbook = after_marker.cloned().or(directory).unwrap_or_default();
    format!("{}::{recipe}", strip_suffix(&cookbook))
}

fn strip_suffix(dir_name: &str) -> &str {
    match dir_name.rsplit_once('-') {
        Some((base, suffix)) if !base.is_empty() && is_version_or_id(suffix) => base,
        _ => dir_name,
    }
}

enum Expansion {
    Leaf(ExecutionNode),
    Recipe(ExecutionNode, Vec<ExecutionItem>),
}

/// An open container on the build stack.
struct Open {
    node: ExecutionNode,
    items: std::vec::IntoIter<ExecutionItem>,
    /// Include depth of the recipe this container belongs to
    depth: usize,
}

/// Builds execution trees against one aggregate and search path.
#[derive(Debug)]
pub struct TreeBuilder<'a> {
    analysis: &'a StructuralAnalysis,
    search_dirs: Vec<PathBuf>,
    options: TreeOptions,
}

impl<'a> TreeBuilder<'a> {
    /// `search_dirs` is the ordered candidate list handed to the path
    /// resolver: local cookbooks first, then fetched dependencies.
    #[must_use]
    pub fn new(analysis: &'a StructuralAnalysis, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            analysis,
            search_dirs,
            options: TreeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: TreeOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve `name` and build its tree.
    ///
    /// # Errors
    ///
    /// [`CbscanError::RecipeNotFound`] when the entry recipe itself cannot be
    /// resolved; misses below the root become `unresolved` nodes instead.
    pub fn build_for_recipe(&self, name: &RecipeName) -> Result<ExecutionNode> {
        let entry = resolve_recipe_path(name, &self.search_dirs).ok_or_else(|| {
            CbscanError::RecipeNotFound {
                name: name.to_string(),
            }
        })?;
        Ok(self.build_tree(&entry))
    }

    /// Build the tree rooted at the recipe file `entry`.
    #[must_use]
    pub fn build_tree(&self, entry: &Path) -> ExecutionNode {
        let mut visited = HashSet::new();
        visited.insert(normalize_path(entry));

        let mut root = Open {
            node: ExecutionNode::new(NodeKind::Recipe, recipe_display_name(entry)).at(entry, None),
            items: self.execution_items(entry).into_iter(),
            depth: 0,
        };
        let mut stack: Vec<Open> = Vec::new();

        loop {
            let top = stack.last_mut().unwrap_or(&mut root);
            let Some(item) = top.items.next() else {
                if let Some(mut done) = stack.pop() {
                    self.expand_loops(&mut done.node);
                    stack.last_mut().unwrap_or(&mut root).node.children.push(done.node);
                    continue;
                }
                self.expand_loops(&mut root.node);
                tracing::debug!(
                    target: "tree",
                    "Built tree for {} with {} node(s)",
                    root.node.name,
                    root.node.node_count()
                );
                return root.node;
            };

            match item {
                ExecutionItem::Resource(resource) => {
                    let node = self.resource_node(resource);
                    top.node.children.push(node);
                }
                ExecutionItem::Conditional(block) => {
                    let depth = top.depth;
                    let (node, children) = conditional_node(block);
                    stack.push(Open {
                        node,
                        items: children.into_iter(),
                        depth,
                    });
                }
                ExecutionItem::Include(reference) => {
                    let depth = top.depth + 1;
                    match self.expand_include(&reference, &mut visited, depth) {
                        Expansion::Leaf(node) => top.node.children.push(node),
                        Expansion::Recipe(node, items) => stack.push(Open {
                            node,
                            items: items.into_iter(),
                            depth,
                        }),
                    }
                }
            }
        }
    }

    fn execution_items(&self, path: &Path) -> Vec<ExecutionItem> {
        if let Some(file) = self.analysis.file(path) {
            return file.parsed.execution.clone();
        }
        match parse_file(path, &self.options.parse) {
            Ok(parsed) => parsed.execution,
            Err(e) => {
                tracing::warn!(target: "tree", "Could not parse {}: {e:#}", path.display());
                Vec::new()
            }
        }
    }

    fn expand_include(
        &self,
        reference: &RecipeReference,
        visited: &mut HashSet<PathBuf>,
        depth: usize,
    ) -> Expansion {
        let Some(name) = reference.recipe_name() else {
            tracing::warn!(
                target: "tree",
                "Cannot follow dynamic include '{}' at {}:{}",
                reference.target,
                reference.file.display(),
                reference.line
            );
            return Expansion::Leaf(
                ExecutionNode::new(NodeKind::Unresolved, &reference.target)
                    .at(&reference.file, Some(reference.line)),
            );
        };

        if depth > self.options.max_depth {
            return Expansion::Leaf(
                ExecutionNode::new(NodeKind::Truncated, name.to_string())
                    .at(&reference.file, Some(reference.line)),
            );
        }

        let Some(path) = resolve_recipe_path(&name, &self.search_dirs) else {
            tracing::warn!(
                target: "tree",
                "Recipe {} included from {}:{} was not found",
                name,
                reference.file.display(),
                reference.line
            );
            let mut node = ExecutionNode::new(NodeKind::Unresolved, name.to_string())
                .at(&reference.file, Some(reference.line));
            node.suggestions = self.suggestions(&name.to_string());
            return Expansion::Leaf(node);
        };

        if !visited.insert(normalize_path(&path)) {
            tracing::debug!(target: "tree", "Circular include of {name}");
            return Expansion::Leaf(ExecutionNode::new(NodeKind::Circular, name.to_string()).at(&path, None));
        }

        let node = ExecutionNode::new(NodeKind::Recipe, recipe_display_name(&path)).at(&path, None);
        let items = self.execution_items(&path);
        Expansion::Recipe(node, items)
    }

    fn resource_node(&self, resource: ResourceInvocation) -> ExecutionNode {
        let kind = if resource.custom {
            NodeKind::CustomResource
        } else {
            NodeKind::Resource
        };
        let mut node = ExecutionNode::new(kind, resource.display_name())
            .at(&resource.file, Some(resource.line));
        if resource.custom {
            node.provider = resource
                .resource_type
                .parse::<ProviderName>()
                .ok()
                .and_then(|provider| resolve_provider_path(&provider, &self.search_dirs));
        }
        node.resource = Some(resource);
        node
    }

    /// Up to three known recipes close to `target`.
    fn suggestions(&self, target: &str) -> Vec<String> {
        let mut scored: Vec<(String, usize)> = self
            .analysis
            .recipe_names()
            .into_iter()
            .map(|known| {
                let distance = levenshtein(target, &known);
                (known, distance)
            })
            .collect();
        scored.sort_by_key(|(_, distance)| *distance);
        scored
            .into_iter()
            .filter(|(_, distance)| *distance <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
            .take(3)
            .map(|(name, _)| name)
            .collect()
    }

    /// Replace `.each` conditionals among `node`'s direct children.
    fn expand_loops(&self, node: &mut ExecutionNode) {
        for child in &mut node.children {
            if child.kind != NodeKind::Conditional || !child.name.contains(LOOP_MARKER) {
                continue;
            }
            if let Some(collection) = self.match_collection(&child.name) {
                tracing::debug!(
                    target: "tree",
                    "Expanding '{}' over {} ({} item(s))",
                    child.name,
                    collection.path,
                    collection.items.len()
                );
                *child = loop_node(child, collection);
            }
        }
    }

    /// First collection with any path segment contained in `condition`.
    ///
    /// This is a substring heuristic: `node['web']['sites'].each` also
    /// matches a collection `nginx.sites`, and a loop over a local variable
    /// matches nothing.
    fn match_collection(&self, condition: &str) -> Option<&'a IterableCollection> {
        self.analysis
            .iterable_collections()
            .iter()
            .find(|collection| collection.segments().any(|segment| condition.contains(segment)))
    }
}

fn conditional_node(block: ConditionalBlock) -> (ExecutionNode, Vec<ExecutionItem>) {
    let file = block.children.iter().find_map(item_file);
    let mut node = ExecutionNode::new(NodeKind::Conditional, block.condition);
    node.line = Some(block.line);
    node.file = file;
    (node, block.children)
}

fn item_file(item: &ExecutionItem) -> Option<PathBuf> {
    match item {
        ExecutionItem::Resource(r) => Some(r.file.clone()),
        ExecutionItem::Include(r) => Some(r.file.clone()),
        ExecutionItem::Conditional(_) => None,
    }
}

fn loop_node(conditional: &ExecutionNode, collection: &IterableCollection) -> ExecutionNode {
    let mut node = ExecutionNode::new(NodeKind::Loop, conditional.name.clone());
    node.file.clone_from(&conditional.file);
    node.line = conditional.line;
    node.children = collection
        .items
        .iter()
        .map(|key| {
            let mut item = ExecutionNode::new(NodeKind::LoopItem, key.clone());
            item.values = collection.values.get(key).cloned();
            item.children.clone_from(&conditional.children);
            item
        })
        .collect();
    node
}
