//! Execution tree nodes.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::parser::ResourceInvocation;

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Recipe,
    Resource,
    CustomResource,
    Conditional,
    /// A `.each` conditional matched against an iterable collection
    Loop,
    /// One key of the iterated collection
    LoopItem,
    /// Re-entry of a recipe already expanded in this build
    Circular,
    /// Include whose recipe file could not be found
    Unresolved,
    /// Include beyond the maximum tree depth
    Truncated,
}

impl NodeKind {
    /// Whether nodes of this kind never get children.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Resource | Self::CustomResource | Self::Circular | Self::Unresolved | Self::Truncated
        )
    }
}

/// One node of the execution tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionNode {
    pub kind: NodeKind,
    /// `cookbook::recipe`, `type[name]`, condition text or item key
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// The resource fact behind a resource leaf
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInvocation>,
    /// Provider or custom resource file implementing a custom resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<PathBuf>,
    /// Attribute values of a loop item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
    /// Similar recipe names for an unresolved include
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExecutionNode>,
}

impl ExecutionNode {
    #[must_use]
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            file: None,
            line: None,
            resource: None,
            provider: None,
            values: None,
            suggestions: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Attach the source location.
    #[must_use]
    pub fn at(mut self, file: impl Into<PathBuf>, line: Option<usize>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    /// Number of nodes in this subtree, including `self`.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(&node.children);
        }
        count
    }

    /// Depth of every node in pre-order (root is 0).
    #[must_use]
    pub fn depths(&self) -> Vec<usize> {
        let mut depths = Vec::new();
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            depths.push(depth);
            for child in node.children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        depths
    }

    /// First node named `name`, depth first.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Self> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.name == name {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// All nodes of `kind`, depth first.
    #[must_use]
    pub fn find_all(&self, kind: NodeKind) -> Vec<&Self> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.kind == kind {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    /// One-line label used by the text renderer.
    #[must_use]
    pub fn label(&self) -> String {
        let name = self.name.split_whitespace().collect::<Vec<_>>().join(" ");
        match self.kind {
            NodeKind::Recipe | NodeKind::Resource | NodeKind::Conditional | NodeKind::LoopItem => {
                name
            }
            NodeKind::CustomResource => match &self.provider {
                Some(provider) => format!("{name} (custom resource: {})", short_path(provider)),
                None => format!("{name} (custom resource)"),
            },
            NodeKind::Loop => format!("{name} (loop)"),
            NodeKind::Circular => format!("{name} (circular reference)"),
            NodeKind::Unresolved if self.suggestions.is_empty() => {
                format!("{name} (recipe not analyzed)")
            }
            NodeKind::Unresolved => format!(
                "{name} (recipe not analyzed; did you mean {}?)",
                self.suggestions.join(", ")
            ),
            NodeKind::Truncated => format!("{name} (max depth reached)"),
        }
    }
}

/// Last three components: `nginx/providers/site.rb`.
fn short_path(path: &std::path::Path) -> String {
    let parts: Vec<_> = path.components().rev().take(3).collect();
    parts
        .into_iter()
        .rev()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
