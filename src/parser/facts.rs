//! Structured facts extracted from a source file.
//!
//! Every fact records the file it came from and a 1-based line number.
//! Facts are immutable once produced; the aggregate and the tree builder
//! only read them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::resolver::RecipeName;

/// Attribute precedence level of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    Default,
    ForceDefault,
    Normal,
    Set,
    Override,
    ForceOverride,
}

impl Precedence {
    /// Parse the method name used in attribute files.
    #[must_use]
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "default" => Self::Default,
            "force_default" => Self::ForceDefault,
            "normal" => Self::Normal,
            "set" => Self::Set,
            "override" => Self::Override,
            "force_override" => Self::ForceOverride,
            _ => return None,
        })
    }

    /// Method name as written in source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::ForceDefault => "force_default",
            Self::Normal => "normal",
            Self::Set => "set",
            Self::Override => "override",
            Self::ForceOverride => "force_override",
        }
    }

    /// Merge order: a higher rank wins over a lower one.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::ForceDefault => 1,
            Self::Normal | Self::Set => 2,
            Self::Override => 3,
            Self::ForceOverride => 4,
        }
    }
}

/// A resource call such as `package 'nginx' do ... end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInvocation {
    pub file: PathBuf,
    pub line: usize,
    /// Resource type (`package`, `template`, `nginx_site`)
    pub resource_type: String,
    /// First positional argument: the literal value, or the source text of
    /// an expression
    pub name: Option<String>,
    /// Name is interpolated or computed
    pub dynamic_name: bool,
    /// Not one of the built-in resource types
    pub custom: bool,
    /// Recognized properties and raw assignments from the block; a repeated
    /// key (several `notifies`) keeps every value, newline separated
    pub attributes: BTreeMap<String, String>,
    /// Source text of the whole call including its block
    pub raw: String,
}

impl ResourceInvocation {
    /// `type[name]`, the way resources are referenced in notifications.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{}[{}]", self.resource_type, name),
            None => self.resource_type.clone(),
        }
    }

    pub(crate) fn add_attribute(&mut self, key: &str, value: String) {
        self.attributes
            .entry(key.to_string())
            .and_modify(|existing| {
                existing.push('\n');
                existing.push_str(&value);
            })
            .or_insert(value);
    }
}

/// `default['nginx']['port'] = 80` and friends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeAssignment {
    pub file: PathBuf,
    pub line: usize,
    pub precedence: Precedence,
    /// Key path segments (`["nginx", "port"]`)
    pub path: Vec<String>,
    /// Right-hand side source text
    pub raw_value: String,
    /// `raw_value` collapsed to one line and truncated for display
    pub display_value: String,
    /// Evaluated value when the right-hand side is a static literal
    pub value: Option<serde_json::Value>,
}

impl AttributeAssignment {
    /// `nginx.port`.
    #[must_use]
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

/// How a file references another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    IncludeRecipe,
    Require,
    RequireRelative,
}

/// `include_recipe 'cache::default'`, `require 'x'`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeReference {
    pub file: PathBuf,
    pub line: usize,
    pub kind: ReferenceKind,
    /// Argument as written (interpolations verbatim)
    pub target: String,
    /// Argument contains interpolation
    pub dynamic: bool,
}

impl RecipeReference {
    /// Recipe name for `include_recipe`; a bare cookbook means `default`.
    #[must_use]
    pub fn recipe_name(&self) -> Option<RecipeName> {
        if self.kind != ReferenceKind::IncludeRecipe || self.dynamic {
            return None;
        }
        self.target.parse().ok()
    }
}

/// `<collection>.each do |vars|` with its full span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopConstruct {
    pub file: PathBuf,
    pub line: usize,
    /// Line of the closing `end`
    pub end_line: usize,
    /// Receiver of the `each` call as written
    pub collection: String,
    /// `each`, `each_pair`, `each_with_index`, ...
    pub method: String,
    /// Block parameter names
    pub variables: Vec<String>,
}

/// One extracted fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "fact", rename_all = "snake_case")]
pub enum ParsedFileFact {
    ResourceInvocation(ResourceInvocation),
    AttributeAssignment(AttributeAssignment),
    RecipeReference(RecipeReference),
    LoopConstruct(LoopConstruct),
}

impl ParsedFileFact {
    /// Line the fact starts on.
    #[must_use]
    pub const fn line(&self) -> usize {
        match self {
            Self::ResourceInvocation(f) => f.line,
            Self::AttributeAssignment(f) => f.line,
            Self::RecipeReference(f) => f.line,
            Self::LoopConstruct(f) => f.line,
        }
    }

    /// File the fact came from.
    #[must_use]
    pub const fn file(&self) -> &PathBuf {
        match self {
            Self::ResourceInvocation(f) => &f.file,
            Self::AttributeAssignment(f) => &f.file,
            Self::RecipeReference(f) => &f.file,
            Self::LoopConstruct(f) => &f.file,
        }
    }
}

/// Kind of a control-flow block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalKind {
    If,
    Unless,
    Elsif,
    Else,
    Case,
    When,
    While,
    Until,
    For,
    /// `<collection>.each do |vars|`
    Each,
}

/// A control-flow block in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionalBlock {
    pub kind: ConditionalKind,
    /// Display text: `if node['x']`, `when 'debian'`, or for loops the
    /// receiver with its method (`node['nginx']['sites'].each`)
    pub condition: String,
    pub line: usize,
    /// Block parameter names (loops only)
    pub variables: Vec<String>,
    pub children: Vec<ExecutionItem>,
}

/// Top-level execution-order entry of a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum ExecutionItem {
    Resource(ResourceInvocation),
    Include(RecipeReference),
    Conditional(ConditionalBlock),
}

/// Everything extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedFile {
    /// Facts in source order
    pub facts: Vec<ParsedFileFact>,
    /// Execution-order items (primary DSL only)
    pub execution: Vec<ExecutionItem>,
    /// Dotted key paths (structured-data files only)
    pub keys: Vec<String>,
}

impl ParsedFile {
    /// All resource invocations.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceInvocation> {
        self.facts.iter().filter_map(|f| match f {
            ParsedFileFact::ResourceInvocation(r) => Some(r),
            _ => None,
        })
    }

    /// All attribute assignments.
    pub fn assignments(&self) -> impl Iterator<Item = &AttributeAssignment> {
        self.facts.iter().filter_map(|f| match f {
            ParsedFileFact::AttributeAssignment(a) => Some(a),
            _ => None,
        })
    }

    /// All recipe references.
    pub fn references(&self) -> impl Iterator<Item = &RecipeReference> {
        self.facts.iter().filter_map(|f| match f {
            ParsedFileFact::RecipeReference(r) => Some(r),
            _ => None,
        })
    }

    /// All loop constructs.
    pub fn loops(&self) -> impl Iterator<Item = &LoopConstruct> {
        self.facts.iter().filter_map(|f| match f {
            ParsedFileFact::LoopConstruct(l) => Some(l),
            _ => None,
        })
    }
}
