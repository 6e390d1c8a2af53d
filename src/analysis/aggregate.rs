//! The structural analysis aggregate.
//!
//! [`StructuralAnalysis::build`] takes the per-file analyses of a cookbook
//! set and derives two things from them:
//!
//! - the merged attribute tree: every assignment whose right-hand side is a
//!   static literal, applied in precedence order (`default` first,
//!   `force_override` last; source order within one level)
//! - the iterable collections: non-empty mappings whose values are all
//!   mappings, recorded only at the deepest qualifying level
//!
//! The aggregate is immutable; re-analysis builds a new one.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::collector::{FileAnalysis, FileKind};
use crate::parser::AttributeAssignment;
use crate::utils::normalize_path;

/// A mapping attribute a loop can iterate over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterableCollection {
    /// Dotted attribute path (`nginx.sites`)
    pub path: String,
    /// Item keys in source order
    pub items: Vec<String>,
    /// Each item's nested attribute values
    #[serde(skip)]
    pub values: Map<String, Value>,
}

impl IterableCollection {
    /// Path segments (`["nginx", "sites"]`).
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.').filter(|s| !s.is_empty())
    }
}

/// Counts shown by `cbscan analyze`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub files: usize,
    pub recipes: usize,
    pub providers: usize,
    pub attribute_files: usize,
    pub resources: usize,
    pub assignments: usize,
    pub references: usize,
    pub loops: usize,
    pub collections: usize,
}

/// Aggregate of every analyzed file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StructuralAnalysis {
    files: Vec<FileAnalysis>,
    attributes: Value,
    iterable_collections: Vec<IterableCollection>,
    #[serde(skip)]
    index: HashMap<PathBuf, usize>,
}

impl StructuralAnalysis {
    /// Build the aggregate from per-file analyses.
    #[must_use]
    pub fn build(files: Vec<FileAnalysis>) -> Self {
        let attributes =
            merge_attributes(files.iter().flat_map(|f| f.parsed.assignments()));
        let iterable_collections = find_iterable_collections(&attributes);
        let index = files
            .iter()
            .enumerate()
            .map(|(i, f)| (normalize_path(&f.path), i))
            .collect();

        tracing::debug!(
            target: "analysis",
            "Aggregated {} file(s), {} iterable collection(s)",
            files.len(),
            iterable_collections.len()
        );

        Self {
            files,
            attributes,
            iterable_collections,
            index,
        }
    }

    /// Every analyzed file, in collection order.
    #[must_use]
    pub fn files(&self) -> &[FileAnalysis] {
        &self.files
    }

    pub fn files_of_kind(&self, kind: FileKind) -> impl Iterator<Item = &FileAnalysis> {
        self.files.iter().filter(move |f| f.kind == kind)
    }

    /// The analysis of `path`, if it was collected.
    #[must_use]
    pub fn file(&self, path: &Path) -> Option<&FileAnalysis> {
        self.index.get(&normalize_path(path)).map(|&i| &self.files[i])
    }

    /// Merged attribute tree.
    #[must_use]
    pub const fn attributes(&self) -> &Value {
        &self.attributes
    }

    /// Iterable collections in discovery order.
    #[must_use]
    pub fn iterable_collections(&self) -> &[IterableCollection] {
        &self.iterable_collections
    }

    #[must_use]
    pub fn collection(&self, path: &str) -> Option<&IterableCollection> {
        self.iterable_collections.iter().find(|c| c.path == path)
    }

    /// `cookbook::recipe` of every collected recipe file.
    #[must_use]
    pub fn recipe_names(&self) -> Vec<String> {
        self.files.iter().filter_map(FileAnalysis::recipe_name).collect()
    }

    #[must_use]
    pub fn summary(&self) -> AnalysisSummary {
        let mut summary = AnalysisSummary {
            files: self.files.len(),
            collections: self.iterable_collections.len(),
            ..AnalysisSummary::default()
        };
        for file in &self.files {
            match file.kind {
                FileKind::Recipe => summary.recipes += 1,
                FileKind::Provider => summary.providers += 1,
                FileKind::Attributes => summary.attribute_files += 1,
                FileKind::Metadata => {}
            }
            summary.resources += file.parsed.resources().count();
            summary.assignments += file.parsed.assignments().count();
            summary.references += file.parsed.references().count();
            summary.loops += file.parsed.loops().count();
        }
        summary
    }
}

/// Merge literal assignments into one attribute tree.
pub fn merge_attributes<'a>(assignments: impl Iterator<Item = &'a AttributeAssignment>) -> Value {
    let mut ordered: Vec<&AttributeAssignment> =
        assignments.filter(|a| a.value.is_some()).collect();
    ordered.sort_by_key(|a| a.precedence.rank());

    let mut root = Value::Object(Map::new());
    for assignment in ordered {
        if let Some(value) = &assignment.value {
            insert_path(&mut root, &assignment.path, value.clone());
        }
    }
    root
}

fn insert_path(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = root;
    for segment in parents {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else {
            return;
        };
        cursor = map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()));
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    if let Value::Object(map) = cursor {
        match map.get_mut(last) {
            Some(existing) => deep_merge(existing, value),
            None => {
                map.insert(last.clone(), value);
            }
        }
    }
}

/// Mappings merge key by key; anything else replaces.
fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Deepest mappings whose values are all mappings.
///
/// A mapping at path P qualifies when it is non-empty, every value is a
/// mapping, and no child qualifies. Children are decided before parents by
/// walking the pre-order in reverse.
#[must_use]
pub fn find_iterable_collections(root: &Value) -> Vec<IterableCollection> {
    let mut preorder: Vec<(String, &Map<String, Value>)> = Vec::new();
    let mut stack: Vec<(String, &Value)> = Vec::new();
    if let Value::Object(map) = root {
        for (key, child) in map.iter().rev() {
            stack.push((key.clone(), child));
        }
    }
    while let Some((path, value)) = stack.pop() {
        if let Value::Object(map) = value {
            for (key, child) in map.iter().rev() {
                stack.push((format!("{path}.{key}"), child));
            }
            preorder.push((path, map));
        }
    }

    let mut qualifying = HashSet::new();
    for (path, map) in preorder.iter().rev() {
        let all_mappings = !map.is_empty() && map.values().all(Value::is_object);
        let child_qualifies = map.keys().any(|k| qualifying.contains(&format!("{path}.{k}")));
        if all_mappings && !child_qualifies {
            qualifying.insert(path.clone());
        }
    }

    preorder
        .into_iter()
        .filter(|(path, _)| qualifying.contains(path))
        .map(|(path, map)| IterableCollection {
            path,
            items: map.keys().cloned().collect(),
            values: map.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, ruby};
    use serde_json::json;

    fn analysis_of(src: &str) -> StructuralAnalysis {
        let path = PathBuf::from("cookbooks/nginx/attributes/default.rb");
        let parsed = ruby::parse(src, &path, &ParseOptions::default());
        StructuralAnalysis::build(vec![FileAnalysis {
            path,
            cookbook: "nginx".to_string(),
            kind: FileKind::Attributes,
            parsed,
        }])
    }

    #[test]
    fn test_deepest_collection_only() {
        let collections = find_iterable_collections(&json!({
            "nginx": {"sites": {"a": {}, "b": {}}}
        }));
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].path, "nginx.sites");
        assert_eq!(collections[0].items, vec!["a", "b"]);
    }

    #[test]
    fn test_collections_with_values_and_siblings() {
        let collections = find_iterable_collections(&json!({
            "nginx": {
                "port": 80,
                "sites": {"a": {"port": 81}, "b": {"port": 82}},
            },
            "users": {"alice": {"uid": 1}, "bob": {"uid": 2}},
            "empty": {},
        }));
        let paths: Vec<_> = collections.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["nginx.sites", "users"]);
        assert_eq!(collections[0].values["b"], json!({"port": 82}));
    }

    #[test]
    fn test_merge_respects_precedence_over_order() {
        let analysis = analysis_of(
            "override['app']['port'] = 9000\ndefault['app']['port'] = 80\ndefault['app']['user'] = 'app'\n",
        );
        assert_eq!(analysis.attributes(), &json!({"app": {"port": 9000, "user": "app"}}));
    }

    #[test]
    fn test_merge_hash_values_and_build_collections() {
        let analysis = analysis_of(
            "default['nginx']['sites'] = { 'a' => { 'port' => 80 } }\ndefault['nginx']['sites']['b'] = { 'port' => 81 }\ndefault['nginx']['dynamic'] = node['x']\n",
        );
        let sites = analysis.collection("nginx.sites").unwrap();
        assert_eq!(sites.items, vec!["a", "b"]);
        assert!(analysis.collection("nginx").is_none());
        assert!(analysis.attributes()["nginx"].get("dynamic").is_none());
    }

    #[test]
    fn test_scalar_replaced_by_mapping() {
        let mut root = json!({"a": 1});
        insert_path(&mut root, &["a".to_string(), "b".to_string()], json!(2));
        assert_eq!(root, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_lookup_and_summary() {
        let analysis = analysis_of("default['a'] = 1\n");
        assert!(analysis.file(Path::new("cookbooks/./nginx/attributes/default.rb")).is_some());
        let summary = analysis.summary();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.attribute_files, 1);
        assert_eq!(summary.assignments, 1);
        assert_eq!(summary.collections, 0);
    }
}
