//! Policy lock document (`Policyfile.lock.json`) parsing.
//!
//! The lock document pins every cookbook in a policy to an exact version and
//! content-addressed identifier. Two top-level sections matter here:
//!
//! ```json
//! {
//!   "cookbook_locks": {
//!     "web":   { "version": "1.0.0", "identifier": "7c1a...", "source": "../web" },
//!     "cache": { "version": "2.1.0", "identifier": "9e0f...",
//!                "origin": "https://supermarket.chef.io:443/api/v1/cookbooks/cache/versions/2.1.0/download",
//!                "cache_key": "cache-2.1.0-supermarket.chef.io" }
//!   },
//!   "solution_dependencies": {
//!     "Policyfile": [["web", ">= 0.0.0"]],
//!     "dependencies": {
//!       "web (1.0.0)": [["cache", "~> 2.0"]],
//!       "cache (2.1.0)": []
//!     }
//!   }
//! }
//! ```
//!
//! [`CookbookRegistry::parse`] turns that into immutable [`CookbookRecord`]s
//! plus [`DependencyEdge`]s; [`CookbookRegistry::transitive_dependencies`]
//! walks the edges (see [`graph`]).

pub mod graph;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub use graph::DependencyGraph;

use crate::core::CbscanError;
use crate::utils::fs::normalize_path;

/// Where a locked cookbook comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CookbookOrigin {
    /// Cookbook source lives on the local filesystem.
    Local {
        /// Path as recorded in the lock document (usually relative to it)
        path: PathBuf,
    },
    /// Cookbook is fetched from a registry or remote source.
    Remote {
        /// Download URL or registry origin
        origin: Option<String>,
        /// Cache key used by the resolver tool
        cache_key: Option<String>,
    },
}

/// One locked cookbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookbookRecord {
    /// Cookbook name
    pub name: String,
    /// Exact locked version
    pub version: String,
    /// Content-addressed identifier
    pub identifier: String,
    /// Local path or remote origin
    pub origin: CookbookOrigin,
}

impl CookbookRecord {
    /// Whether the cookbook is sourced from the local filesystem.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self.origin, CookbookOrigin::Local { .. })
    }

    /// Recorded local source path, for local cookbooks.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        match &self.origin {
            CookbookOrigin::Local { path } => Some(path),
            CookbookOrigin::Remote { .. } => None,
        }
    }

    /// Directory name used for this cookbook inside an export's artifact folder.
    #[must_use]
    pub fn artifact_dir_name(&self) -> String {
        format!("{}-{}", self.name, self.identifier)
    }
}

/// A direct dependency as listed under one cookbook's edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeTarget {
    /// Dependency cookbook name
    pub name: String,
    /// Version constraint declared by the depending cookbook
    pub constraint: String,
    /// Identifier from `cookbook_locks`, when the dependency is locked
    pub identifier: Option<String>,
    /// Locked version from `cookbook_locks`, when the dependency is locked
    pub version: Option<String>,
}

/// `(cookbook, version) -> direct dependencies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Cookbook name
    pub cookbook: String,
    /// Cookbook version the edge was recorded for
    pub version: String,
    /// Direct dependencies in document order
    pub dependencies: Vec<EdgeTarget>,
}

/// All locked cookbooks and their dependency edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CookbookRegistry {
    /// Policy name, if the document declares one
    pub policy_name: Option<String>,
    /// Cookbooks keyed by name
    cookbooks: BTreeMap<String, CookbookRecord>,
    /// Dependency edges keyed by cookbook name
    edges: BTreeMap<String, DependencyEdge>,
    /// Directory of the lock document; relative local paths are resolved against it
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
struct RawLock {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cookbook_locks: Option<BTreeMap<String, RawCookbookLock>>,
    #[serde(default)]
    solution_dependencies: Option<RawSolution>,
}

#[derive(Deserialize)]
struct RawCookbookLock {
    version: String,
    identifier: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    source_options: Option<serde_json::Value>,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    cache_key: Option<String>,
}

#[derive(Deserialize)]
struct RawSolution {
    #[serde(default)]
    dependencies: BTreeMap<String, Vec<Vec<String>>>,
}

impl CookbookRegistry {
    /// Parse a lock document.
    ///
    /// # Errors
    ///
    /// Returns [`CbscanError::MalformedLockFile`] if the document is not JSON,
    /// does not match the lock schema, or lacks `cookbook_locks` /
    /// `solution_dependencies`.
    pub fn parse(document: &str) -> Result<Self, CbscanError> {
        Self::parse_labeled(document, "<lock document>")
    }

    /// Read and parse a lock document from disk.
    ///
    /// Relative local cookbook paths are resolved against the document's
    /// directory by [`Self::resolved_local_path`].
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read lock file: {}", path.display()))?;
        let mut registry = Self::parse_labeled(&content, &path.display().to_string())?;
        registry.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!(
            "Loaded {} locked cookbooks from {}",
            registry.cookbooks.len(),
            path.display()
        );
        Ok(registry)
    }

    fn parse_labeled(document: &str, label: &str) -> Result<Self, CbscanError> {
        let malformed = |reason: String| CbscanError::MalformedLockFile {
            file: label.to_string(),
            reason,
        };

        let raw: RawLock = serde_json::from_str(document).map_err(|e| malformed(e.to_string()))?;
        let locks = raw
            .cookbook_locks
            .ok_or_else(|| malformed("missing top-level section 'cookbook_locks'".to_string()))?;
        let solution = raw.solution_dependencies.ok_or_else(|| {
            malformed("missing top-level section 'solution_dependencies'".to_string())
        })?;

        let cookbooks: BTreeMap<String, CookbookRecord> = locks
            .into_iter()
            .map(|(name, lock)| {
                let origin = match local_source(&lock) {
                    Some(path) => CookbookOrigin::Local {
                        path: PathBuf::from(path),
                    },
                    None => CookbookOrigin::Remote {
                        origin: lock.origin,
                        cache_key: lock.cache_key,
                    },
                };
                let record = CookbookRecord {
                    name: name.clone(),
                    version: lock.version,
                    identifier: lock.identifier,
                    origin,
                };
                (name, record)
            })
            .collect();

        let mut edges = BTreeMap::new();
        for (key, deps) in solution.dependencies {
            let (cookbook, version) = split_edge_key(&key);
            let dependencies = deps
                .into_iter()
                .filter_map(|pair| {
                    let mut parts = pair.into_iter();
                    let name = parts.next()?;
                    let constraint = parts.next().unwrap_or_else(|| ">= 0.0.0".to_string());
                    let locked = cookbooks.get(&name);
                    Some(EdgeTarget {
                        identifier: locked.map(|r| r.identifier.clone()),
                        version: locked.map(|r| r.version.clone()),
                        name,
                        constraint,
                    })
                })
                .collect();
            edges.insert(
                cookbook.clone(),
                DependencyEdge {
                    cookbook,
                    version,
                    dependencies,
                },
            );
        }

        Ok(Self {
            policy_name: raw.name,
            cookbooks,
            edges,
            base_dir: None,
        })
    }

    /// Look up a cookbook by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CookbookRecord> {
        self.cookbooks.get(name)
    }

    /// All cookbooks, ordered by name.
    pub fn cookbooks(&self) -> impl Iterator<Item = &CookbookRecord> {
        self.cookbooks.values()
    }

    /// Number of locked cookbooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookbooks.len()
    }

    /// Whether the registry has no cookbooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookbooks.is_empty()
    }

    /// The dependency edge recorded for a cookbook.
    #[must_use]
    pub fn edge(&self, name: &str) -> Option<&DependencyEdge> {
        self.edges.get(name)
    }

    /// All dependency edges, ordered by cookbook name.
    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.values()
    }

    /// Local source path resolved against the lock document's directory.
    #[must_use]
    pub fn resolved_local_path(&self, record: &CookbookRecord) -> Option<PathBuf> {
        let path = record.local_path()?;
        Some(match &self.base_dir {
            Some(base) if path.is_relative() => normalize_path(&base.join(path)),
            _ => normalize_path(path),
        })
    }

    /// Find the local cookbook whose source path equals `path`.
    ///
    /// Matches the path exactly as recorded, or exactly against the recorded
    /// path resolved relative to the lock document. No globbing.
    #[must_use]
    pub fn lookup_by_path(&self, path: &Path) -> Option<&CookbookRecord> {
        let wanted = normalize_path(path);
        self.cookbooks.values().find(|record| {
            record.local_path().is_some_and(|recorded| recorded == path)
                || self.resolved_local_path(record).is_some_and(|resolved| resolved == wanted)
        })
    }

    /// Every cookbook reachable from `cookbook_name` through dependency edges.
    ///
    /// Depth-first, first-visit order. Terminates on cycles; a name that is
    /// on an edge but not locked is logged and skipped.
    #[must_use]
    pub fn transitive_dependencies(&self, cookbook_name: &str) -> Vec<CookbookRecord> {
        DependencyGraph::from_registry(self).transitive_dependencies(cookbook_name, self)
    }
}

fn local_source(lock: &RawCookbookLock) -> Option<String> {
    if let Some(source) = &lock.source {
        return Some(source.clone());
    }
    lock.source_options
        .as_ref()
        .and_then(|opts| opts.get("path"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

static EDGE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\(([^)]*)\)\s*$").expect("valid regex"));

fn split_edge_key(key: &str) -> (String, String) {
    match EDGE_KEY.captures(key) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => (key.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE_LOCK: &str = r#"{
        "name": "web-policy",
        "cookbook_locks": {
            "web":   { "version": "1.0.0", "identifier": "aaa111", "source": "../cookbooks/web" },
            "cache": { "version": "2.1.0", "identifier": "bbb222",
                       "origin": "https://supermarket.chef.io/cache", "cache_key": "cache-2.1.0" },
            "redis": { "version": "3.0.0", "identifier": "ccc333",
                       "source_options": { "path": "vendor/redis" } }
        },
        "solution_dependencies": {
            "Policyfile": [["web", ">= 0.0.0"]],
            "dependencies": {
                "web (1.0.0)": [["cache", "~> 2.0"]],
                "cache (2.1.0)": [["redis", ">= 0.0.0"], ["ghost", ">= 1.0"]],
                "redis (3.0.0)": []
            }
        }
    }"#;

    #[test]
    fn test_parse_records() {
        let registry = CookbookRegistry::parse(SAMPLE_LOCK).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.policy_name.as_deref(), Some("web-policy"));

        let web = registry.get("web").unwrap();
        assert!(web.is_local());
        assert_eq!(web.local_path(), Some(Path::new("../cookbooks/web")));
        assert_eq!(web.artifact_dir_name(), "web-aaa111");

        let cache = registry.get("cache").unwrap();
        assert!(!cache.is_local());

        let redis = registry.get("redis").unwrap();
        assert_eq!(redis.local_path(), Some(Path::new("vendor/redis")));
    }

    #[test]
    fn test_parse_edges_resolve_identifiers() {
        let registry = CookbookRegistry::parse(SAMPLE_LOCK).unwrap();
        let edge = registry.edge("cache").unwrap();
        assert_eq!(edge.version, "2.1.0");
        assert_eq!(edge.dependencies.len(), 2);
        assert_eq!(edge.dependencies[0].identifier.as_deref(), Some("ccc333"));
        assert_eq!(edge.dependencies[1].name, "ghost");
        assert_eq!(edge.dependencies[1].identifier, None);
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = CookbookRegistry::parse("{ not json").unwrap_err();
        assert!(matches!(err, CbscanError::MalformedLockFile { .. }));
    }

    #[test]
    fn test_parse_missing_sections() {
        let err = CookbookRegistry::parse(r#"{"cookbook_locks": {}}"#).unwrap_err();
        match err {
            CbscanError::MalformedLockFile { reason, .. } => {
                assert!(reason.contains("solution_dependencies"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = CookbookRegistry::parse(r#"{"solution_dependencies": {}}"#).unwrap_err();
        assert!(err.to_string().contains("Malformed"));
    }

    #[test]
    fn test_lookup_by_path_exact_only() {
        let registry = CookbookRegistry::parse(SAMPLE_LOCK).unwrap();
        assert_eq!(
            registry.lookup_by_path(Path::new("../cookbooks/web")).map(|r| r.name.as_str()),
            Some("web")
        );
        assert!(registry.lookup_by_path(Path::new("../cookbooks/*")).is_none());
        assert!(registry.lookup_by_path(Path::new("../cookbooks")).is_none());
    }

    #[test]
    fn test_lookup_by_resolved_path() {
        let temp = tempfile::tempdir().unwrap();
        let policy_dir = temp.path().join("policies");
        std::fs::create_dir_all(&policy_dir).unwrap();
        let lock_path = policy_dir.join("Policyfile.lock.json");
        std::fs::write(&lock_path, SAMPLE_LOCK).unwrap();

        let registry = CookbookRegistry::load(&lock_path).unwrap();
        let web_dir = temp.path().join("cookbooks").join("web");
        assert_eq!(registry.lookup_by_path(&web_dir).map(|r| r.name.as_str()), Some("web"));
    }

    #[test]
    fn test_transitive_skips_unlocked() {
        let registry = CookbookRegistry::parse(SAMPLE_LOCK).unwrap();
        let names: Vec<_> =
            registry.transitive_dependencies("web").into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["cache", "redis"]);
    }

    #[test]
    fn test_split_edge_key() {
        assert_eq!(split_edge_key("web (1.0.0)"), ("web".to_string(), "1.0.0".to_string()));
        assert_eq!(split_edge_key("plain"), ("plain".to_string(), String::new()));
    }
}
