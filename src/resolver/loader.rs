//! Spec document loading and reference resolution.
//!
//! A spec document may declare `reference`: a path or ordered list of paths
//! to parent documents. The loader resolves references depth-first, deep
//! merging parents in order and the document's own keys last, with cycle
//! detection over the chain of canonical paths. Resolved documents are
//! cached so shared parents are only resolved once per loader.

use std::{
    collections::HashMap,
    fs,
    path::{Component, Path, PathBuf},
};

use moka::sync::Cache;
use serde_json::Value;
use tracing::debug;

use crate::{Result, SpecflowError, resolver::deep_merge};

/// Number of resolved documents to cache per loader.
const DOCUMENT_CACHE_SIZE: u64 = 256;

/// The document key consumed by the resolver.
const REFERENCE_KEY: &str = "reference";

/// Source of spec documents, keyed by path.
///
/// `canonicalize` must map every spelling of the same document to one
/// canonical path; the resolver's cycle detection and cache both key on it.
pub trait DocumentSource: Send + Sync {
    /// Load and parse a document into a generic tree.
    fn load(
        &self,
        path: &Path,
    ) -> Result<Value>;

    /// Resolve a path to its canonical form.
    fn canonicalize(
        &self,
        path: &Path,
    ) -> Result<PathBuf>;
}

/// Filesystem-backed document source. Documents are YAML text (JSON parses
/// as a subset).
#[derive(Debug, Clone, Default)]
pub struct FsSource;

impl DocumentSource for FsSource {
    fn load(
        &self,
        path: &Path,
    ) -> Result<Value> {
        let text = fs::read_to_string(path).map_err(|e| SpecflowError::IoError(format!("failed to read {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text).map_err(|e| SpecflowError::Parse(format!("failed to parse {}: {}", path.display(), e)))
    }

    fn canonicalize(
        &self,
        path: &Path,
    ) -> Result<PathBuf> {
        fs::canonicalize(path).map_err(|e| SpecflowError::IoError(format!("failed to resolve {}: {}", path.display(), e)))
    }
}

/// In-memory document source for tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MemSource {
    docs: HashMap<PathBuf, String>,
}

impl MemSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under a path.
    pub fn insert<P: Into<PathBuf>>(
        &mut self,
        path: P,
        text: &str,
    ) {
        self.docs.insert(normalize(&path.into()), text.to_string());
    }
}

impl DocumentSource for MemSource {
    fn load(
        &self,
        path: &Path,
    ) -> Result<Value> {
        let text = self.docs.get(path).ok_or_else(|| SpecflowError::IoError(format!("document not found: {}", path.display())))?;
        serde_yaml::from_str(text).map_err(|e| SpecflowError::Parse(format!("failed to parse {}: {}", path.display(), e)))
    }

    fn canonicalize(
        &self,
        path: &Path,
    ) -> Result<PathBuf> {
        Ok(normalize(path))
    }
}

/// Lexically normalize a path (resolve `.` and `..` without touching the
/// filesystem).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolves spec documents into one fully merged generic tree.
pub struct SpecLoader<S: DocumentSource> {
    source: S,
    cache: Cache<PathBuf, Value>,
}

impl<S: DocumentSource> SpecLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Cache::new(DOCUMENT_CACHE_SIZE),
        }
    }

    /// Resolve a document and every document it references into one merged
    /// tree.
    pub fn resolve(
        &self,
        path: &Path,
    ) -> Result<Value> {
        let canonical = self.source.canonicalize(path)?;
        let mut chain = Vec::new();
        self.resolve_inner(&canonical, &mut chain)
    }

    fn resolve_inner(
        &self,
        path: &PathBuf,
        chain: &mut Vec<PathBuf>,
    ) -> Result<Value> {
        if chain.contains(path) {
            let mut cycle: Vec<String> = chain.iter().map(|p| p.display().to_string()).collect();
            cycle.push(path.display().to_string());
            return Err(SpecflowError::CircularReference { chain: cycle });
        }

        if let Some(cached) = self.cache.get(path) {
            return Ok(cached);
        }

        chain.push(path.clone());
        debug!(document = %path.display(), depth = chain.len(), "resolving spec document");

        let result = self.resolve_document(path, chain);

        chain.pop();

        let merged = result?;
        self.cache.insert(path.clone(), merged.clone());
        Ok(merged)
    }

    fn resolve_document(
        &self,
        path: &PathBuf,
        chain: &mut Vec<PathBuf>,
    ) -> Result<Value> {
        let document = self.source.load(path)?;
        let Value::Object(mut own) = document else {
            return Err(SpecflowError::Parse(format!("document {} is not a mapping", path.display())));
        };

        let references = match own.remove(REFERENCE_KEY) {
            None => Vec::new(),
            Some(value) => parse_references(path, value)?,
        };

        // Parents merge left to right, the document's own keys last.
        let mut merged = Value::Object(serde_json::Map::new());
        for reference in references {
            let target = self.reference_target(path, &reference)?;
            let parent = self.resolve_inner(&target, chain)?;
            merged = deep_merge(merged, parent)?;
        }
        deep_merge(merged, Value::Object(own))
    }

    /// Resolve a reference path relative to the referencing document.
    fn reference_target(
        &self,
        referrer: &Path,
        reference: &str,
    ) -> Result<PathBuf> {
        let raw = Path::new(reference);
        if raw.is_absolute() {
            return self.source.canonicalize(raw);
        }
        let base = referrer.parent().unwrap_or_else(|| Path::new(""));
        self.source.canonicalize(&base.join(raw))
    }
}

fn parse_references(
    path: &Path,
    value: Value,
) -> Result<Vec<String>> {
    let invalid = |detail: String| SpecflowError::WorkflowReference {
        document: path.display().to_string(),
        detail,
    };

    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(invalid(format!("reference list items must be strings, found {}", other))),
            })
            .collect(),
        other => Err(invalid(format!("reference must be a path or list of paths, found {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn loader_with(docs: &[(&str, &str)]) -> SpecLoader<MemSource> {
        let mut source = MemSource::new();
        for (path, text) in docs {
            source.insert(*path, text);
        }
        SpecLoader::new(source)
    }

    #[test]
    fn test_document_without_references_passes_through() {
        let loader = loader_with(&[("/specs/a.yaml", "version: '1.0'\nruntime: default\n")]);
        let value = loader.resolve(Path::new("/specs/a.yaml")).unwrap();
        assert_eq!(value, json!({"version": "1.0", "runtime": "default"}));
    }

    #[test]
    fn test_single_reference_merges_child_on_top() {
        let loader = loader_with(&[
            ("/specs/base.yaml", "runtime: default\nresources:\n  llm:\n    type: llm\n    model: small\n"),
            ("/specs/child.yaml", "reference: base.yaml\nresources:\n  llm:\n    model: large\n"),
        ]);
        let value = loader.resolve(Path::new("/specs/child.yaml")).unwrap();
        assert_eq!(
            value,
            json!({
                "runtime": "default",
                "resources": {"llm": {"type": "llm", "model": "large"}}
            })
        );
    }

    #[test]
    fn test_reference_list_merges_in_order() {
        let loader = loader_with(&[
            ("/specs/one.yaml", "a: 1\nb: 1\nc: 1\n"),
            ("/specs/two.yaml", "b: 2\nc: 2\n"),
            ("/specs/main.yaml", "reference:\n  - one.yaml\n  - two.yaml\nc: 3\n"),
        ]);
        let value = loader.resolve(Path::new("/specs/main.yaml")).unwrap();
        assert_eq!(value, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_nested_references_resolve_depth_first() {
        let loader = loader_with(&[
            ("/specs/root.yaml", "x: 1\ny: 1\n"),
            ("/specs/mid.yaml", "reference: root.yaml\ny: 2\nz: 2\n"),
            ("/specs/leaf.yaml", "reference: mid.yaml\nz: 3\n"),
        ]);
        let value = loader.resolve(Path::new("/specs/leaf.yaml")).unwrap();
        assert_eq!(value, json!({"x": 1, "y": 2, "z": 3}));
    }

    #[test]
    fn test_relative_reference_uses_referrer_directory() {
        let loader = loader_with(&[
            ("/specs/shared/base.yaml", "shared: true\n"),
            ("/specs/team/child.yaml", "reference: ../shared/base.yaml\nown: 1\n"),
        ]);
        let value = loader.resolve(Path::new("/specs/team/child.yaml")).unwrap();
        assert_eq!(value, json!({"shared": true, "own": 1}));
    }

    #[test]
    fn test_cycle_reports_full_chain() {
        let loader = loader_with(&[
            ("/specs/a.yaml", "reference: b.yaml\n"),
            ("/specs/b.yaml", "reference: a.yaml\n"),
        ]);
        let err = loader.resolve(Path::new("/specs/a.yaml")).unwrap_err();
        match err {
            SpecflowError::CircularReference { chain } => {
                assert!(chain.iter().any(|p| p.ends_with("a.yaml")));
                assert!(chain.iter().any(|p| p.ends_with("b.yaml")));
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let loader = loader_with(&[("/specs/a.yaml", "reference: a.yaml\n")]);
        let err = loader.resolve(Path::new("/specs/a.yaml")).unwrap_err();
        assert!(matches!(err, SpecflowError::CircularReference { .. }));
    }

    #[test]
    fn test_malformed_reference_value() {
        let loader = loader_with(&[("/specs/a.yaml", "reference: 42\n")]);
        let err = loader.resolve(Path::new("/specs/a.yaml")).unwrap_err();
        match err {
            SpecflowError::WorkflowReference { document, .. } => assert!(document.ends_with("a.yaml")),
            other => panic!("unexpected error: {other:?}"),
        }

        let loader = loader_with(&[("/specs/a.yaml", "reference:\n  - ok.yaml\n  - 42\n")]);
        assert!(matches!(loader.resolve(Path::new("/specs/a.yaml")).unwrap_err(), SpecflowError::WorkflowReference { .. }));
    }

    #[test]
    fn test_merge_type_conflict_bubbles_up() {
        let loader = loader_with(&[
            ("/specs/base.yaml", "resources:\n  llm:\n    type: llm\n"),
            ("/specs/child.yaml", "reference: base.yaml\nresources: none\n"),
        ]);
        let err = loader.resolve(Path::new("/specs/child.yaml")).unwrap_err();
        assert!(matches!(err, SpecflowError::MergeType { .. }));
    }

    #[test]
    fn test_shared_parent_resolved_once_via_cache() {
        // Diamond: main -> left -> base, main -> right -> base. The cache
        // makes the second resolution of base a lookup, and the result is
        // still the in-order merge.
        let loader = loader_with(&[
            ("/specs/base.yaml", "v: base\nl: base\nr: base\n"),
            ("/specs/left.yaml", "reference: base.yaml\nl: left\n"),
            ("/specs/right.yaml", "reference: base.yaml\nr: right\n"),
            ("/specs/main.yaml", "reference:\n  - left.yaml\n  - right.yaml\n"),
        ]);
        let value = loader.resolve(Path::new("/specs/main.yaml")).unwrap();
        assert_eq!(value, json!({"v": "base", "l": "left", "r": "right"}));
    }
}
