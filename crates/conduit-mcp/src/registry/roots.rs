//! Root Registry
//!
//! Client-owned list of filesystem roots the server may enumerate with
//! `roots/list`. Only `file://` URIs are accepted. Listing preserves
//! insertion order and is not paginated.

// Layer 1: Standard library imports
use std::sync::RwLock;

// Layer 2: Third-party crate imports
use tracing::warn;

// Layer 3: Internal module imports
use crate::engine::{McpError, McpResult};
use crate::protocol::Root;

/// Thread-safe root list
#[derive(Default)]
pub struct RootRegistry {
    roots: RwLock<Vec<Root>>,
}

impl RootRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root
    ///
    /// # Errors
    ///
    /// Rejects URIs that do not start with `file://`. Duplicate URIs
    /// return `Ok(false)`.
    pub fn add(&self, root: Root) -> McpResult<bool> {
        if !root.uri.is_file_uri() {
            return Err(McpError::invalid_params(format!(
                "root uri must start with file://: {}",
                root.uri
            )));
        }
        let mut roots = self
            .roots
            .write()
            .map_err(|_| McpError::internal("root registry lock poisoned"))?;
        if roots.iter().any(|existing| existing.uri == root.uri) {
            warn!(uri = %root.uri, "duplicate root registration ignored");
            return Ok(false);
        }
        roots.push(root);
        Ok(true)
    }

    /// Remove a root by URI; false without side effects when absent
    pub fn remove(&self, uri: &str) -> bool {
        let Ok(mut roots) = self.roots.write() else {
            return false;
        };
        let before = roots.len();
        roots.retain(|root| root.uri.as_str() != uri);
        roots.len() != before
    }

    /// All roots, in insertion order
    pub fn list(&self) -> Vec<Root> {
        self.roots.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of roots
    pub fn len(&self) -> usize {
        self.roots.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Uri;

    #[test]
    fn rejects_non_file_uris() {
        let registry = RootRegistry::new();
        let result = registry.add(Root::new(
            Uri::new("https://example.com/data").unwrap(),
            "web",
        ));
        assert!(matches!(result, Err(McpError::InvalidParams { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn preserves_insertion_order() {
        let registry = RootRegistry::new();
        for name in ["a", "b", "c"] {
            registry
                .add(Root::new(
                    Uri::new(format!("file:///{name}")).unwrap(),
                    name,
                ))
                .unwrap();
        }
        let names: Vec<Option<String>> =
            registry.list().into_iter().map(|root| root.name).collect();
        assert_eq!(
            names,
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("c".to_string())
            ]
        );
    }

    #[test]
    fn duplicate_and_missing_semantics() {
        let registry = RootRegistry::new();
        let root = Root::new(Uri::new("file:///data").unwrap(), "data");
        assert!(registry.add(root.clone()).unwrap());
        assert!(!registry.add(root).unwrap());
        assert!(!registry.remove("file:///other"));
        assert!(registry.remove("file:///data"));
        assert!(registry.is_empty());
    }
}
