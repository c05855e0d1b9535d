//! Resource Registry
//!
//! Two indices: concrete resources keyed by URI and templated resources
//! keyed by their template string. A read resolves against the concrete
//! index first, then walks templates in insertion order; the first match
//! wins. Subscriptions are tracked per URI as a set of connection ids.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tracing::warn;

// Layer 3: Internal module imports
use crate::engine::{McpError, McpResult, RequestContext};
use crate::protocol::{Cursor, ReadResourceResponse, Resource, ResourceTemplate, Uri};
use crate::registry::pagination::{paginate, Page};
use crate::registry::uri_template::UriTemplate;

/// Produces the contents of one resource (concrete or template-matched)
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource
    ///
    /// For template-matched reads `variables` carries the extracted
    /// bindings; for concrete reads it is empty.
    async fn read(
        &self,
        uri: &Uri,
        variables: &HashMap<String, String>,
        context: RequestContext,
    ) -> McpResult<ReadResourceResponse>;
}

struct RegisteredResource {
    resource: Resource,
    handler: Arc<dyn ResourceHandler>,
}

struct RegisteredTemplate {
    template: ResourceTemplate,
    matcher: UriTemplate,
    handler: Arc<dyn ResourceHandler>,
}

/// Connection id used by single-connection transports
pub const LOCAL_CONNECTION: &str = "local";

/// Thread-safe resource catalog with template matching and subscriptions
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<Vec<RegisteredResource>>,
    templates: RwLock<Vec<RegisteredTemplate>>,
    subscriptions: RwLock<HashMap<String, HashSet<String>>>,
    revision: AtomicU64,
    page_size: Option<usize>,
}

impl ResourceRegistry {
    /// Create an empty registry that lists everything in one page
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that paginates listings
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size),
            ..Default::default()
        }
    }

    /// Register a concrete resource; false (with a warning) on duplicates
    pub fn add(&self, resource: Resource, handler: Arc<dyn ResourceHandler>) -> bool {
        let Ok(mut resources) = self.resources.write() else {
            return false;
        };
        if resources
            .iter()
            .any(|entry| entry.resource.uri == resource.uri)
        {
            warn!(uri = %resource.uri, "duplicate resource registration ignored");
            return false;
        }
        resources.push(RegisteredResource { resource, handler });
        self.revision.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Register a templated resource
    ///
    /// # Errors
    ///
    /// Fails when the template string does not compile. Duplicate template
    /// strings return `Ok(false)`.
    pub fn add_template(
        &self,
        template: ResourceTemplate,
        handler: Arc<dyn ResourceHandler>,
    ) -> McpResult<bool> {
        let matcher = UriTemplate::parse(&template.uri_template)
            .map_err(|e| McpError::invalid_params(e.to_string()))?;
        let mut templates = self
            .templates
            .write()
            .map_err(|_| McpError::internal("resource registry lock poisoned"))?;
        if templates
            .iter()
            .any(|entry| entry.template.uri_template == template.uri_template)
        {
            warn!(template = %template.uri_template, "duplicate template registration ignored");
            return Ok(false);
        }
        templates.push(RegisteredTemplate {
            template,
            matcher,
            handler,
        });
        self.revision.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Remove a concrete resource; false without side effects when absent
    pub fn remove(&self, uri: &str) -> bool {
        let Ok(mut resources) = self.resources.write() else {
            return false;
        };
        let before = resources.len();
        resources.retain(|entry| entry.resource.uri.as_str() != uri);
        let removed = resources.len() != before;
        if removed {
            self.revision.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove a templated resource by template string
    pub fn remove_template(&self, uri_template: &str) -> bool {
        let Ok(mut templates) = self.templates.write() else {
            return false;
        };
        let before = templates.len();
        templates.retain(|entry| entry.template.uri_template != uri_template);
        let removed = templates.len() != before;
        if removed {
            self.revision.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Look up a concrete resource definition
    pub fn get(&self, uri: &str) -> Option<Resource> {
        self.resources
            .read()
            .ok()?
            .iter()
            .find(|entry| entry.resource.uri.as_str() == uri)
            .map(|entry| entry.resource.clone())
    }

    /// Number of concrete resources
    pub fn len(&self) -> usize {
        self.resources.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether no concrete resources are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List concrete resources, paginated
    pub fn list(&self, cursor: Option<&Cursor>) -> McpResult<Page<Resource>> {
        let snapshot: Vec<Resource> = self
            .resources
            .read()
            .map_err(|_| McpError::internal("resource registry lock poisoned"))?
            .iter()
            .map(|entry| entry.resource.clone())
            .collect();
        paginate(
            &snapshot,
            cursor,
            self.page_size,
            self.revision.load(Ordering::Relaxed),
        )
    }

    /// List resource templates, paginated
    pub fn list_templates(&self, cursor: Option<&Cursor>) -> McpResult<Page<ResourceTemplate>> {
        let snapshot: Vec<ResourceTemplate> = self
            .templates
            .read()
            .map_err(|_| McpError::internal("resource registry lock poisoned"))?
            .iter()
            .map(|entry| entry.template.clone())
            .collect();
        paginate(
            &snapshot,
            cursor,
            self.page_size,
            self.revision.load(Ordering::Relaxed),
        )
    }

    /// Read a resource: concrete index first, then templates in insertion
    /// order
    ///
    /// # Errors
    ///
    /// `InvalidParams` when neither path resolves the URI.
    pub async fn read(&self, uri: &Uri, context: RequestContext) -> McpResult<ReadResourceResponse> {
        let concrete = {
            let resources = self
                .resources
                .read()
                .map_err(|_| McpError::internal("resource registry lock poisoned"))?;
            resources
                .iter()
                .find(|entry| entry.resource.uri == *uri)
                .map(|entry| Arc::clone(&entry.handler))
        };
        if let Some(handler) = concrete {
            return handler.read(uri, &HashMap::new(), context).await;
        }

        let templated = {
            let templates = self
                .templates
                .read()
                .map_err(|_| McpError::internal("resource registry lock poisoned"))?;
            templates.iter().find_map(|entry| {
                entry
                    .matcher
                    .matches(uri.as_str())
                    .map(|bindings| (Arc::clone(&entry.handler), bindings))
            })
        };
        if let Some((handler, bindings)) = templated {
            return handler.read(uri, &bindings, context).await;
        }

        Err(McpError::invalid_params(format!(
            "resource not found: {uri}"
        )))
    }

    // -- subscriptions -------------------------------------------------------

    /// Record a subscription; idempotent
    pub fn subscribe(&self, uri: &str, connection_id: &str) {
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            subscriptions
                .entry(uri.to_string())
                .or_default()
                .insert(connection_id.to_string());
        }
    }

    /// Drop a subscription; success even when none existed
    pub fn unsubscribe(&self, uri: &str, connection_id: &str) {
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            if let Some(connections) = subscriptions.get_mut(uri) {
                connections.remove(connection_id);
                if connections.is_empty() {
                    subscriptions.remove(uri);
                }
            }
        }
    }

    /// Connection ids currently subscribed to a URI
    pub fn subscribers(&self, uri: &str) -> Vec<String> {
        self.subscriptions
            .read()
            .ok()
            .and_then(|subscriptions| {
                subscriptions
                    .get(uri)
                    .map(|connections| connections.iter().cloned().collect())
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, Peer, ProtocolEngine};
    use crate::protocol::ResourceContents;
    use crate::transport::TransportSender;

    struct StaticResource(String);

    #[async_trait]
    impl ResourceHandler for StaticResource {
        async fn read(
            &self,
            uri: &Uri,
            _variables: &HashMap<String, String>,
            _context: RequestContext,
        ) -> McpResult<ReadResourceResponse> {
            Ok(ReadResourceResponse {
                contents: vec![ResourceContents::text(uri.clone(), self.0.clone())],
            })
        }
    }

    struct ProfileResource;

    #[async_trait]
    impl ResourceHandler for ProfileResource {
        async fn read(
            &self,
            uri: &Uri,
            variables: &HashMap<String, String>,
            _context: RequestContext,
        ) -> McpResult<ReadResourceResponse> {
            let user = variables.get("userId").cloned().unwrap_or_default();
            Ok(ReadResourceResponse {
                contents: vec![ResourceContents::text(
                    uri.clone(),
                    format!("profile of {user}"),
                )],
            })
        }
    }

    fn context() -> RequestContext {
        let engine = ProtocolEngine::new(TransportSender::unbound(), EngineConfig::default());
        RequestContext {
            request_id: crate::protocol::RequestId::Number(1),
            session_id: None,
            meta: None,
            progress_token: None,
            cancellation: tokio_util::sync::CancellationToken::new(),
            peer: Peer {
                engine: engine.core(),
                related: None,
            },
        }
    }

    #[tokio::test]
    async fn concrete_read_wins_over_templates() {
        let registry = ResourceRegistry::new();
        registry
            .add_template(
                ResourceTemplate::new("users://{userId}/profile", "profiles"),
                Arc::new(ProfileResource),
            )
            .unwrap();
        let uri = Uri::new("users://42/profile").unwrap();
        registry.add(
            Resource::new(uri.clone(), "answer"),
            Arc::new(StaticResource("fixed".to_string())),
        );

        let result = registry.read(&uri, context()).await.unwrap();
        match &result.contents[0] {
            ResourceContents::Text { text, .. } => assert_eq!(text, "fixed"),
            other => panic!("unexpected contents: {other:?}"),
        }
    }

    #[tokio::test]
    async fn template_read_extracts_variables() {
        let registry = ResourceRegistry::new();
        registry
            .add_template(
                ResourceTemplate::new("users://{userId}/profile", "profiles"),
                Arc::new(ProfileResource),
            )
            .unwrap();

        let uri = Uri::new("users://42/profile").unwrap();
        let result = registry.read(&uri, context()).await.unwrap();
        match &result.contents[0] {
            ResourceContents::Text { text, .. } => assert_eq!(text, "profile of 42"),
            other => panic!("unexpected contents: {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_inserted_template_wins() {
        let registry = ResourceRegistry::new();
        registry
            .add_template(
                ResourceTemplate::new("users://{userId}/profile", "first"),
                Arc::new(StaticResource("first".to_string())),
            )
            .unwrap();
        registry
            .add_template(
                ResourceTemplate::new("users://{other}/profile", "second"),
                Arc::new(StaticResource("second".to_string())),
            )
            .unwrap();

        let uri = Uri::new("users://42/profile").unwrap();
        let result = registry.read(&uri, context()).await.unwrap();
        match &result.contents[0] {
            ResourceContents::Text { text, .. } => assert_eq!(text, "first"),
            other => panic!("unexpected contents: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresolved_uri_is_an_error() {
        let registry = ResourceRegistry::new();
        let uri = Uri::new("users://42/settings").unwrap();
        let result = registry.read(&uri, context()).await;
        assert!(matches!(result, Err(McpError::InvalidParams { .. })));
    }

    #[test]
    fn subscriptions_are_idempotent() {
        let registry = ResourceRegistry::new();
        registry.subscribe("file:///data.txt", LOCAL_CONNECTION);
        registry.subscribe("file:///data.txt", LOCAL_CONNECTION);
        assert_eq!(registry.subscribers("file:///data.txt").len(), 1);

        registry.unsubscribe("file:///data.txt", LOCAL_CONNECTION);
        assert!(registry.subscribers("file:///data.txt").is_empty());
        // Unsubscribe of a non-subscribed uri succeeds silently.
        registry.unsubscribe("file:///data.txt", LOCAL_CONNECTION);
    }
}
