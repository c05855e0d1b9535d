//! Tool Registry
//!
//! Thread-safe catalog of registered tools keyed by name, with paginated
//! listing and dispatch. Failures *inside* a tool surface as
//! `isError: true` on a successful result; failures finding the tool
//! surface as JSON-RPC errors.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

// Layer 3: Internal module imports
use crate::engine::{McpError, McpResult, RequestContext};
use crate::protocol::{CallToolResponse, Cursor, Tool};
use crate::registry::pagination::{paginate, Page};

/// Executes one registered tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the given arguments
    ///
    /// The context carries the cancellation signal; long-running tools
    /// should observe it at suspension points.
    async fn call(
        &self,
        arguments: Option<Value>,
        context: RequestContext,
    ) -> McpResult<CallToolResponse>;
}

struct RegisteredTool {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

/// Thread-safe tool catalog
///
/// The lock is held only for map operations; handlers execute without it.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<Vec<RegisteredTool>>,
    revision: AtomicU64,
    page_size: Option<usize>,
}

impl ToolRegistry {
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

    /// Register a tool; returns false (with a warning) on duplicate names
    pub fn add(&self, tool: Tool, handler: Arc<dyn ToolHandler>) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if entries.iter().any(|entry| entry.tool.name == tool.name) {
            warn!(name = %tool.name, "duplicate tool registration ignored");
            return false;
        }
        entries.push(RegisteredTool { tool, handler });
        self.revision.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove a tool by name; false without side effects when absent
    pub fn remove(&self, name: &str) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.tool.name != name);
        let removed = entries.len() != before;
        if removed {
            self.revision.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Look up a tool definition by name
    pub fn get(&self, name: &str) -> Option<Tool> {
        self.entries
            .read()
            .ok()?
            .iter()
            .find(|entry| entry.tool.name == name)
            .map(|entry| entry.tool.clone())
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List tools, paginated
    pub fn list(&self, cursor: Option<&Cursor>) -> McpResult<Page<Tool>> {
        let snapshot: Vec<Tool> = self
            .entries
            .read()
            .map_err(|_| McpError::internal("tool registry lock poisoned"))?
            .iter()
            .map(|entry| entry.tool.clone())
            .collect();
        paginate(
            &snapshot,
            cursor,
            self.page_size,
            self.revision.load(Ordering::Relaxed),
        )
    }

    /// Dispatch a call to a registered tool
    ///
    /// # Errors
    ///
    /// `InvalidParams` when no tool with this name exists. Handler
    /// failures do not error; they come back as `isError: true` results.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<Value>,
        context: RequestContext,
    ) -> McpResult<CallToolResponse> {
        let entry = {
            let entries = self
                .entries
                .read()
                .map_err(|_| McpError::internal("tool registry lock poisoned"))?;
            entries
                .iter()
                .find(|entry| entry.tool.name == name)
                .map(|entry| (Arc::clone(&entry.handler), entry.tool.output_schema.is_some()))
        };
        let Some((handler, has_output_schema)) = entry else {
            return Err(McpError::invalid_params(format!("unknown tool: {name}")));
        };

        match handler.call(arguments, context).await {
            Ok(result) => {
                if has_output_schema && !result.is_error() && result.structured_content.is_none() {
                    // The declared contract requires structuredContent;
                    // the caller will reject this result.
                    warn!(tool = name, "tool with outputSchema returned no structuredContent");
                }
                Ok(result)
            }
            Err(error) => Ok(CallToolResponse::error(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, ProtocolEngine};
    use crate::transport::TransportSender;
    use serde_json::json;

    struct AddTool;

    #[async_trait]
    impl ToolHandler for AddTool {
        async fn call(
            &self,
            arguments: Option<Value>,
            _context: RequestContext,
        ) -> McpResult<CallToolResponse> {
            let args = arguments.ok_or_else(|| McpError::invalid_params("missing arguments"))?;
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(CallToolResponse::text(format!("{}", a + b))
                .with_structured(json!({"sum": a + b})))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolHandler for FailingTool {
        async fn call(
            &self,
            _arguments: Option<Value>,
            _context: RequestContext,
        ) -> McpResult<CallToolResponse> {
            Err(McpError::internal("division by zero"))
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
            peer: crate::engine::Peer {
                engine: engine.core(),
                related: None,
            },
        }
    }

    fn add_tool() -> Tool {
        Tool::new(
            "add",
            json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }),
        )
        .with_output_schema(json!({
            "type": "object",
            "properties": {"sum": {"type": "number"}},
            "required": ["sum"]
        }))
    }

    #[tokio::test]
    async fn duplicate_add_returns_false() {
        let registry = ToolRegistry::new();
        assert!(registry.add(add_tool(), Arc::new(AddTool)));
        assert!(!registry.add(add_tool(), Arc::new(AddTool)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remove_missing_is_false_without_side_effects() {
        let registry = ToolRegistry::new();
        registry.add(add_tool(), Arc::new(AddTool));
        assert!(!registry.remove("subtract"));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("add"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn call_returns_structured_content() {
        let registry = ToolRegistry::new();
        registry.add(add_tool(), Arc::new(AddTool));
        let result = registry
            .call("add", Some(json!({"a": 2, "b": 3})), context())
            .await
            .unwrap();
        assert!(!result.is_error());
        assert_eq!(result.structured_content, Some(json!({"sum": 5.0})));
    }

    #[tokio::test]
    async fn handler_error_becomes_is_error_result() {
        let registry = ToolRegistry::new();
        registry.add(Tool::new("fail", json!({"type": "object"})), Arc::new(FailingTool));
        let result = registry.call("fail", None, context()).await.unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn unknown_tool_is_a_dispatch_error() {
        let registry = ToolRegistry::new();
        let result = registry.call("nope", None, context()).await;
        assert!(matches!(result, Err(McpError::InvalidParams { .. })));
    }

    #[tokio::test]
    async fn listing_paginates() {
        let registry = ToolRegistry::with_page_size(2);
        for name in ["a", "b", "c"] {
            registry.add(Tool::new(name, json!({"type": "object"})), Arc::new(AddTool));
        }
        let first = registry.list(None).unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.unwrap();
        let second = registry.list(Some(&cursor)).unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next_cursor.is_none());
    }
}
