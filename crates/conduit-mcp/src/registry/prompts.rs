//! Prompt Registry
//!
//! Thread-safe catalog of prompt templates keyed by name. Declared
//! required arguments are checked before dispatch; deeper validation is
//! the handler's responsibility.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tracing::warn;

// Layer 3: Internal module imports
use crate::engine::{McpError, McpResult, RequestContext};
use crate::protocol::{Cursor, GetPromptResponse, Prompt};
use crate::registry::pagination::{paginate, Page};

/// Resolves one registered prompt into messages
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Resolve the prompt with the given argument values
    async fn resolve(
        &self,
        arguments: Option<HashMap<String, String>>,
        context: RequestContext,
    ) -> McpResult<GetPromptResponse>;
}

struct RegisteredPrompt {
    prompt: Prompt,
    handler: Arc<dyn PromptHandler>,
}

/// Thread-safe prompt catalog
#[derive(Default)]
pub struct PromptRegistry {
    entries: RwLock<Vec<RegisteredPrompt>>,
    revision: AtomicU64,
    page_size: Option<usize>,
}

impl PromptRegistry {
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

    /// Register a prompt; returns false (with a warning) on duplicates
    pub fn add(&self, prompt: Prompt, handler: Arc<dyn PromptHandler>) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if entries.iter().any(|entry| entry.prompt.name == prompt.name) {
            warn!(name = %prompt.name, "duplicate prompt registration ignored");
            return false;
        }
        entries.push(RegisteredPrompt { prompt, handler });
        self.revision.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove a prompt by name; false without side effects when absent
    pub fn remove(&self, name: &str) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.prompt.name != name);
        let removed = entries.len() != before;
        if removed {
            self.revision.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Look up a prompt definition by name
    pub fn get(&self, name: &str) -> Option<Prompt> {
        self.entries
            .read()
            .ok()?
            .iter()
            .find(|entry| entry.prompt.name == name)
            .map(|entry| entry.prompt.clone())
    }

    /// Number of registered prompts
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List prompts, paginated
    pub fn list(&self, cursor: Option<&Cursor>) -> McpResult<Page<Prompt>> {
        let snapshot: Vec<Prompt> = self
            .entries
            .read()
            .map_err(|_| McpError::internal("prompt registry lock poisoned"))?
            .iter()
            .map(|entry| entry.prompt.clone())
            .collect();
        paginate(
            &snapshot,
            cursor,
            self.page_size,
            self.revision.load(Ordering::Relaxed),
        )
    }

    /// Resolve a prompt by name
    ///
    /// # Errors
    ///
    /// `InvalidParams` when the prompt does not exist or a declared
    /// required argument is missing.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
        context: RequestContext,
    ) -> McpResult<GetPromptResponse> {
        let entry = {
            let entries = self
                .entries
                .read()
                .map_err(|_| McpError::internal("prompt registry lock poisoned"))?;
            entries
                .iter()
                .find(|entry| entry.prompt.name == name)
                .map(|entry| (entry.prompt.clone(), Arc::clone(&entry.handler)))
        };
        let Some((prompt, handler)) = entry else {
            return Err(McpError::invalid_params(format!("unknown prompt: {name}")));
        };

        if let Some(declared) = &prompt.arguments {
            for argument in declared {
                if argument.required == Some(true)
                    && !arguments
                        .as_ref()
                        .is_some_and(|args| args.contains_key(&argument.name))
                {
                    return Err(McpError::invalid_params(format!(
                        "missing required argument: {}",
                        argument.name
                    )));
                }
            }
        }

        handler.resolve(arguments, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, Peer, ProtocolEngine};
    use crate::protocol::{Content, PromptArgument, PromptMessage};
    use crate::transport::TransportSender;

    struct GreetPrompt;

    #[async_trait]
    impl PromptHandler for GreetPrompt {
        async fn resolve(
            &self,
            arguments: Option<HashMap<String, String>>,
            _context: RequestContext,
        ) -> McpResult<GetPromptResponse> {
            let name = arguments
                .and_then(|args| args.get("name").cloned())
                .unwrap_or_default();
            Ok(GetPromptResponse {
                description: None,
                messages: vec![PromptMessage::user(Content::text(format!("Hello {name}")))],
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

    fn greet() -> Prompt {
        Prompt::new("greet").with_arguments(vec![PromptArgument::required("name")])
    }

    #[tokio::test]
    async fn resolves_with_arguments() {
        let registry = PromptRegistry::new();
        registry.add(greet(), Arc::new(GreetPrompt));
        let mut args = HashMap::new();
        args.insert("name".to_string(), "Ada".to_string());
        let result = registry
            .get_prompt("greet", Some(args), context())
            .await
            .unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].content.as_text(), Some("Hello Ada"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_invalid_params() {
        let registry = PromptRegistry::new();
        registry.add(greet(), Arc::new(GreetPrompt));
        let result = registry.get_prompt("greet", None, context()).await;
        assert!(matches!(result, Err(McpError::InvalidParams { .. })));
    }

    #[tokio::test]
    async fn unknown_prompt_is_invalid_params() {
        let registry = PromptRegistry::new();
        let result = registry.get_prompt("nope", None, context()).await;
        assert!(matches!(result, Err(McpError::InvalidParams { .. })));
    }

    #[tokio::test]
    async fn duplicates_rejected() {
        let registry = PromptRegistry::new();
        assert!(registry.add(greet(), Arc::new(GreetPrompt)));
        assert!(!registry.add(greet(), Arc::new(GreetPrompt)));
    }
}
