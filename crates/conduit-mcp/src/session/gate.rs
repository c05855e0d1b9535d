//! Capability Gate
//!
//! Before a session issues a method or notification it checks the
//! negotiated capabilities: outgoing notifications are gated on the
//! sender's own declared capabilities (always enforced), outgoing
//! requests on the remote side's (configurable for back-compat).
//! `ping` and `initialize` require no capability. Violations fail locally
//! without sending anything.

// Layer 3: Internal module imports
use crate::engine::{McpError, McpResult};
use crate::protocol::constants::{methods, notifications};
use crate::protocol::{ClientCapabilities, ServerCapabilities};

/// How strictly remote capabilities are enforced for outgoing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnforcementMode {
    /// Reject requests the remote side did not declare support for
    #[default]
    Strict,
    /// Send regardless; useful against peers with incomplete declarations
    Lax,
}

/// Check a client-side outgoing request against the server's declared
/// capabilities
pub fn check_client_request(
    method: &str,
    server: Option<&ServerCapabilities>,
    mode: EnforcementMode,
) -> McpResult<()> {
    if matches!(method, methods::PING | methods::INITIALIZE) || mode == EnforcementMode::Lax {
        return Ok(());
    }
    let missing = |detail: &str| {
        Err(McpError::capability_not_supported(
            method,
            format!("server did not declare {detail}"),
        ))
    };
    let Some(server) = server else {
        // No capabilities yet: only the handshake methods may pass.
        return missing("any capabilities (not initialized)");
    };
    match method {
        methods::TOOLS_LIST | methods::TOOLS_CALL => {
            if server.tools.is_none() {
                return missing("tools");
            }
        }
        methods::PROMPTS_LIST | methods::PROMPTS_GET => {
            if server.prompts.is_none() {
                return missing("prompts");
            }
        }
        methods::RESOURCES_LIST | methods::RESOURCES_TEMPLATES_LIST | methods::RESOURCES_READ => {
            if server.resources.is_none() {
                return missing("resources");
            }
        }
        methods::RESOURCES_SUBSCRIBE | methods::RESOURCES_UNSUBSCRIBE => {
            let subscribed = server
                .resources
                .as_ref()
                .and_then(|r| r.subscribe)
                .unwrap_or(false);
            if !subscribed {
                return missing("resources.subscribe");
            }
        }
        methods::LOGGING_SET_LEVEL => {
            if server.logging.is_none() {
                return missing("logging");
            }
        }
        methods::COMPLETION_COMPLETE => {
            if server.completions.is_none() {
                return missing("completions");
            }
        }
        // Unknown or experimental methods pass; the server will answer
        // MethodNotFound if it does not implement them.
        _ => {}
    }
    Ok(())
}

/// Check a server-side outgoing request against the client's declared
/// capabilities
pub fn check_server_request(
    method: &str,
    client: Option<&ClientCapabilities>,
    mode: EnforcementMode,
) -> McpResult<()> {
    if method == methods::PING || mode == EnforcementMode::Lax {
        return Ok(());
    }
    let missing = |detail: &str| {
        Err(McpError::capability_not_supported(
            method,
            format!("client did not declare {detail}"),
        ))
    };
    let Some(client) = client else {
        return missing("any capabilities (not initialized)");
    };
    match method {
        methods::SAMPLING_CREATE_MESSAGE => {
            if client.sampling.is_none() {
                return missing("sampling");
            }
        }
        methods::ROOTS_LIST => {
            if client.roots.is_none() {
                return missing("roots");
            }
        }
        _ => {}
    }
    Ok(())
}

/// Check a server-side outgoing notification against the server's own
/// declared capabilities
pub fn check_server_notification(method: &str, own: &ServerCapabilities) -> McpResult<()> {
    let missing = |detail: &str| {
        Err(McpError::capability_not_supported(
            method,
            format!("server did not declare {detail}"),
        ))
    };
    match method {
        notifications::TOOLS_LIST_CHANGED => {
            if !own
                .tools
                .as_ref()
                .and_then(|t| t.list_changed)
                .unwrap_or(false)
            {
                return missing("tools.listChanged");
            }
        }
        notifications::PROMPTS_LIST_CHANGED => {
            if !own
                .prompts
                .as_ref()
                .and_then(|p| p.list_changed)
                .unwrap_or(false)
            {
                return missing("prompts.listChanged");
            }
        }
        notifications::RESOURCES_LIST_CHANGED => {
            if !own
                .resources
                .as_ref()
                .and_then(|r| r.list_changed)
                .unwrap_or(false)
            {
                return missing("resources.listChanged");
            }
        }
        notifications::RESOURCES_UPDATED => {
            if !own
                .resources
                .as_ref()
                .and_then(|r| r.subscribe)
                .unwrap_or(false)
            {
                return missing("resources.subscribe");
            }
        }
        notifications::MESSAGE => {
            if own.logging.is_none() {
                return missing("logging");
            }
        }
        _ => {}
    }
    Ok(())
}

/// Check a client-side outgoing notification against the client's own
/// declared capabilities
pub fn check_client_notification(method: &str, own: &ClientCapabilities) -> McpResult<()> {
    if method == notifications::ROOTS_LIST_CHANGED
        && !own
            .roots
            .as_ref()
            .and_then(|r| r.list_changed)
            .unwrap_or(false)
    {
        return Err(McpError::capability_not_supported(
            method,
            "client did not declare roots.listChanged",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ResourcesCapability, RootsCapability, ToolsCapability};

    fn server_caps() -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn ping_and_initialize_bypass_the_gate() {
        assert!(check_client_request(methods::PING, None, EnforcementMode::Strict).is_ok());
        assert!(check_client_request(methods::INITIALIZE, None, EnforcementMode::Strict).is_ok());
        assert!(check_server_request(methods::PING, None, EnforcementMode::Strict).is_ok());
    }

    #[test]
    fn strict_mode_rejects_undeclared_methods() {
        let caps = server_caps();
        assert!(
            check_client_request(methods::TOOLS_CALL, Some(&caps), EnforcementMode::Strict)
                .is_ok()
        );
        assert!(check_client_request(
            methods::PROMPTS_GET,
            Some(&caps),
            EnforcementMode::Strict
        )
        .is_err());
        assert!(check_client_request(
            methods::RESOURCES_SUBSCRIBE,
            Some(&caps),
            EnforcementMode::Strict
        )
        .is_ok());
    }

    #[test]
    fn lax_mode_allows_everything() {
        assert!(check_client_request(methods::PROMPTS_GET, None, EnforcementMode::Lax).is_ok());
        assert!(
            check_server_request(methods::SAMPLING_CREATE_MESSAGE, None, EnforcementMode::Lax)
                .is_ok()
        );
    }

    #[test]
    fn subscribe_needs_the_sub_capability() {
        let mut caps = server_caps();
        caps.resources = Some(ResourcesCapability {
            subscribe: None,
            list_changed: Some(true),
        });
        assert!(check_client_request(
            methods::RESOURCES_SUBSCRIBE,
            Some(&caps),
            EnforcementMode::Strict
        )
        .is_err());
        assert!(check_client_request(
            methods::RESOURCES_READ,
            Some(&caps),
            EnforcementMode::Strict
        )
        .is_ok());
    }

    #[test]
    fn server_notifications_gated_on_own_capabilities() {
        let caps = server_caps();
        assert!(check_server_notification(notifications::RESOURCES_UPDATED, &caps).is_ok());
        assert!(check_server_notification(notifications::TOOLS_LIST_CHANGED, &caps).is_err());
        assert!(check_server_notification(notifications::PROGRESS, &caps).is_ok());
    }

    #[test]
    fn client_roots_notification_requires_list_changed() {
        let caps = ClientCapabilities {
            roots: Some(RootsCapability {
                list_changed: Some(true),
            }),
            ..Default::default()
        };
        assert!(check_client_notification(notifications::ROOTS_LIST_CHANGED, &caps).is_ok());
        let caps = ClientCapabilities::default();
        assert!(check_client_notification(notifications::ROOTS_LIST_CHANGED, &caps).is_err());
    }
}
