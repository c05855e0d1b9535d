//! MCP Protocol Constants
//!
//! Method names, notification names, canonical error codes, protocol
//! version strings, and default tuning values.

/// MCP protocol method names
pub mod methods {
    /// Initialization handshake request
    pub const INITIALIZE: &str = "initialize";
    /// Connectivity test, answered by either side without capabilities
    pub const PING: &str = "ping";

    /// Tool-related methods
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";

    /// Prompt-related methods
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";

    /// Resource-related methods
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

    /// Logging control
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

    /// Argument autocompletion
    pub const COMPLETION_COMPLETE: &str = "completion/complete";

    /// Server-initiated LLM sampling
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";

    /// Server-initiated enumeration of client roots
    pub const ROOTS_LIST: &str = "roots/list";
}

/// MCP notification names
pub mod notifications {
    /// Client signals the handshake is complete
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Either side aborts an in-flight request
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Progress report correlated by progress token
    pub const PROGRESS: &str = "notifications/progress";
    /// Server-emitted log record
    pub const MESSAGE: &str = "notifications/message";

    /// List-changed notifications
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

    /// Subscription delivery for a mutated resource
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
}

/// JSON-RPC and MCP error codes
pub mod error_codes {
    /// Parse error - invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;

    /// Invalid Request - the JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;

    /// Method not found - the method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;

    /// Invalid params - invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;

    /// Internal error - unhandled fault while processing a request
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Transport closed while a request was pending
    pub const CONNECTION_CLOSED: i32 = -32000;

    /// Per-request or total timeout elapsed
    pub const REQUEST_TIMEOUT: i32 = -32001;
}

/// Protocol version strings, newest first
pub mod versions {
    /// Latest protocol revision this implementation speaks
    pub const LATEST: &str = "2025-03-26";

    /// All revisions this implementation accepts
    pub const SUPPORTED: &[&str] = &["2025-03-26", "2024-11-05", "2024-10-07"];
}

/// Default values for protocol behavior
pub mod defaults {
    /// Default per-request timeout in milliseconds
    pub const REQUEST_TIMEOUT_MS: u64 = 60_000;

    /// How often the pending-request table sweeps for expired entries,
    /// in milliseconds
    pub const EXPIRY_SWEEP_INTERVAL_MS: u64 = 100;

    /// Largest frame a stream transport will buffer before erroring (4 MiB)
    pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

    /// Default HTTP endpoint path for the streamable HTTP transport
    pub const HTTP_PATH: &str = "/mcp";

    /// Default client name used when none is configured
    pub const CLIENT_NAME: &str = "conduit-mcp-client";

    /// Default server name used when none is configured
    pub const SERVER_NAME: &str = "conduit-mcp-server";
}
