//! Feature Registries
//!
//! Thread-safe catalogs a server session exposes over the wire: tools,
//! prompts, resources (concrete and templated, with subscriptions), and
//! the client-side roots list. Each registry takes one lock per map
//! operation; registered handlers always execute with no registry lock
//! held.

pub mod pagination;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod tools;
pub mod uri_template;

pub use pagination::Page;
pub use prompts::{PromptHandler, PromptRegistry};
pub use resources::{ResourceHandler, ResourceRegistry, LOCAL_CONNECTION};
pub use roots::RootRegistry;
pub use tools::{ToolHandler, ToolRegistry};
pub use uri_template::UriTemplate;
