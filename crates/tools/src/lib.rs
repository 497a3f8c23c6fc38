//! Tools for the voxchat brain
//!
//! A `Tool` exposes a name, a description, a JSON-Schema parameter surface,
//! and an `invoke` returning text. The registry validates arguments against
//! the declared schema before invocation; schema violations and unknown
//! tools become error results, never turn aborts.

pub mod calculator;
pub mod clock;
pub mod registry;
pub mod search;
pub mod webpage;

pub use calculator::CalculatorTool;
pub use clock::ClockTool;
pub use registry::{Tool, ToolRegistry};
pub use search::WebSearchTool;
pub use webpage::WebPageTool;

use thiserror::Error;

/// Tool errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

impl From<ToolError> for voxchat_core::Error {
    fn from(err: ToolError) -> Self {
        voxchat_core::Error::Tool(err.to_string())
    }
}

/// Build the default registry for a session.
///
/// The web-search tool is registered only when a Serper credential is
/// available.
pub fn create_default_registry(serper_api_key: Option<&str>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CalculatorTool::new());
    registry.register(ClockTool::new());
    registry.register(WebPageTool::new());
    if let Some(key) = serper_api_key {
        if !key.trim().is_empty() {
            registry.register(WebSearchTool::new(key));
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_without_credentials() {
        let registry = create_default_registry(None);
        let names: Vec<_> = registry
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert!(names.contains(&"calculator".to_string()));
        assert!(names.contains(&"time".to_string()));
        assert!(names.contains(&"fetch_page".to_string()));
        assert!(!names.contains(&"web_search".to_string()));
    }

    #[test]
    fn test_search_registered_with_key() {
        let registry = create_default_registry(Some("serper-key"));
        assert!(registry
            .definitions()
            .iter()
            .any(|d| d.name == "web_search"));
    }
}
