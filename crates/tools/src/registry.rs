//! Tool trait and registry

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::JSONSchema;

use voxchat_core::ToolDefinition;

use crate::ToolError;

/// A callable tool
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the argument object (`type: object` with `properties`
    /// and `required` at minimum).
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute with validated arguments; returns text for the model.
    async fn invoke(&self, args: serde_json::Value) -> Result<String, ToolError>;
}

struct Registered {
    tool: Arc<dyn Tool>,
    schema: JSONSchema,
}

/// Named tool collection with schema validation at the call boundary
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. The declared schema is compiled once here; a tool
    /// with an uncompilable schema is refused.
    pub fn register(&mut self, tool: impl Tool) {
        let schema_value = tool.parameters_schema();
        match JSONSchema::compile(&schema_value) {
            Ok(schema) => {
                let name = tool.name().to_string();
                tracing::debug!(tool = %name, "registered tool");
                self.tools.insert(
                    name,
                    Registered {
                        tool: Arc::new(tool),
                        schema,
                    },
                );
            }
            Err(e) => {
                tracing::error!(tool = tool.name(), error = %e, "rejected tool with invalid schema");
            }
        }
    }

    /// Definitions advertised to the LLM, in stable name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|r| {
                ToolDefinition::new(
                    r.tool.name(),
                    r.tool.description(),
                    r.tool.parameters_schema(),
                )
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Parse, validate, and invoke.
    ///
    /// `arguments` is the raw JSON text produced by the model; an empty
    /// string counts as `{}`.
    pub async fn invoke(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;

        let raw = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let args: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| ToolError::InvalidArguments(format!("arguments are not JSON: {e}")))?;

        if let Err(errors) = registered.schema.validate(&args) {
            let detail = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ToolError::InvalidArguments(detail));
        }

        registered.tool.invoke(args).await
    }
}
