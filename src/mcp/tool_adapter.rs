//! Agent-facing tool adapter
//!
//! Wraps each discovered tool as a name-spaced callable so agent runtimes
//! can invoke server tools without knowing about transports or lifecycle.
//!
//! # Tool Namespacing
//!
//! Exposed names combine the server and tool names to avoid conflicts:
//! - Server name: `filesystem`
//! - Original tool name: `read_file`
//! - Exposed name: `filesystem_read_file`

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::instance::ServerInstance;
use super::state::ToolInfo;

/// Result of executing an adapted tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Text output of the tool
    pub content: String,
    /// Whether the server flagged the call as an error
    pub is_error: bool,
    /// Decoded image payload, when the server returned one
    pub image: Option<ImageData>,
}

/// Decoded binary image content
#[derive(Debug, Clone)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ToolOutput {
    /// Create a successful text output
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            image: None,
        }
    }

    /// Create an error output
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            image: None,
        }
    }

    /// Create an image output
    pub fn image(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            is_error: false,
            image: Some(ImageData {
                data,
                mime_type: mime_type.into(),
            }),
        }
    }
}

/// Trait for tools an agent runtime can invoke
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Exposed (name-spaced) tool name
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// JSON schema of the tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given input
    async fn execute(&self, input: Value) -> Result<ToolOutput>;
}

/// Adapter exposing one discovered MCP tool as an [`AgentTool`]
pub struct McpToolAdapter {
    /// Instance that owns the tool
    instance: Arc<ServerInstance>,

    /// Discovery record for the tool
    info: ToolInfo,

    /// Exposed name with namespace (e.g. "filesystem_read_file")
    exposed_name: String,

    /// Description, falling back to a generated one
    description: String,
}

impl McpToolAdapter {
    /// Create an adapter for a discovered tool
    pub fn new(instance: Arc<ServerInstance>, info: ToolInfo) -> Self {
        let exposed_name = format!("{}_{}", info.server_name, info.name);
        let description = info.description.clone().unwrap_or_else(|| {
            format!("Tool '{}' on MCP server '{}'", info.name, info.server_name)
        });
        Self {
            instance,
            info,
            exposed_name,
            description,
        }
    }

    /// Name of the server owning the tool
    pub fn server_name(&self) -> &str {
        &self.info.server_name
    }

    /// Original (un-namespaced) tool name
    pub fn tool_name(&self) -> &str {
        &self.info.name
    }

    /// Convert an MCP call result into a `ToolOutput`
    fn convert_result(&self, result: rmcp::model::CallToolResult) -> Result<ToolOutput> {
        use rmcp::model::RawContent;

        let is_error = result.is_error.unwrap_or(false);

        let mut text_parts = Vec::new();
        for content in result.content {
            match &content.raw {
                RawContent::Text(text) => {
                    text_parts.push(text.text.clone());
                }
                RawContent::Image(image) => {
                    use base64::Engine;
                    let decoded = base64::engine::general_purpose::STANDARD
                        .decode(&image.data)
                        .map_err(|e| anyhow::anyhow!("failed to decode image content: {}", e))?;
                    return Ok(ToolOutput::image(decoded, image.mime_type.clone()));
                }
                RawContent::Resource(resource) => {
                    text_parts.push(serde_json::to_string_pretty(&resource.resource)?);
                }
                _ => {
                    // Audio, resource links and future content kinds go out
                    // as their JSON form
                    text_parts.push(serde_json::to_string_pretty(&content)?);
                }
            }
        }

        let output = text_parts.join("\n\n");
        if is_error {
            Ok(ToolOutput::error(output))
        } else {
            Ok(ToolOutput::success(output))
        }
    }
}

#[async_trait]
impl AgentTool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.exposed_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        tracing::info!(
            "[McpToolAdapter] Executing '{}' on server '{}'",
            self.info.name,
            self.info.server_name
        );

        let arguments = input.as_object().cloned();

        // Call with the original tool name, not the namespaced one
        let result = self.instance.call_tool(&self.info.name, arguments).await?;
        self.convert_result(result)
    }
}
