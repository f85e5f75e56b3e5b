//! Error types for the tool registry.

/// Failures raised at the registry boundary.
///
/// `DuplicateTool` and `UnknownTool` are configuration faults when they occur
/// at registration or agent construction. `InvalidArguments` and `Execution`
/// are recoverable: the agent loop feeds them back to the model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("duplicate tool registration: {tool_name}")]
    DuplicateTool { tool_name: String },

    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("invalid arguments for tool '{tool_name}': {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("tool '{tool_name}' failed: {cause}")]
    Execution { tool_name: String, cause: String },

    #[error("invalid schema for tool '{tool_name}': {reason}")]
    InvalidSchema { tool_name: String, reason: String },
}

impl ToolError {
    /// Stable snake_case code used in logs and results.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::DuplicateTool { .. } => "duplicate_tool",
            ToolError::UnknownTool { .. } => "unknown_tool",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
            ToolError::Execution { .. } => "tool_execution",
            ToolError::InvalidSchema { .. } => "invalid_schema",
        }
    }
}

/// Result type for registry operations.
pub type ToolResult<T> = std::result::Result<T, ToolError>;
