//! Tool registry.
//!
//! A [`Tool`] couples an immutable [`ToolSpec`] (name, description, input
//! schema, approval flag, category) with an opaque async [`ToolHandler`].
//! The [`ToolRegistry`] keeps tools in registration order, validates
//! arguments at its boundary, and converts handler failures into
//! [`ToolError::Execution`].
//!
//! # Module layout
//!
//! - [`schema`]: `ToolSchema`, `PropertyType`, `ValidatedArgs`
//! - [`error`]: `ToolError`, `ToolResult`

pub mod error;
pub mod schema;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub use error::{ToolError, ToolResult};
pub use schema::{PropertyType, SchemaViolation, ToolSchema, ValidatedArgs};

/// Category tag attached to every tool.
///
/// Only [`ToolCategory::Critical`] matters to hybrid execution mode; the
/// rest are descriptive and usable as `list` filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    ReadOnly,
    Documentation,
    IssueTracking,
    CodeChange,
    Testing,
    Critical,
    Custom(String),
}

impl ToolCategory {
    pub fn is_critical(&self) -> bool {
        matches!(self, ToolCategory::Critical)
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCategory::ReadOnly => f.write_str("read_only"),
            ToolCategory::Documentation => f.write_str("documentation"),
            ToolCategory::IssueTracking => f.write_str("issue_tracking"),
            ToolCategory::CodeChange => f.write_str("code_change"),
            ToolCategory::Testing => f.write_str("testing"),
            ToolCategory::Critical => f.write_str("critical"),
            ToolCategory::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// Descriptive half of a tool. Never carries the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: ToolSchema,
    pub requires_approval: bool,
    pub category: ToolCategory,
}

impl ToolSpec {
    /// The provider-facing definition (name, description, schema).
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.to_json(),
        }
    }
}

/// What a model backend is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Handler contract: receives validated arguments, returns structured output.
///
/// Any error returned here is surfaced as [`ToolError::Execution`]. Handlers
/// own their own I/O, timeouts and cancellation.
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn call(&self, args: ValidatedArgs) -> anyhow::Result<Value>;
}

/// Adapter that lets an async closure act as a [`ToolHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ValidatedArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ValidatedArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, args: ValidatedArgs) -> anyhow::Result<Value> {
        (self.f)(args).await
    }
}

/// A registered capability: spec plus handler.
#[derive(Clone)]
pub struct Tool {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(spec: ToolSpec, handler: impl ToolHandler) -> Self {
        Self {
            spec,
            handler: Arc::new(handler),
        }
    }

    /// Start building a tool named `name`.
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder {
            name: name.into(),
            description: String::new(),
            input_schema: ToolSchema::object(),
            requires_approval: false,
            category: ToolCategory::ReadOnly,
        }
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn requires_approval(&self) -> bool {
        self.spec.requires_approval
    }

    pub fn category(&self) -> &ToolCategory {
        &self.spec.category
    }
}

impl PartialEq for Tool {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec && Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool").field("spec", &self.spec).finish_non_exhaustive()
    }
}

/// Builder for [`Tool`].
#[derive(Debug, Clone)]
pub struct ToolBuilder {
    name: String,
    description: String,
    input_schema: ToolSchema,
    requires_approval: bool,
    category: ToolCategory,
}

impl ToolBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn schema(mut self, schema: ToolSchema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn requires_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    pub fn category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    pub fn handler(self, handler: impl ToolHandler) -> Tool {
        Tool::new(
            ToolSpec {
                name: self.name,
                description: self.description,
                input_schema: self.input_schema,
                requires_approval: self.requires_approval,
                category: self.category,
            },
            handler,
        )
    }
}

/// Output of a successful handler call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionReport {
    pub tool_name: String,
    pub output: Value,
    pub duration_ms: u64,
}

/// Registration-ordered tool catalog.
///
/// Read-mostly: share it behind an `Arc` once built. Registration needs
/// `&mut self`, so concurrent mutation is ruled out at compile time.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Tool) -> ToolResult<()> {
        if self.index.contains_key(tool.name()) {
            return Err(ToolError::DuplicateTool {
                tool_name: tool.name().to_string(),
            });
        }
        debug!(tool = %tool.name(), category = %tool.category(), "tool registered");
        self.index.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> ToolResult<Arc<Tool>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i]))
            .ok_or_else(|| ToolError::UnknownTool {
                tool_name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tools in registration order, optionally restricted to one category.
    pub fn list(&self, category: Option<&ToolCategory>) -> Vec<Arc<Tool>> {
        self.tools
            .iter()
            .filter(|t| category.map_or(true, |c| t.category() == c))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Provider-facing definitions for an allowed subset, in the subset's order.
    pub fn specs_for(&self, allowed: &[String]) -> ToolResult<Vec<ToolDefinition>> {
        allowed
            .iter()
            .map(|name| self.get(name).map(|t| t.spec().definition()))
            .collect()
    }

    /// Validate `arguments` and run the tool's handler.
    pub async fn execute(&self, name: &str, arguments: &Value) -> ToolResult<ToolExecutionReport> {
        let tool = self.get(name)?;
        let values = tool
            .spec
            .input_schema
            .validate(arguments)
            .map_err(|violation| ToolError::InvalidArguments {
                tool_name: name.to_string(),
                reason: violation.to_string(),
            })?;

        let started = Instant::now();
        let output = tool
            .handler
            .call(ValidatedArgs::new(name, values))
            .await
            .map_err(|e| ToolError::Execution {
                tool_name: name.to_string(),
                cause: format!("{e:#}"),
            })?;

        Ok(ToolExecutionReport {
            tool_name: name.to_string(),
            output,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &str, category: ToolCategory) -> Tool {
        Tool::builder(name)
            .description("echo the message back")
            .schema(ToolSchema::object().required("message", PropertyType::String, ""))
            .category(category)
            .handler(handler_fn(|args: ValidatedArgs| async move {
                Ok::<_, anyhow::Error>(json!({ "echo": args.str("message")? }))
            }))
    }

    #[test]
    fn list_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(echo_tool(name, ToolCategory::ReadOnly)).unwrap();
        }
        let names: Vec<String> = registry
            .list(None)
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn list_filters_by_category() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("a", ToolCategory::ReadOnly)).unwrap();
        registry.register(echo_tool("b", ToolCategory::Critical)).unwrap();
        registry.register(echo_tool("c", ToolCategory::Critical)).unwrap();
        let critical = registry.list(Some(&ToolCategory::Critical));
        assert_eq!(critical.len(), 2);
        assert!(critical.iter().all(|t| t.category().is_critical()));
    }

    #[test]
    fn specs_for_rejects_unknown_names() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("a", ToolCategory::ReadOnly)).unwrap();
        let err = registry
            .specs_for(&["a".to_string(), "nope".to_string()])
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::UnknownTool {
                tool_name: "nope".into()
            }
        );
    }

    #[tokio::test]
    async fn execute_runs_handler_with_validated_args() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("echo", ToolCategory::ReadOnly)).unwrap();
        let report = registry
            .execute("echo", &json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(report.output, json!({"echo": "hi"}));
        assert_eq!(report.tool_name, "echo");
    }

    #[tokio::test]
    async fn execute_maps_handler_error() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Tool::builder("boom").handler(handler_fn(|_args| async {
                Err::<Value, _>(anyhow::anyhow!("disk full"))
            })))
            .unwrap();
        let err = registry.execute("boom", &json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ToolError::Execution {
                tool_name: "boom".into(),
                cause: "disk full".into()
            }
        );
    }
}
