//! Provider client abstraction.
//!
//! Every model backend implements [`ProviderClient::send`], normalizing its
//! own payload into [`ProviderResponse`]: either terminal text or one or
//! more tool calls. The agent loop only ever sees this contract.
//!
//! # Module layout
//!
//! - [`anthropic`]: Messages API adapter
//! - [`gemini`]: generateContent adapter
//! - [`scripted`]: deterministic canned responses for tests and dry runs
//! - [`error`]: `ProviderError`, `ProviderResult`

pub mod anthropic;
pub mod error;
pub mod gemini;
pub mod scripted;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::ToolDefinition;
use crate::transcript::{ConversationTurn, ToolCall, TurnRole};

pub use anthropic::AnthropicClient;
pub use error::{ProviderError, ProviderResult};
pub use gemini::GeminiClient;
pub use scripted::{ScriptStep, ScriptedProvider};

/// Sampling parameters forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 4096,
        }
    }
}

/// One model turn request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub transcript: Vec<ConversationTurn>,
    pub tools: Vec<ToolDefinition>,
    pub model: String,
    pub generation: GenerationConfig,
}

impl ProviderRequest {
    /// System turns joined into a single instruction block.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .transcript
            .iter()
            .filter(|t| t.role == TurnRole::System)
            .map(|t| t.content.as_str())
            .filter(|c| !c.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// All turns except system turns, in order.
    pub fn conversation(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.transcript.iter().filter(|t| t.role != TurnRole::System)
    }
}

/// Normalized backend reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderResponse {
    /// The model is done; `text` is its answer.
    Text { text: String },
    /// The model wants tools run before continuing. `calls` is never empty.
    ToolCalls { text: String, calls: Vec<ToolCall> },
}

impl ProviderResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::ToolCalls {
            text: String::new(),
            calls,
        }
    }

    /// Build a response from parsed backend content.
    ///
    /// Adapters call this after decoding so that the "tool calls are never
    /// empty" rule lives in one place.
    pub(crate) fn from_parts(
        provider: &str,
        text: String,
        calls: Vec<ToolCall>,
        expects_tools: bool,
    ) -> ProviderResult<Self> {
        if !calls.is_empty() {
            return Ok(Self::ToolCalls { text, calls });
        }
        if expects_tools {
            return Err(ProviderError::malformed(
                provider,
                "stop reason requested tool use but no tool calls were returned",
            ));
        }
        Ok(Self::Text { text })
    }
}

/// Uniform interface over interchangeable model backends.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse>;
}

/// Named provider clients available to an orchestrator.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own name, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn ProviderClient>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderClient>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
