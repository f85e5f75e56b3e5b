//! Anthropic Messages API adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ProviderClient, ProviderError, ProviderRequest, ProviderResponse, ProviderResult};
use crate::transcript::{ConversationTurn, ToolCall, TurnRole};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured {
                provider: PROVIDER.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Read the key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            ProviderError::NotConfigured {
                provider: PROVIDER.to_string(),
                message: "ANTHROPIC_API_KEY environment variable not set".to_string(),
            }
        })?;
        Self::new(api_key)
    }

    /// Point the client at a proxy or a local mock.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn to_wire(turn: &ConversationTurn) -> Option<WireMessage> {
    match turn.role {
        TurnRole::System => None,
        TurnRole::User => Some(WireMessage {
            role: "user",
            content: vec![WireBlock::Text {
                text: turn.content.clone(),
            }],
        }),
        TurnRole::Assistant => {
            let mut content = Vec::new();
            if !turn.content.is_empty() {
                content.push(WireBlock::Text {
                    text: turn.content.clone(),
                });
            }
            content.extend(turn.tool_calls.iter().map(|c| WireBlock::ToolUse {
                id: c.id.clone(),
                name: c.name.clone(),
                input: c.arguments.clone(),
            }));
            Some(WireMessage {
                role: "assistant",
                content,
            })
        }
        // Tool results travel back as a user message of tool_result blocks.
        TurnRole::Tool => Some(WireMessage {
            role: "user",
            content: turn
                .tool_results
                .iter()
                .map(|r| WireBlock::ToolResult {
                    tool_use_id: r.call_id.clone(),
                    content: r.content.clone(),
                    is_error: r.is_error,
                })
                .collect(),
        }),
    }
}

fn from_wire(response: MessagesResponse) -> ProviderResult<ProviderResponse> {
    let mut text = String::new();
    let mut calls = Vec::new();
    for block in response.content {
        match block {
            WireBlock::Text { text: t } => text.push_str(&t),
            WireBlock::ToolUse { id, name, input } => calls.push(ToolCall {
                id,
                name,
                arguments: input,
            }),
            WireBlock::ToolResult { .. } => {
                return Err(ProviderError::malformed(
                    PROVIDER,
                    "response contained a tool_result block",
                ))
            }
        }
    }
    let expects_tools = response.stop_reason.as_deref() == Some("tool_use");
    ProviderResponse::from_parts(PROVIDER, text, calls, expects_tools)
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn send(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        let body = MessagesRequest {
            model: &request.model,
            messages: request.conversation().filter_map(to_wire).collect(),
            system: request.system_prompt(),
            temperature: request.generation.temperature,
            max_tokens: request.generation.max_tokens,
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(PROVIDER, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(ProviderError::from_status(PROVIDER, status.as_u16(), message));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, format!("undecodable body: {e}")))?;
        from_wire(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ToolResultRecord;
    use serde_json::json;

    #[test]
    fn tool_turn_becomes_user_tool_results() {
        let call = ToolCall {
            id: "toolu_1".into(),
            name: "run_tests".into(),
            arguments: json!({}),
        };
        let turn = ConversationTurn::tool_results(vec![ToolResultRecord::error(&call, "denied")]);
        let wire = serde_json::to_value(to_wire(&turn).unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": "toolu_1",
                    "content": "denied",
                    "is_error": true
                }]
            })
        );
    }

    #[test]
    fn system_turns_are_not_messages() {
        assert!(to_wire(&ConversationTurn::system("rules")).is_none());
    }

    #[test]
    fn tool_use_response_maps_to_tool_calls() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Running tests."},
                {"type": "tool_use", "id": "toolu_9", "name": "run_tests", "input": {"suite": "unit"}}
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();
        match from_wire(parsed).unwrap() {
            ProviderResponse::ToolCalls { text, calls } => {
                assert_eq!(text, "Running tests.");
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "run_tests");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn tool_use_stop_without_blocks_is_malformed() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "hmm"}],
            "stop_reason": "tool_use"
        }))
        .unwrap();
        assert!(matches!(
            from_wire(parsed),
            Err(ProviderError::Malformed { .. })
        ));
    }
}
