//! Google Gemini `generateContent` adapter.
//!
//! Gemini has no tool-call ids, so ids are synthesized per response and
//! function responses are matched back by tool name.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ProviderClient, ProviderError, ProviderRequest, ProviderResponse, ProviderResult};
use crate::transcript::{ConversationTurn, ToolCall, TurnRole};

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
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

    /// Read the key from `GEMINI_API_KEY`.
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| ProviderError::NotConfigured {
            provider: PROVIDER.to_string(),
            message: "GEMINI_API_KEY environment variable not set".to_string(),
        })?;
        Self::new(api_key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationParams,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn to_wire(turn: &ConversationTurn) -> Option<Content> {
    match turn.role {
        TurnRole::System => None,
        TurnRole::User => Some(Content {
            role: "user".into(),
            parts: vec![Part::Text {
                text: turn.content.clone(),
            }],
        }),
        TurnRole::Assistant => {
            let mut parts = Vec::new();
            if !turn.content.is_empty() {
                parts.push(Part::Text {
                    text: turn.content.clone(),
                });
            }
            parts.extend(turn.tool_calls.iter().map(|c| Part::FunctionCall {
                function_call: FunctionCall {
                    name: c.name.clone(),
                    args: c.arguments.clone(),
                },
            }));
            Some(Content {
                role: "model".into(),
                parts,
            })
        }
        TurnRole::Tool => Some(Content {
            role: "user".into(),
            parts: turn
                .tool_results
                .iter()
                .map(|r| Part::FunctionResponse {
                    function_response: FunctionResponse {
                        name: r.tool_name.clone(),
                        response: json!({ "result": r.content, "is_error": r.is_error }),
                    },
                })
                .collect(),
        }),
    }
}

fn from_wire(response: GenerateResponse) -> ProviderResult<ProviderResponse> {
    let candidate = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| ProviderError::malformed(PROVIDER, "no candidates in response"))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let mut text = String::new();
    let mut calls = Vec::new();
    for part in parts {
        match part {
            Part::Text { text: t } => text.push_str(&t),
            Part::FunctionCall { function_call } => calls.push(ToolCall {
                id: format!("call_{}", calls.len() + 1),
                name: function_call.name,
                arguments: function_call.args,
            }),
            Part::FunctionResponse { .. } => {}
        }
    }
    ProviderResponse::from_parts(PROVIDER, text, calls, false)
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn send(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        let declarations: Vec<FunctionDeclaration> = request
            .tools
            .iter()
            .map(|t| FunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            })
            .collect();

        let body = GenerateRequest {
            contents: request.conversation().filter_map(to_wire).collect(),
            system_instruction: request.system_prompt().map(|text| SystemInstruction {
                parts: vec![TextPart { text }],
            }),
            generation_config: GenerationParams {
                temperature: request.generation.temperature,
                max_output_tokens: request.generation.max_tokens,
            },
            tools: if declarations.is_empty() {
                vec![]
            } else {
                vec![ToolDeclarations {
                    function_declarations: declarations,
                }]
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(PROVIDER, format!("undecodable body: {e}")))?;
        from_wire(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_calls_get_sequential_ids() {
        let parsed: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"functionCall": {"name": "read_file", "args": {"path": "a"}}},
                        {"functionCall": {"name": "read_file", "args": {"path": "b"}}}
                    ]
                }
            }]
        }))
        .unwrap();
        match from_wire(parsed).unwrap() {
            ProviderResponse::ToolCalls { calls, .. } => {
                let ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
                assert_eq!(ids, vec!["call_1", "call_2"]);
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let parsed: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            from_wire(parsed),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn assistant_turn_uses_model_role() {
        let turn = ConversationTurn::assistant("ok");
        assert_eq!(to_wire(&turn).unwrap().role, "model");
    }
}
