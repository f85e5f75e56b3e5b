//! Deterministic provider that replays a fixed script.
//!
//! Used by tests and by `--dry-run` in the CLI. Every request is recorded so
//! callers can inspect exactly what the agent sent.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ProviderClient, ProviderError, ProviderRequest, ProviderResponse, ProviderResult};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Respond(ProviderResponse),
    Fail(ProviderError),
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: Vec<ScriptStep>,
    cursor: usize,
    requests: Vec<ProviderRequest>,
}

/// Replays `steps` in order. Once exhausted, either repeats the final step
/// (`repeat_last`) or fails with a malformed-response error.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    repeat_last: bool,
    state: Mutex<ScriptState>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        Self {
            name: name.into(),
            repeat_last: false,
            state: Mutex::new(ScriptState {
                steps,
                ..ScriptState::default()
            }),
        }
    }

    /// A provider that returns `response` forever.
    pub fn always(name: impl Into<String>, response: ProviderResponse) -> Self {
        let mut provider = Self::new(name, vec![ScriptStep::Respond(response)]);
        provider.repeat_last = true;
        provider
    }

    /// Keep replaying the last step once the script runs out.
    pub fn repeating_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: &ProviderRequest) -> ProviderResult<ProviderResponse> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        let step = if state.cursor < state.steps.len() {
            let step = state.steps[state.cursor].clone();
            state.cursor += 1;
            Some(step)
        } else if self.repeat_last {
            state.steps.last().cloned()
        } else {
            None
        };

        match step {
            Some(ScriptStep::Respond(response)) => Ok(response),
            Some(ScriptStep::Fail(err)) => Err(err),
            None => Err(ProviderError::malformed(&self.name, "script exhausted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GenerationConfig;

    fn request() -> ProviderRequest {
        ProviderRequest {
            transcript: vec![],
            tools: vec![],
            model: "m".into(),
            generation: GenerationConfig::default(),
        }
    }

    #[tokio::test]
    async fn replays_steps_in_order_then_exhausts() {
        let provider = ScriptedProvider::new(
            "s",
            vec![
                ScriptStep::Fail(ProviderError::unavailable("s", "blip")),
                ScriptStep::Respond(ProviderResponse::text("done")),
            ],
        );
        assert!(provider.send(&request()).await.is_err());
        assert_eq!(
            provider.send(&request()).await.unwrap(),
            ProviderResponse::text("done")
        );
        assert!(matches!(
            provider.send(&request()).await,
            Err(ProviderError::Malformed { .. })
        ));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn always_repeats_forever() {
        let provider = ScriptedProvider::always("s", ProviderResponse::text("again"));
        for _ in 0..5 {
            assert_eq!(
                provider.send(&request()).await.unwrap(),
                ProviderResponse::text("again")
            );
        }
    }
}
