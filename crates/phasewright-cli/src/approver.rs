//! Interactive approver reading decisions from the terminal.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use phasewright_core::{ApprovalDecision, ApprovalPrompt, Approver};
use serde_json::Value;
use tracing::warn;

/// Asks on stderr, reads answers from stdin.
///
/// `y` approves, `n` denies (with an optional reason), `e` replaces the
/// arguments with a JSON object typed on the next line. A closed stdin
/// denies.
#[derive(Debug, Clone)]
pub struct StdinApprover {
    decider: String,
}

impl StdinApprover {
    pub fn new(decider: impl Into<String>) -> Self {
        Self {
            decider: decider.into(),
        }
    }

    /// Decider named after the logged-in user.
    pub fn from_env() -> Self {
        let user = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
        Self::new(format!("cli:{user}"))
    }
}

#[async_trait]
impl Approver for StdinApprover {
    async fn decide(&self, prompt: &ApprovalPrompt) -> ApprovalDecision {
        let prompt = prompt.clone();
        let decider = self.decider.clone();
        let request_id = prompt.request_id.clone();
        match tokio::task::spawn_blocking(move || ask(&prompt, &decider)).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "approval prompt task failed");
                ApprovalDecision::deny(request_id, &self.decider, "approval prompt failed")
            }
        }
    }
}

fn ask(prompt: &ApprovalPrompt, decider: &str) -> ApprovalDecision {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stderr = io::stderr();

    let _ = writeln!(stderr, "\napproval needed ({})", prompt.request_id);
    let _ = writeln!(stderr, "  {prompt}");
    if !prompt.description.is_empty() {
        let _ = writeln!(stderr, "  tool: {}", prompt.description);
    }

    loop {
        let _ = write!(stderr, "approve? [y]es / [n]o / [e]dit arguments: ");
        let _ = stderr.flush();
        let Some(Ok(answer)) = lines.next() else {
            return ApprovalDecision::deny(&prompt.request_id, decider, "stdin closed");
        };
        match parse_answer(&answer) {
            Some(Answer::Approve) => return ApprovalDecision::approve(&prompt.request_id, decider),
            Some(Answer::Deny) => {
                let _ = write!(stderr, "reason (optional): ");
                let _ = stderr.flush();
                let reason = lines
                    .next()
                    .and_then(Result::ok)
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "denied at the terminal".to_string());
                return ApprovalDecision::deny(&prompt.request_id, decider, reason);
            }
            Some(Answer::Edit) => {
                let _ = write!(stderr, "arguments as a JSON object: ");
                let _ = stderr.flush();
                let Some(Ok(raw)) = lines.next() else {
                    return ApprovalDecision::deny(&prompt.request_id, decider, "stdin closed");
                };
                match parse_arguments(&raw) {
                    Ok(arguments) => {
                        return ApprovalDecision::modify(&prompt.request_id, decider, arguments)
                    }
                    Err(message) => {
                        let _ = writeln!(stderr, "{message}");
                    }
                }
            }
            None => {
                let _ = writeln!(stderr, "please answer y, n or e");
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Answer {
    Approve,
    Deny,
    Edit,
}

fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(Answer::Approve),
        "n" | "no" => Some(Answer::Deny),
        "e" | "edit" => Some(Answer::Edit),
        _ => None,
    }
}

fn parse_arguments(raw: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("arguments must be a JSON object".to_string()),
        Err(err) => Err(format!("invalid JSON: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_are_case_insensitive() {
        assert_eq!(parse_answer(" Y "), Some(Answer::Approve));
        assert_eq!(parse_answer("no"), Some(Answer::Deny));
        assert_eq!(parse_answer("E"), Some(Answer::Edit));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[test]
    fn edited_arguments_must_be_objects() {
        assert!(parse_arguments(r#"{"suite": "smoke"}"#).is_ok());
        assert!(parse_arguments("[1, 2]").is_err());
        assert!(parse_arguments("{oops").is_err());
    }
}
