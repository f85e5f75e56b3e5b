//! Static advisory heuristics for tips-only and manual-with-tips runs.
//!
//! Deterministic: the same stage, input and calls always give the same text.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use crate::stage::{Phase, Role, Stage};
use crate::transcript::ToolCall;

struct Topic {
    pattern: &'static str,
    tip: &'static str,
}

const TOPICS: &[Topic] = &[
    Topic {
        pattern: r"(?i)\b(security|auth\w*|login|password|token|secret|xss|injection)\b",
        tip: "Security: validate every input at the boundary, keep secrets out of logs and source, and check authorization on each request.",
    },
    Topic {
        pattern: r"(?i)\b(performance|latency|throughput|slow|scal\w*|load)\b",
        tip: "Performance: measure before optimizing, set explicit latency budgets, and load-test the hot path.",
    },
    Topic {
        pattern: r"(?i)\b(api|endpoint|rest|graphql|grpc|http)\b",
        tip: "API: version the contract, document error responses, and keep requests idempotent where retries are possible.",
    },
    Topic {
        pattern: r"(?i)\b(ui|ux|frontend|screen|page|component|form)\b",
        tip: "UI: cover keyboard navigation and screen readers, and handle loading, empty and error states.",
    },
    Topic {
        pattern: r"(?i)\b(database|schema|migration|data|sql|table)\b",
        tip: "Data: make migrations reversible, back up before applying, and test against production-sized data.",
    },
    Topic {
        pattern: r"(?i)\b(test\w*|coverage|regression|qa)\b",
        tip: "Testing: start from acceptance criteria, keep tests deterministic, and add a regression test for every bug fixed.",
    },
];

/// `TOPICS` compiled once, in the same order.
static TOPIC_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    TOPICS
        .iter()
        .map(|t| {
            let re = Regex::new(t.pattern).expect("topic patterns are valid regexes");
            (re, t.tip)
        })
        .collect()
});

fn checklist(stage: Stage) -> &'static [&'static str] {
    match stage {
        Stage::Phase(Phase::Discovery) => &[
            "Identify stakeholders and their success criteria.",
            "Inventory existing systems and integrations.",
            "List unknowns that block requirements.",
        ],
        Stage::Phase(Phase::Requirements) => &[
            "Write acceptance criteria for each requirement.",
            "Separate functional from non-functional requirements.",
            "Trace each requirement to a stakeholder need.",
        ],
        Stage::Phase(Phase::Architecture) => &[
            "Record key decisions with alternatives considered.",
            "Define component boundaries and interfaces.",
            "Review the design against non-functional requirements.",
        ],
        Stage::Phase(Phase::DesignBuild) | Stage::Role(Role::DevLead) => &[
            "Break the work into small reviewable changes.",
            "Keep the main branch releasable.",
            "Pair each change with tests.",
        ],
        Stage::Phase(Phase::Testing) | Stage::Role(Role::AutomationTester) => &[
            "Run the full suite before and after the change.",
            "Reproduce each failure before fixing it.",
            "Report flaky tests separately from real failures.",
        ],
        Stage::Phase(Phase::Deployment) => &[
            "Confirm the rollback plan before rollout.",
            "Roll out gradually and watch health checks.",
            "Announce the release and its known issues.",
        ],
        Stage::Role(Role::Frontend) => &[
            "Match the agreed design system.",
            "Check responsive layouts on small screens.",
        ],
        Stage::Role(Role::Backend) => &[
            "Validate inputs and return explicit errors.",
            "Keep handlers idempotent where clients retry.",
        ],
        Stage::Role(Role::NfrTester) => &[
            "Define measurable targets for latency and throughput.",
            "Exercise failure modes such as timeouts and restarts.",
        ],
        Stage::Role(Role::PenTester) => &[
            "Map the attack surface and trust boundaries.",
            "Test authentication, authorization and session handling.",
            "Rank findings by severity and exploitability.",
        ],
    }
}

/// Keyword-triggered tips for `text`, in a fixed order.
pub fn topic_tips(text: &str) -> Vec<&'static str> {
    TOPIC_PATTERNS
        .iter()
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, tip)| *tip)
        .collect()
}

/// Build advisory text for `stage` from the input and the calls the model
/// asked for.
pub fn synthesize_tips(stage: Stage, input: &str, calls: &[ToolCall]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} advisory", stage.title());
    let _ = writeln!(out);
    let _ = writeln!(out, "Checklist:");
    for item in checklist(stage) {
        let _ = writeln!(out, "- {item}");
    }

    let tips = topic_tips(input);
    if !tips.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Tips:");
        for tip in tips {
            let _ = writeln!(out, "- {tip}");
        }
    }

    if !calls.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Suggested actions:");
        for call in calls {
            let _ = writeln!(out, "- {} {}", call.name, call.arguments);
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_tips_follow_input() {
        let tips = topic_tips("Add a login API with password reset");
        assert_eq!(tips.len(), 2);
        assert!(tips[0].starts_with("Security"));
        assert!(tips[1].starts_with("API"));
        assert!(topic_tips("rename a variable").is_empty());
    }

    #[test]
    fn suggested_actions_name_each_call() {
        let calls = vec![ToolCall {
            id: "1".into(),
            name: "run_tests".into(),
            arguments: json!({"suite": "unit"}),
        }];
        let text = synthesize_tips(Stage::Role(Role::PenTester), "check auth", &calls);
        assert!(text.starts_with("Pen Tester advisory"));
        assert!(text.contains("Suggested actions:\n- run_tests {\"suite\":\"unit\"}"));
        assert!(text.contains("Security:"));
    }

    #[test]
    fn every_topic_pattern_compiles() {
        assert_eq!(TOPIC_PATTERNS.len(), TOPICS.len());
    }

    #[test]
    fn deterministic() {
        let a = synthesize_tips(Stage::Phase(Phase::Testing), "slow tests", &[]);
        let b = synthesize_tips(Stage::Phase(Phase::Testing), "slow tests", &[]);
        assert_eq!(a, b);
    }
}
