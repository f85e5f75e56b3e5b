//! Demo tools shipped with the CLI.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use phasewright_core::tools::PropertyType;
use phasewright_core::{handler_fn, Tool, ToolCategory, ToolRegistry, ToolSchema};
use serde_json::json;
use tokio::process::Command;

/// Output kept from each stream of a test run.
const OUTPUT_TAIL_BYTES: usize = 4000;

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const RUN_TESTS: &str = "run_tests";

/// Register the demo tools. Paths resolve against `root`; `test_command`
/// runs through `sh -c` inside `root`.
pub fn registry(root: &Path, test_command: &str) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(read_file(root.to_path_buf()))?;
    registry.register(write_file(root.to_path_buf()))?;
    registry.register(run_tests(root.to_path_buf(), test_command.to_string()))?;
    Ok(registry)
}

fn read_file(root: PathBuf) -> Tool {
    Tool::builder(READ_FILE)
        .description("Read a UTF-8 text file from the workspace")
        .schema(
            ToolSchema::object()
                .required("path", PropertyType::String, "workspace-relative path")
                .optional("max_bytes", PropertyType::Integer, "truncate after this many bytes"),
        )
        .category(ToolCategory::ReadOnly)
        .handler(handler_fn(move |args| {
            let root = root.clone();
            async move {
                let path = resolve(&root, args.str("path")?)?;
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let bytes = content.len();
                let content = match args.get("max_bytes").and_then(|v| v.as_u64()) {
                    Some(limit) => truncate(&content, limit as usize).to_string(),
                    None => content,
                };
                Ok::<_, anyhow::Error>(json!({
                    "path": path.display().to_string(),
                    "bytes": bytes,
                    "content": content,
                }))
            }
        }))
}

fn write_file(root: PathBuf) -> Tool {
    Tool::builder(WRITE_FILE)
        .description("Create or overwrite a text file in the workspace")
        .schema(
            ToolSchema::object()
                .required("path", PropertyType::String, "workspace-relative path")
                .required("content", PropertyType::String, "full new file content"),
        )
        .requires_approval(true)
        .category(ToolCategory::CodeChange)
        .handler(handler_fn(move |args| {
            let root = root.clone();
            async move {
                let path = resolve(&root, args.str("path")?)?;
                let content = args.str("content")?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                tokio::fs::write(&path, content)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                Ok::<_, anyhow::Error>(json!({
                    "path": path.display().to_string(),
                    "bytes_written": content.len(),
                }))
            }
        }))
}

fn run_tests(root: PathBuf, command: String) -> Tool {
    Tool::builder(RUN_TESTS)
        .description("Run the project's test command and report the result")
        .schema(ToolSchema::object().optional(
            "filter",
            PropertyType::String,
            "appended to the test command to narrow the run",
        ))
        .requires_approval(true)
        .category(ToolCategory::Critical)
        .handler(handler_fn(move |args| {
            let root = root.clone();
            let command = command.clone();
            let filter = args.optional_str("filter").map(str::to_string);
            async move {
                let output = shell(&command, filter.as_deref())
                    .current_dir(&root)
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .with_context(|| format!("failed to spawn '{command}'"))?;
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                Ok::<_, anyhow::Error>(json!({
                    "command": command,
                    "filter": filter,
                    "success": output.status.success(),
                    "exit_code": output.status.code(),
                    "stdout_tail": tail(&stdout, OUTPUT_TAIL_BYTES),
                    "stderr_tail": tail(&stderr, OUTPUT_TAIL_BYTES),
                }))
            }
        }))
}

/// `sh -c` running `command`. A filter travels as `$1`, never as script text.
fn shell(command: &str, filter: Option<&str>) -> Command {
    let mut cmd = Command::new("sh");
    match filter {
        Some(filter) => {
            cmd.arg("-c")
                .arg(format!("{command} \"$1\""))
                .arg("sh")
                .arg(filter);
        }
        None => {
            cmd.arg("-c").arg(command);
        }
    }
    cmd
}

/// Join `relative` onto `root`, refusing anything that could leave it.
fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => bail!("path '{relative}' must stay inside the workspace"),
        }
    }
    Ok(root.join(candidate))
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_escapes() {
        let root = Path::new("/work");
        assert_eq!(resolve(root, "src/lib.rs").unwrap(), root.join("src/lib.rs"));
        assert!(resolve(root, "../etc/passwd").is_err());
        assert!(resolve(root, "/etc/passwd").is_err());
    }

    #[test]
    fn truncate_and_tail_respect_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(tail("héllo", 4), "llo");
        assert_eq!(tail("abc", 10), "abc");
    }

    #[tokio::test]
    async fn write_then_read_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(dir.path(), "true").unwrap();

        tools
            .execute(WRITE_FILE, &json!({ "path": "notes/plan.md", "content": "ship it" }))
            .await
            .unwrap();
        let report = tools
            .execute(READ_FILE, &json!({ "path": "notes/plan.md" }))
            .await
            .unwrap();
        assert_eq!(report.output["content"], "ship it");
    }

    #[tokio::test]
    async fn run_tests_filter_is_passed_as_data() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(dir.path(), "echo").unwrap();
        let report = tools
            .execute(RUN_TESTS, &json!({ "filter": "unit; touch injected" }))
            .await
            .unwrap();
        assert_eq!(report.output["success"], true);
        assert_eq!(report.output["stdout_tail"], "unit; touch injected\n");
        assert!(!dir.path().join("injected").exists());
    }

    #[tokio::test]
    async fn run_tests_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(dir.path(), "exit 3").unwrap();
        let report = tools.execute(RUN_TESTS, &json!({})).await.unwrap();
        assert_eq!(report.output["success"], false);
        assert_eq!(report.output["exit_code"], 3);
    }
}
