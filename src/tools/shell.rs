//! Shell capability for agents.
//!
//! Runs a program with arguments, returning the tail of its output. Commands are
//! never passed through a shell interpreter; `args[0]` is the program.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::error::{AgnoError, Result};
use crate::tool::{Tool, ToolRegistry};

#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// Working directory for spawned programs.
    pub base_dir: Option<PathBuf>,
    /// Number of trailing output lines returned when the caller gives no `tail`.
    pub default_tail: usize,
    pub timeout: Duration,
    /// Programs the model may not run.
    pub blocked_programs: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            default_tail: 100,
            timeout: Duration::from_secs(30),
            blocked_programs: vec!["rm".into(), "mkfs".into(), "dd".into(), "shutdown".into()],
        }
    }
}

pub fn shell_toolkit(config: ShellConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(RunShellCommandTool { config });
    registry
}

struct RunShellCommandTool {
    config: ShellConfig,
}

fn tail_lines(text: &str, tail: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(tail);
    lines[start..].join("\n")
}

#[async_trait]
impl Tool for RunShellCommandTool {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Run a program and return the last `tail` lines of its output. Expects {\"args\": [string], \"tail\": number}."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "args": {"type": "array", "items": {"type": "string"}},
                "tail": {"type": "integer", "minimum": 1}
            },
            "required": ["args"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: Vec<String> = input
            .get("args")
            .and_then(Value::as_array)
            .ok_or_else(|| AgnoError::Protocol("missing `args` for run_shell_command".into()))?
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| AgnoError::Protocol("empty `args` for run_shell_command".into()))?;
        let tail = input
            .get("tail")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.config.default_tail);

        let program_name = std::path::Path::new(program)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.clone());
        if self.config.blocked_programs.contains(&program_name) {
            tracing::warn!(program = %program_name, "blocked shell command");
            return Err(AgnoError::ToolInvocation {
                name: self.name().into(),
                source: format!("program `{program_name}` is blocked").into(),
            });
        }

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(base_dir) = &self.config.base_dir {
            cmd.current_dir(base_dir);
        }

        tracing::info!(program = %program, args = ?rest, "running shell command");
        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| AgnoError::ToolInvocation {
                name: self.name().into(),
                source: format!("`{program}` timed out after {:?}", self.config.timeout).into(),
            })?
            .map_err(|err| AgnoError::ToolInvocation {
                name: self.name().into(),
                source: Box::new(err),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let exit_code = output.status.code().unwrap_or(-1);
        if output.status.success() {
            Ok(json!({ "stdout": tail_lines(&stdout, tail), "exit_code": exit_code }))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Ok(json!({
                "error": tail_lines(&stderr, tail),
                "stdout": tail_lines(&stdout, tail),
                "exit_code": exit_code
            }))
        }
    }
}
