use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{required_str, Tool, ToolContext, ToolResult};
use crate::background::{JobFailure, JobKind};

const MAX_OUTPUT_CHARS: usize = 50_000;

pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace directory. Set background=true for \
         long-running commands; you get a task id immediately and a notification \
         when the command finishes."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "background": {
                    "type": "boolean",
                    "description": "Run in the background and return a task id immediately"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let command = required_str(&args, "command", "bash")?;

        if let Some(blocked) = ctx.agent.sandbox.is_command_blocked(command) {
            return Ok(ToolResult::error(format!(
                "Error: Dangerous command blocked (contains '{}')",
                blocked
            )));
        }

        let background = args
            .get("background")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if background {
            let timeout = ctx.agent.sandbox.background_timeout;
            let workspace = ctx.agent.workspace_dir.clone();
            let cmd = command.to_string();
            let task_id = ctx.agent.background.run_in_background(JobKind::Bash, async move {
                match run_shell(&cmd, &workspace, timeout).await {
                    ShellOutcome::Done(output) => Ok(output),
                    ShellOutcome::TimedOut(secs) => {
                        Err(JobFailure::Timeout(format!("Error: Timeout ({}s)", secs)))
                    }
                    ShellOutcome::Failed(e) => Err(JobFailure::Error(format!("Error: {}", e))),
                }
            })?;
            return Ok(ToolResult::success(format!(
                "Background task {} started: {}",
                task_id,
                &command[..command.len().min(80)]
            )));
        }

        let timeout = ctx.agent.sandbox.bash_timeout;
        match run_shell(command, &ctx.agent.workspace_dir, timeout).await {
            ShellOutcome::Done(output) => Ok(ToolResult::success(output)),
            ShellOutcome::TimedOut(secs) => {
                Ok(ToolResult::error(format!("Error: Timeout ({}s)", secs)))
            }
            ShellOutcome::Failed(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}

enum ShellOutcome {
    Done(String),
    TimedOut(u64),
    Failed(String),
}

/// Run `sh -c <command>`, merging stdout and stderr the way a terminal
/// shows them, capped at MAX_OUTPUT_CHARS.
async fn run_shell(command: &str, workspace: &std::path::Path, timeout: Duration) -> ShellOutcome {
    let result = tokio::time::timeout(
        timeout,
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            let text = text.trim().to_string();
            let text = crate::tokens::truncate_at(&text, MAX_OUTPUT_CHARS).to_string();
            if text.is_empty() {
                ShellOutcome::Done("(no output)".to_string())
            } else {
                ShellOutcome::Done(text)
            }
        }
        Ok(Err(e)) => ShellOutcome::Failed(e.to_string()),
        Err(_) => ShellOutcome::TimedOut(timeout.as_secs()),
    }
}
