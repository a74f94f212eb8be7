use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{optional_str, required_str, Tool, ToolContext, ToolResult, Visibility};
use crate::subagent::{run_subagent, spawn_subagent_background, SubagentKind};

/// Spawns a nested subagent. Lead-only: neither teammates nor subagents may
/// recurse.
pub struct TaskTool;

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "Task"
    }

    fn description(&self) -> &str {
        "Delegate a task to a subagent with its own fresh context. \
         agent_type explore/plan get read-only tools; code gets working tools. \
         Set background=true to get a task id immediately and the result as a \
         notification."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string", "description": "The task for the subagent"},
                "description": {"type": "string", "description": "Short label for the task"},
                "agent_type": {
                    "type": "string",
                    "enum": ["explore", "code", "plan"],
                    "description": "Subagent type (default: code)"
                },
                "background": {"type": "boolean", "description": "Run in the background"}
            },
            "required": ["prompt"]
        })
    }

    fn visibility(&self) -> Visibility {
        Visibility::LeadOnly
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let prompt = required_str(&args, "prompt", "Task")?;
        let kind = match optional_str(&args, "agent_type") {
            None => SubagentKind::Code,
            Some(raw) => match SubagentKind::parse(raw) {
                Some(kind) => kind,
                None => {
                    return Ok(ToolResult::error(format!(
                        "Error: Unknown agent_type '{}'. Use: explore, code, plan",
                        raw
                    )))
                }
            },
        };

        let background = args
            .get("background")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if background {
            let task_id = spawn_subagent_background(&ctx.agent, kind, prompt.to_string())?;
            return Ok(ToolResult::success(format!(
                "Subagent task {} started in background. The result will arrive as a notification.",
                task_id
            )));
        }

        match run_subagent(&ctx.agent, kind, prompt).await {
            Ok(summary) => Ok(ToolResult::success(summary)),
            Err(e) => Ok(ToolResult::error(format!("Error: Subagent failed: {}", e))),
        }
    }
}
