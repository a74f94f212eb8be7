//! Lead-only control over background jobs: wait on output, stop a runaway.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{required_str, Tool, ToolContext, ToolResult, Visibility};

pub struct TaskOutputTool;

#[async_trait]
impl Tool for TaskOutputTool {
    fn name(&self) -> &str {
        "TaskOutput"
    }

    fn description(&self) -> &str {
        "Get the output of a background task. Blocks until completion by \
         default; set block=false for a quick status check, or offset to \
         re-read the output file from a byte position."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string", "description": "Background task id"},
                "block": {"type": "boolean", "description": "Wait for completion (default true)"},
                "timeout_ms": {"type": "integer", "description": "Max wait in milliseconds (default 30000)"},
                "offset": {"type": "integer", "description": "Byte offset into the output file"}
            },
            "required": ["task_id"]
        })
    }

    fn visibility(&self) -> Visibility {
        Visibility::LeadOnly
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let task_id = required_str(&args, "task_id", "TaskOutput")?;

        if let Some(offset) = args.get("offset").and_then(|v| v.as_u64()) {
            return match ctx.agent.background.read_output(task_id, offset) {
                Ok(output) => Ok(ToolResult::success(output)),
                Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
            };
        }

        let block = args.get("block").and_then(|v| v.as_bool()).unwrap_or(true);
        let timeout_ms = args.get("timeout_ms").and_then(|v| v.as_u64());

        match ctx
            .agent
            .background
            .get_output(task_id, block, timeout_ms)
            .await
        {
            Ok(snapshot) => {
                let body = if snapshot.output.is_empty() {
                    "(no output yet)"
                } else {
                    snapshot.output.as_str()
                };
                Ok(ToolResult::success(format!(
                    "[{}] {}\n{}",
                    snapshot.status, snapshot.task_id, body
                )))
            }
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}

pub struct TaskStopTool;

#[async_trait]
impl Tool for TaskStopTool {
    fn name(&self) -> &str {
        "TaskStop"
    }

    fn description(&self) -> &str {
        "Stop a running background task. The task is marked stopped \
         immediately; in-flight work is cancelled cooperatively."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string", "description": "Background task id"}
            },
            "required": ["task_id"]
        })
    }

    fn visibility(&self) -> Visibility {
        Visibility::LeadOnly
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let task_id = required_str(&args, "task_id", "TaskStop")?;
        match ctx.agent.background.stop_task(task_id) {
            Ok(status) => Ok(ToolResult::success(format!(
                "Task {} is now {}",
                task_id, status
            ))),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::JobKind;
    use crate::testutil::ScriptedClient;
    use crate::tools::{AgentContext, Caller};
    use std::sync::Arc;

    fn ctx(tmp: &tempfile::TempDir) -> ToolContext {
        let llm = Arc::new(ScriptedClient::new(vec![]));
        let agent = AgentContext::for_workspace(tmp.path(), llm).unwrap();
        ToolContext::new(agent, Caller::Lead)
    }

    #[tokio::test]
    async fn test_output_blocking() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        let id = ctx
            .agent
            .background
            .run_in_background(JobKind::Bash, async { Ok("done!".to_string()) })
            .unwrap();
        let result = TaskOutputTool
            .execute(serde_json::json!({"task_id": id, "timeout_ms": 5000}), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.output.starts_with("[completed]"));
        assert!(result.output.contains("done!"));
    }

    #[tokio::test]
    async fn test_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        let id = ctx
            .agent
            .background
            .run_in_background(JobKind::Bash, async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok("never".to_string())
            })
            .unwrap();
        let result = TaskStopTool
            .execute(serde_json::json!({"task_id": id}), &ctx)
            .await
            .unwrap();
        assert!(result.output.contains("stopped"));
    }

    #[tokio::test]
    async fn test_unknown_task_is_usage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        let result = TaskOutputTool
            .execute(
                serde_json::json!({"task_id": "b123456", "block": false}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.output.starts_with("Error:"));
    }
}
