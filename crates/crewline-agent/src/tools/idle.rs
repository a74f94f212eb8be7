use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{Tool, ToolContext, ToolResult, Caller};

/// Signals the end of a teammate's active phase. The teammate loop
/// intercepts this name and moves to the idle poll cycle.
pub struct IdleTool;

#[async_trait]
impl Tool for IdleTool {
    fn name(&self) -> &str {
        "idle"
    }

    fn description(&self) -> &str {
        "Signal that you have no more work. You will poll for inbox messages \
         and unclaimed tasks, and shut down if nothing arrives."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        match ctx.caller {
            Caller::Teammate { .. } => Ok(ToolResult::success(
                "Entering idle phase. Will poll for messages and unclaimed tasks.",
            )),
            _ => Ok(ToolResult::success("Lead does not idle.")),
        }
    }
}

pub struct ClaimTaskTool;

#[async_trait]
impl Tool for ClaimTaskTool {
    fn name(&self) -> &str {
        "claim_task"
    }

    fn description(&self) -> &str {
        "Claim a board task: sets you as owner and the status to in_progress."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string", "description": "Task id to claim"}
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let task_id = match args.get("task_id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => anyhow::bail!("claim_task: missing 'task_id' argument"),
        };
        let owner = ctx.caller.name().to_string();
        match ctx.agent.board.claim(&task_id, &owner) {
            Ok(task) => Ok(ToolResult::success(format!(
                "Claimed task #{} for {}",
                task.id, owner
            ))),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedClient;
    use crate::tools::AgentContext;
    use std::sync::Arc;

    fn ctx(tmp: &tempfile::TempDir, caller: Caller) -> ToolContext {
        let llm = Arc::new(ScriptedClient::new(vec![]));
        let agent = AgentContext::for_workspace(tmp.path(), llm).unwrap();
        ToolContext::new(agent, caller)
    }

    #[tokio::test]
    async fn test_idle_lead_vs_teammate() {
        let tmp = tempfile::tempdir().unwrap();
        let lead = ctx(&tmp, Caller::Lead);
        let result = IdleTool.execute(serde_json::json!({}), &lead).await.unwrap();
        assert_eq!(result.output, "Lead does not idle.");

        let mate = ctx(
            &tmp,
            Caller::Teammate {
                name: "alice".to_string(),
                team_name: "beta".to_string(),
            },
        );
        let result = IdleTool.execute(serde_json::json!({}), &mate).await.unwrap();
        assert!(result.output.contains("idle phase"));
    }

    #[tokio::test]
    async fn test_claim_task() {
        let tmp = tempfile::tempdir().unwrap();
        let mate = ctx(
            &tmp,
            Caller::Teammate {
                name: "alice".to_string(),
                team_name: "beta".to_string(),
            },
        );
        mate.agent.board.create("t", "", None, None).unwrap();
        let result = ClaimTaskTool
            .execute(serde_json::json!({"task_id": "1"}), &mate)
            .await
            .unwrap();
        assert_eq!(result.output, "Claimed task #1 for alice");
        let task = mate.agent.board.get("1").unwrap().unwrap();
        assert_eq!(task.owner, "alice");
    }

    #[tokio::test]
    async fn test_claim_unknown_task() {
        let tmp = tempfile::tempdir().unwrap();
        let lead = ctx(&tmp, Caller::Lead);
        let result = ClaimTaskTool
            .execute(serde_json::json!({"task_id": "99"}), &lead)
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
