//! Board task CRUD tools. All outputs are JSON-encoded task records or a
//! rendered checklist, so the model can read them back without guessing.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{optional_str, required_str, Tool, ToolContext, ToolResult};
use crate::board::{TaskPatch, TaskStatus};

fn string_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct TaskCreateTool;

#[async_trait]
impl Tool for TaskCreateTool {
    fn name(&self) -> &str {
        "TaskCreate"
    }

    fn description(&self) -> &str {
        "Create a task on the shared board. Tasks persist across compaction \
         and are visible to every teammate."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "subject": {"type": "string", "description": "Short imperative title"},
                "description": {"type": "string", "description": "What needs to be done"},
                "active_form": {"type": "string", "description": "Present-continuous label"},
                "metadata": {"type": "object", "description": "Arbitrary metadata"}
            },
            "required": ["subject"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let subject = required_str(&args, "subject", "TaskCreate")?;
        let description = optional_str(&args, "description").unwrap_or("");
        let active_form = optional_str(&args, "active_form");
        let metadata = args
            .get("metadata")
            .and_then(|v| v.as_object())
            .cloned();

        let task = ctx
            .agent
            .board
            .create(subject, description, active_form, metadata)?;
        Ok(ToolResult::success(serde_json::to_string_pretty(&task)?))
    }
}

pub struct TaskGetTool;

#[async_trait]
impl Tool for TaskGetTool {
    fn name(&self) -> &str {
        "TaskGet"
    }

    fn description(&self) -> &str {
        "Get the full record of a board task by id."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string", "description": "Task id"}
            },
            "required": ["task_id"]
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let id = task_id_arg(&args, "TaskGet")?;
        match ctx.agent.board.get(&id)? {
            Some(task) => Ok(ToolResult::success(serde_json::to_string_pretty(&task)?)),
            None => Ok(ToolResult::error(format!("Error: Task {} not found", id))),
        }
    }
}

pub struct TaskUpdateTool;

#[async_trait]
impl Tool for TaskUpdateTool {
    fn name(&self) -> &str {
        "TaskUpdate"
    }

    fn description(&self) -> &str {
        "Update a board task: status, fields, metadata, or dependency edges \
         (addBlocks/addBlockedBy are bidirectional). Completing a task \
         unblocks its dependents; deleting removes it permanently."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "completed", "deleted"]
                },
                "subject": {"type": "string"},
                "description": {"type": "string"},
                "active_form": {"type": "string"},
                "owner": {"type": "string"},
                "metadata": {"type": "object"},
                "addBlocks": {"type": "array", "items": {"type": "string"}},
                "addBlockedBy": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let id = task_id_arg(&args, "TaskUpdate")?;

        let status = match optional_str(&args, "status") {
            Some(s) => match TaskStatus::parse(s) {
                Ok(status) => Some(status),
                Err(e) => return Ok(ToolResult::error(format!("Error: {}", e))),
            },
            None => None,
        };

        let patch = TaskPatch {
            status,
            subject: optional_str(&args, "subject").map(String::from),
            description: optional_str(&args, "description").map(String::from),
            active_form: optional_str(&args, "active_form").map(String::from),
            owner: optional_str(&args, "owner").map(String::from),
            metadata: args.get("metadata").and_then(|v| v.as_object()).cloned(),
            add_blocks: string_list(&args, "addBlocks"),
            add_blocked_by: string_list(&args, "addBlockedBy"),
        };

        match ctx.agent.board.update(&id, patch) {
            Ok(task) if task.status == TaskStatus::Deleted => {
                Ok(ToolResult::success(format!("Task {} deleted", id)))
            }
            Ok(task) => Ok(ToolResult::success(serde_json::to_string_pretty(&task)?)),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}

pub struct TaskListTool;

#[async_trait]
impl Tool for TaskListTool {
    fn name(&self) -> &str {
        "TaskList"
    }

    fn description(&self) -> &str {
        "List all board tasks with status markers, owners, and blockers."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let tasks = ctx.agent.board.list_all()?;
        if tasks.is_empty() {
            return Ok(ToolResult::success("No tasks."));
        }
        let lines: Vec<String> = tasks
            .iter()
            .map(|t| {
                let owner = if t.owner.is_empty() {
                    String::new()
                } else {
                    format!(" @{}", t.owner)
                };
                let blocked = if t.blocked_by.is_empty() {
                    String::new()
                } else {
                    format!(" (blocked by: {})", t.blocked_by.join(", "))
                };
                format!(
                    "{} #{}: {}{}{}",
                    t.status.marker(),
                    t.id,
                    t.subject,
                    owner,
                    blocked
                )
            })
            .collect();
        Ok(ToolResult::success(lines.join("\n")))
    }
}

/// Task ids arrive as strings or bare numbers depending on the model's mood.
fn task_id_arg(args: &Value, tool: &str) -> Result<String> {
    match args.get("task_id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => anyhow::bail!("{}: missing 'task_id' argument", tool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedClient;
    use crate::tools::{AgentContext, Caller};
    use std::sync::Arc;

    fn ctx(tmp: &tempfile::TempDir) -> ToolContext {
        let llm = Arc::new(ScriptedClient::new(vec![]));
        let agent = AgentContext::for_workspace(tmp.path(), llm).unwrap();
        ToolContext::new(agent, Caller::Lead)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        let result = TaskCreateTool
            .execute(
                serde_json::json!({"subject": "build", "description": "compile it"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        let created: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(created["id"], "1");
        assert_eq!(created["status"], "pending");

        let result = TaskGetTool
            .execute(serde_json::json!({"task_id": "1"}), &ctx)
            .await
            .unwrap();
        let fetched: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(fetched["subject"], "build");
    }

    #[tokio::test]
    async fn test_dependency_unblock_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        TaskCreateTool
            .execute(serde_json::json!({"subject": "build"}), &ctx)
            .await
            .unwrap();
        TaskCreateTool
            .execute(serde_json::json!({"subject": "deploy"}), &ctx)
            .await
            .unwrap();

        TaskUpdateTool
            .execute(
                serde_json::json!({"task_id": "2", "addBlockedBy": ["1"]}),
                &ctx,
            )
            .await
            .unwrap();

        let deploy = ctx.agent.board.get("2").unwrap().unwrap();
        assert_eq!(deploy.blocked_by, vec!["1"]);
        let build = ctx.agent.board.get("1").unwrap().unwrap();
        assert_eq!(build.blocks, vec!["2"]);

        TaskUpdateTool
            .execute(
                serde_json::json!({"task_id": "1", "status": "completed"}),
                &ctx,
            )
            .await
            .unwrap();
        let deploy = ctx.agent.board.get("2").unwrap().unwrap();
        assert!(deploy.blocked_by.is_empty());
    }

    #[tokio::test]
    async fn test_update_invalid_status() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        TaskCreateTool
            .execute(serde_json::json!({"subject": "t"}), &ctx)
            .await
            .unwrap();
        let result = TaskUpdateTool
            .execute(
                serde_json::json!({"task_id": "1", "status": "paused"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.output.contains("Invalid status"));
    }

    #[tokio::test]
    async fn test_delete_then_get_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        TaskCreateTool
            .execute(serde_json::json!({"subject": "gone"}), &ctx)
            .await
            .unwrap();
        let result = TaskUpdateTool
            .execute(
                serde_json::json!({"task_id": "1", "status": "deleted"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.output, "Task 1 deleted");

        let result = TaskGetTool
            .execute(serde_json::json!({"task_id": "1"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.output.contains("not found"));
    }

    #[tokio::test]
    async fn test_list_rendering() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        let empty = TaskListTool
            .execute(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(empty.output, "No tasks.");

        TaskCreateTool
            .execute(serde_json::json!({"subject": "first"}), &ctx)
            .await
            .unwrap();
        TaskCreateTool
            .execute(serde_json::json!({"subject": "second"}), &ctx)
            .await
            .unwrap();
        ctx.agent.board.claim("1", "alice").unwrap();
        TaskUpdateTool
            .execute(
                serde_json::json!({"task_id": "2", "addBlockedBy": [1]}),
                &ctx,
            )
            .await
            .unwrap();

        let result = TaskListTool
            .execute(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(result.output.contains("[>] #1: first @alice"));
        assert!(result.output.contains("[ ] #2: second (blocked by: 1)"));
    }

    #[tokio::test]
    async fn test_numeric_task_id_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        TaskCreateTool
            .execute(serde_json::json!({"subject": "t"}), &ctx)
            .await
            .unwrap();
        let result = TaskGetTool
            .execute(serde_json::json!({"task_id": 1}), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error);
    }
}
