use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{Tool, ToolContext, ToolResult};
use crate::todo::TodoItem;

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "TodoWrite"
    }

    fn description(&self) -> &str {
        "Replace your todo checklist. Mark one item in_progress before starting \
         it and completed when done. Max 20 items."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "text": {"type": "string"},
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"]
                            }
                        },
                        "required": ["text"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let raw = args
            .get("todos")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("TodoWrite: missing 'todos' argument"))?;
        let items: Vec<TodoItem> = serde_json::from_value(raw)
            .map_err(|e| anyhow::anyhow!("TodoWrite: invalid todos: {}", e))?;

        let mut todos = ctx.agent.todos.lock().unwrap();
        match todos.update(items) {
            Ok(rendered) => Ok(ToolResult::success(rendered)),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}
