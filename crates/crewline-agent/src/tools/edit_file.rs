use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{required_str, Tool, ToolContext, ToolResult};
use crate::workspace::safe_path;

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace the first occurrence of old_text with new_text in a file. \
         old_text must match exactly."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the workspace"},
                "old_text": {"type": "string", "description": "Exact text to replace"},
                "new_text": {"type": "string", "description": "Replacement text"}
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let raw = required_str(&args, "path", "edit_file")?;
        let old_text = required_str(&args, "old_text", "edit_file")?;
        let new_text = required_str(&args, "new_text", "edit_file")?;

        let path = match safe_path(&ctx.agent.workspace_dir, raw) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(format!("Error: {}", e))),
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error: {}: {}", raw, e))),
        };

        if !content.contains(old_text) {
            return Ok(ToolResult::error(format!(
                "Error: Text not found in {}",
                raw
            )));
        }

        let updated = content.replacen(old_text, new_text, 1);
        match tokio::fs::write(&path, updated).await {
            Ok(()) => Ok(ToolResult::success(format!("Edited {}", raw))),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}
