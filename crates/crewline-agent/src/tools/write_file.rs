use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{required_str, Tool, ToolContext, ToolResult};
use crate::workspace::safe_path;

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. \
         Overwrites any existing content."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the workspace"},
                "content": {"type": "string", "description": "The full file content"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let raw = required_str(&args, "path", "write_file")?;
        let content = required_str(&args, "content", "write_file")?;

        let path = match safe_path(&ctx.agent.workspace_dir, raw) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(format!("Error: {}", e))),
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolResult::error(format!("Error: {}", e)));
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => Ok(ToolResult::success(format!("Wrote {} bytes", content.len()))),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}
