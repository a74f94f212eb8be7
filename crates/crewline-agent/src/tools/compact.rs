use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{Tool, ToolContext, ToolResult};

/// Manual compaction trigger. The agent loop intercepts this tool name and
/// runs auto_compact after the current turn's dispatch completes; the
/// handler itself only acknowledges.
pub struct CompactTool;

#[async_trait]
impl Tool for CompactTool {
    fn name(&self) -> &str {
        "compact"
    }

    fn description(&self) -> &str {
        "Trigger manual conversation compression. Use when you notice the \
         conversation getting long and you are at a natural checkpoint."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "focus": {
                    "type": "string",
                    "description": "What to preserve in the summary"
                }
            }
        })
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        Ok(ToolResult::success("Compressing..."))
    }
}
