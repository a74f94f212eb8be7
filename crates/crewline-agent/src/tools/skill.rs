use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{required_str, Tool, ToolContext, ToolResult};
use crate::skills;

pub struct LoadSkillTool;

#[async_trait]
impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        "load_skill"
    }

    fn description(&self) -> &str {
        "Load a skill file from the workspace skills directory. Returns the \
         skill's instructions as markdown."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Skill name"}
            },
            "required": ["name"]
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let name = required_str(&args, "name", "load_skill")?;
        match skills::load_skill(&ctx.agent.workspace_dir, name) {
            Ok(body) => Ok(ToolResult::success(body)),
            Err(e) => {
                let available = skills::list_skills(&ctx.agent.workspace_dir);
                let hint = if available.is_empty() {
                    String::new()
                } else {
                    format!(" Available: {}", available.join(", "))
                };
                Ok(ToolResult::error(format!("Error: {}.{}", e, hint)))
            }
        }
    }
}
