use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{required_str, Tool, ToolContext, ToolResult, Visibility};

pub struct TeamCreateTool;

#[async_trait]
impl Tool for TeamCreateTool {
    fn name(&self) -> &str {
        "TeamCreate"
    }

    fn description(&self) -> &str {
        "Create a team and optionally spawn its first teammates. Each \
         teammate is an autonomous worker with its own inbox that claims \
         unclaimed board tasks while idle."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "team_name": {"type": "string", "description": "Team name"},
                "teammates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "prompt": {"type": "string"}
                        },
                        "required": ["name", "prompt"]
                    },
                    "description": "Teammates to spawn into the new team"
                }
            },
            "required": ["team_name"]
        })
    }

    fn visibility(&self) -> Visibility {
        Visibility::LeadOnly
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let team_name = required_str(&args, "team_name", "TeamCreate")?;

        let mut receipts = vec![match ctx.agent.team.create_team(team_name) {
            Ok(receipt) => receipt,
            Err(e) => return Ok(ToolResult::error(format!("Error: {}", e))),
        }];

        if let Some(teammates) = args.get("teammates").and_then(|v| v.as_array()) {
            for spec in teammates {
                let Some(name) = spec.get("name").and_then(|v| v.as_str()) else {
                    receipts.push("Error: teammate entry missing 'name'".to_string());
                    continue;
                };
                let prompt = spec.get("prompt").and_then(|v| v.as_str()).unwrap_or("");
                match ctx.agent.team.spawn_teammate(&ctx.agent, name, team_name, prompt) {
                    Ok(receipt) => receipts.push(receipt),
                    Err(e) => receipts.push(format!("Error: {}", e)),
                }
            }
        }

        Ok(ToolResult::success(receipts.join("\n")))
    }
}

pub struct TeamDeleteTool;

#[async_trait]
impl Tool for TeamDeleteTool {
    fn name(&self) -> &str {
        "TeamDelete"
    }

    fn description(&self) -> &str {
        "Delete a team: every member receives a shutdown request and is \
         marked shutdown."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "team_name": {"type": "string", "description": "Team to delete"}
            },
            "required": ["team_name"]
        })
    }

    fn visibility(&self) -> Visibility {
        Visibility::LeadOnly
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let team_name = required_str(&args, "team_name", "TeamDelete")?;
        match ctx.agent.team.delete_team(team_name).await {
            Ok(receipt) => Ok(ToolResult::success(receipt)),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}
