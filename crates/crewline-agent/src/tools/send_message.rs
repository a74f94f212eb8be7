use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{optional_str, required_str, Tool, ToolContext, ToolResult};
use crate::bus::InboxMessage;

pub struct SendMessageTool;

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "SendMessage"
    }

    fn description(&self) -> &str {
        "Send a message to a teammate's inbox. type=broadcast delivers to \
         every team member except you (omit 'to'). Protocol types \
         (shutdown_request/shutdown_response/plan_approval_response) carry \
         request_id and approved fields."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "to": {"type": "string", "description": "Recipient name or agent id"},
                "content": {"type": "string", "description": "Message body"},
                "type": {
                    "type": "string",
                    "enum": ["message", "broadcast", "shutdown_request",
                             "shutdown_response", "plan_approval_response"],
                    "description": "Message type (default: message)"
                },
                "request_id": {"type": "string", "description": "Correlation id for protocol messages"},
                "approved": {"type": "boolean", "description": "Approval verdict for response types"}
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let content = required_str(&args, "content", "SendMessage")?;
        let msg_type = optional_str(&args, "type").unwrap_or("message");
        let to = optional_str(&args, "to");
        let sender = ctx.caller.agent_id();

        let mut message = InboxMessage::new(msg_type, &sender, content);
        message.request_id = optional_str(&args, "request_id").map(String::from);
        message.approved = args.get("approved").and_then(|v| v.as_bool());
        if message.request_id.is_none() && msg_type == "shutdown_request" {
            message.request_id = Some(short_request_id());
        }

        match ctx
            .agent
            .bus
            .send(&sender, to, content, msg_type, message)
            .await
        {
            Ok(receipt) => Ok(ToolResult::success(receipt)),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}

pub(crate) fn short_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
