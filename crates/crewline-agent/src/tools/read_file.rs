use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{required_str, Tool, ToolContext, ToolResult};
use crate::workspace::safe_path;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read file contents. Paths are relative to the workspace root. \
         Use limit to cap the number of lines returned."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the workspace"},
                "limit": {"type": "integer", "description": "Maximum number of lines"}
            },
            "required": ["path"]
        })
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let raw = required_str(&args, "path", "read_file")?;
        let path = match safe_path(&ctx.agent.workspace_dir, raw) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(format!("Error: {}", e))),
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Error: {}: {}", raw, e))),
        };

        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|l| l as usize);
        let output = match limit {
            Some(limit) if limit < content.lines().count() => {
                let total = content.lines().count();
                let mut lines: Vec<&str> = content.lines().take(limit).collect();
                let trailer = format!("... ({} more)", total - limit);
                lines.push(&trailer);
                lines.join("\n")
            }
            _ => content,
        };

        Ok(ToolResult::success(output))
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
    async fn test_read() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.md"), "line1\nline2\nline3").unwrap();
        let ctx = ctx(&tmp);
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "notes.md"}), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.output, "line1\nline2\nline3");
    }

    #[tokio::test]
    async fn test_read_with_limit() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.md"), "a\nb\nc\nd\ne").unwrap();
        let ctx = ctx(&tmp);
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "notes.md", "limit": 2}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.output, "a\nb\n... (3 more)");
    }

    #[tokio::test]
    async fn test_read_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "nope.md"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_read_escape_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(&tmp);
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "../../etc/passwd"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.output.contains("escapes workspace"));
    }
}
