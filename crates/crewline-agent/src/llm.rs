pub mod anthropic;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Message types ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One content block. Blocks are canonicalized to these structs at the LLM
/// boundary; nothing downstream branches on dynamic shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
    /// Placeholder for vision input. Costs a fixed token estimate.
    Image {
        source: Value,
    },
}

fn is_false(b: &bool) -> bool {
    !b
}

impl Block {
    pub fn text(text: impl Into<String>) -> Self {
        Block::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Block::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn tool_error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Block::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Message content: either a bare string or a list of blocks. Serialized
/// untagged so the wire shape matches the messages API directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<Block>),
}

impl Content {
    /// Concatenated text of all text blocks (or the bare string).
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    Block::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Append blocks, converting bare-string content to a block list first.
    pub fn extend_blocks(&mut self, extra: Vec<Block>) {
        match self {
            Content::Blocks(blocks) => blocks.extend(extra),
            Content::Text(s) => {
                let mut blocks = vec![Block::text(std::mem::take(s))];
                blocks.extend(extra);
                *self = Content::Blocks(blocks);
            }
        }
    }

    /// Append a plain-text suffix to the content.
    pub fn push_text(&mut self, suffix: &str) {
        match self {
            Content::Text(s) => s.push_str(suffix),
            Content::Blocks(blocks) => {
                if let Some(Block::Text { text }) = blocks.last_mut() {
                    text.push_str(suffix);
                } else {
                    blocks.push(Block::text(suffix));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<Block>) -> Self {
        Self {
            role: Role::User,
            content: Content::Blocks(blocks),
        }
    }

    pub fn assistant_blocks(blocks: Vec<Block>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Blocks(blocks),
        }
    }

    /// Concatenated text content, ignoring tool blocks.
    pub fn text(&self) -> String {
        self.content.as_text()
    }
}

// ── Tool definition (sent to the LLM) ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

// ── Response ──

/// The stop-reason value the agent loop branches on. Any other value
/// terminates the turn.
pub const STOP_TOOL_USE: &str = "tool_use";

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<Block>,
    pub stop_reason: String,
}

impl LlmResponse {
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == STOP_TOOL_USE
    }
}

// ── Client trait ──

/// The single interface the core consumes. The wire protocol behind it is an
/// implementation detail of the client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<LlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_serde_tags() {
        let b = Block::tool_result("toolu_1", "ok");
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "toolu_1");
        assert!(json.get("is_error").is_none());

        let b = Block::tool_error("toolu_2", "Error: nope");
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["is_error"], true);

        let parsed: Block = serde_json::from_value(serde_json::json!({
            "type": "tool_use",
            "id": "toolu_3",
            "name": "bash",
            "input": {"command": "ls"}
        }))
        .unwrap();
        match parsed {
            Block::ToolUse { name, .. } => assert_eq!(name, "bash"),
            _ => panic!("expected tool_use"),
        }
    }

    #[test]
    fn test_content_untagged_roundtrip() {
        let m = Message::user("hello");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["content"], "hello");

        let m = Message::user_blocks(vec![Block::text("a"), Block::text("b")]);
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text(), "ab");
    }

    #[test]
    fn test_extend_blocks_converts_text() {
        let mut c = Content::Text("first".to_string());
        c.extend_blocks(vec![Block::text("second")]);
        match &c {
            Content::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            _ => panic!("expected blocks"),
        }
        assert_eq!(c.as_text(), "firstsecond");
    }

    #[test]
    fn test_push_text() {
        let mut c = Content::Text("base".to_string());
        c.push_text(" more");
        assert_eq!(c.as_text(), "base more");

        let mut c = Content::Blocks(vec![Block::text("base")]);
        c.push_text(" more");
        assert_eq!(c.as_text(), "base more");
    }

    #[test]
    fn test_wants_tools() {
        let r = LlmResponse {
            content: vec![],
            stop_reason: "tool_use".to_string(),
        };
        assert!(r.wants_tools());
        let r = LlmResponse {
            content: vec![],
            stop_reason: "end_turn".to_string(),
        };
        assert!(!r.wants_tools());
    }
}
