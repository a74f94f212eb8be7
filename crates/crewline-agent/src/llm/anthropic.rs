use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Block, LlmClient, LlmResponse, Message, Role, ToolDefinition};

const DEFAULT_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// LlmClient speaking the Anthropic-style messages HTTP API.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<&'a Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<&'a ToolDefinition>,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<Block>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// System role messages never cross the wire; the system prompt is a
/// top-level request field.
fn wire_messages(messages: &[Message]) -> Vec<&Message> {
    messages.iter().filter(|m| m.role != Role::System).collect()
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<LlmResponse> {
        let request = ApiRequest {
            model: &self.model,
            max_tokens,
            messages: wire_messages(messages),
            system: if system.is_empty() { None } else { Some(system) },
            tools: tools.iter().collect(),
        };

        debug!(
            "llm request: model={} messages={} tools={}",
            self.model,
            request.messages.len(),
            tools.len()
        );

        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "LLM endpoint returned {}: {}",
                status,
                &body[..body.len().min(500)]
            );
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        Ok(LlmResponse {
            content: api_response.content,
            stop_reason: api_response.stop_reason.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Content;

    #[test]
    fn test_wire_messages_drops_system() {
        let msgs = vec![
            Message {
                role: Role::System,
                content: Content::Text("sys".to_string()),
            },
            Message::user("hi"),
        ];
        let wire = wire_messages(&msgs);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].text(), "hi");
    }

    #[test]
    fn test_request_shape() {
        let messages = vec![Message::user("run: echo hi")];
        let tools = vec![ToolDefinition {
            name: "bash".to_string(),
            description: "Run a shell command.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"]
            }),
        }];
        let request = ApiRequest {
            model: "test-model",
            max_tokens: 8000,
            messages: wire_messages(&messages),
            system: Some("You are a coding agent."),
            tools: tools.iter().collect(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "run: echo hi");
        assert_eq!(json["tools"][0]["name"], "bash");
        assert!(json["tools"][0]["input_schema"]["properties"]["command"].is_object());
    }

    #[test]
    fn test_response_parse_tool_use() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "Running it."},
                {"type": "tool_use", "id": "toolu_1", "name": "bash",
                 "input": {"command": "echo hi"}}
            ],
            "stop_reason": "tool_use"
        });
        let parsed: ApiResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(parsed.content.len(), 2);
        match &parsed.content[1] {
            Block::ToolUse { name, input, .. } => {
                assert_eq!(name, "bash");
                assert_eq!(input["command"], "echo hi");
            }
            _ => panic!("expected tool_use block"),
        }
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = AnthropicClient::new("k", "m", Some("http://localhost:8080/"));
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
