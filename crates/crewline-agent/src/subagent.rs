//! Short-lived nested agents. A subagent runs with fresh messages and a
//! filtered tool set, shares the filesystem and board with its parent, and
//! returns only its final text. The parent's transcript stays clean.

use anyhow::Result;
use tracing::{info, warn};

use crate::background::{JobFailure, JobKind};
use crate::llm::Message;
use crate::runtime::dispatch_tool_calls;
use crate::tools::{AgentContext, Caller, ToolContext, ToolRegistry};

/// Safety limit on nested-loop rounds.
const MAX_SUBAGENT_ROUNDS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubagentKind {
    /// Read-only codebase exploration.
    Explore,
    /// Full working tools.
    Code,
    /// Read-only planning.
    Plan,
}

impl SubagentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "explore" => Some(SubagentKind::Explore),
            "code" => Some(SubagentKind::Code),
            "plan" => Some(SubagentKind::Plan),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubagentKind::Explore => "explore",
            SubagentKind::Code => "code",
            SubagentKind::Plan => "plan",
        }
    }
}

/// Run a subagent synchronously and return its final text summary.
pub async fn run_subagent(ctx: &AgentContext, kind: SubagentKind, prompt: &str) -> Result<String> {
    info!("subagent ({}) starting", kind.as_str());

    let registry = ToolRegistry::for_subagent(kind);
    let definitions = registry.definitions();
    // fresh checklist: a subagent's todos never leak into the caller's
    let mut sub_ctx = ctx.clone();
    sub_ctx.todos = std::sync::Arc::new(std::sync::Mutex::new(crate::todo::TodoList::new()));
    let tool_ctx = ToolContext::new(sub_ctx, Caller::Subagent { kind });
    let system = format!(
        "You are a focused {} subagent working at {}. Complete the given task, \
         then summarize your findings in your final reply.",
        kind.as_str(),
        ctx.workspace_dir.display()
    );

    let mut messages = vec![Message::user(prompt)];

    for round in 0..MAX_SUBAGENT_ROUNDS {
        let response = ctx
            .llm
            .send(&system, &messages, &definitions, ctx.max_tokens)
            .await?;
        messages.push(Message::assistant_blocks(response.content.clone()));

        if !response.wants_tools() {
            let summary = messages.last().map(|m| m.text()).unwrap_or_default();
            info!(
                "subagent ({}) finished after {} round(s), {}B summary",
                kind.as_str(),
                round + 1,
                summary.len()
            );
            return Ok(summary);
        }

        let outcome = dispatch_tool_calls(&response.content, &registry, &tool_ctx).await;
        messages.push(Message::user_blocks(outcome.results));
    }

    warn!("subagent ({}) hit round limit", kind.as_str());
    Ok("(Subagent reached the maximum number of rounds.)".to_string())
}

/// Dispatch a subagent as a background job; the result arrives through the
/// notification queue.
pub fn spawn_subagent_background(
    ctx: &AgentContext,
    kind: SubagentKind,
    prompt: String,
) -> Result<String> {
    let job_ctx = ctx.clone();
    ctx.background.run_in_background(JobKind::Agent, async move {
        match run_subagent(&job_ctx, kind, &prompt).await {
            Ok(summary) => Ok(summary),
            Err(e) => Err(JobFailure::Error(format!("Error: {}", e))),
        }
    })
}
