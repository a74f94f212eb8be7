//! The per-turn orchestrator: compress, inject external events, call the
//! LLM, dispatch tools, repeat until the model stops asking for tools.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::background::Notification;
use crate::bus::InboxMessage;
use crate::llm::{Block, Message, Role};
use crate::tools::{Caller, ToolContext, ToolRegistry, ToolResult};

/// Runaway guard: one user prompt never burns more tool rounds than this.
pub const MAX_TOOL_ROUNDS: usize = 50;

/// Rounds without a TodoWrite call before the nag reminder fires.
const REMINDER_THRESHOLD: u32 = 3;

pub struct AgentLoop {
    ctx: ToolContext,
    registry: ToolRegistry,
    system_prompt: String,
    nag: TodoNag,
}

impl AgentLoop {
    /// The lead conversation: full registry, inbox identity "lead".
    pub fn lead(ctx: crate::tools::AgentContext, system_prompt: impl Into<String>) -> Self {
        Self {
            ctx: ToolContext::new(ctx, Caller::Lead),
            registry: ToolRegistry::for_lead(),
            system_prompt: system_prompt.into(),
            nag: TodoNag::new(),
        }
    }

    /// Process one user prompt to a stop point. On return the last message
    /// is an assistant message.
    pub async fn run(&mut self, messages: &mut Vec<Message>) -> Result<()> {
        let definitions = self.registry.definitions();
        let mut rounds = 0;

        loop {
            rounds += 1;
            if rounds > MAX_TOOL_ROUNDS {
                warn!("turn hit max tool rounds ({}), forcing stop", MAX_TOOL_ROUNDS);
                messages.push(Message::assistant(
                    "(Reached the maximum number of tool rounds for this turn.)",
                ));
                return Ok(());
            }

            // 1. compress
            self.ctx.agent.context.microcompact(messages);
            if self.ctx.agent.context.should_compact(messages) {
                let compacted = self
                    .ctx
                    .agent
                    .context
                    .auto_compact(std::mem::take(messages))
                    .await?;
                *messages = compacted;
            }

            // 2. inject external events
            let mut inject: Vec<Block> = Vec::new();
            if let Some(reminder) = self.nag.reminder(&self.registry, &self.ctx.agent.todos) {
                inject.push(reminder);
            }
            for notification in self.ctx.agent.background.drain_notifications() {
                inject.push(Block::text(render_notification(&notification)));
            }
            for message in self.ctx.agent.bus.check_inbox(&self.ctx.caller.agent_id()).await {
                inject.push(Block::text(render_teammate_message(&message)));
            }
            if !inject.is_empty() {
                inject_user_content(messages, inject);
            }

            // 3. LLM turn
            debug!("round {}: sending {} messages", rounds, messages.len());
            let response = self
                .ctx
                .agent
                .llm
                .send(
                    &self.system_prompt,
                    messages,
                    &definitions,
                    self.ctx.agent.max_tokens,
                )
                .await?;
            messages.push(Message::assistant_blocks(response.content.clone()));

            // 4. stop check
            if !response.wants_tools() {
                info!("turn complete after {} round(s)", rounds);
                return Ok(());
            }

            // 5. tool dispatch
            let outcome = dispatch_tool_calls(&response.content, &self.registry, &self.ctx).await;
            self.nag.observe(&self.registry, &self.ctx.agent.todos, &outcome);

            // 6. append results and loop
            messages.push(Message::user_blocks(outcome.results));

            if outcome.compact_requested {
                let compacted = self
                    .ctx
                    .agent
                    .context
                    .auto_compact(std::mem::take(messages))
                    .await?;
                *messages = compacted;
            }
        }
    }
}

/// Nag counter shared by the lead loop and teammate workers: after three
/// rounds without a TodoWrite while the list has open items, the next
/// injected user content leads with a reminder.
pub(crate) struct TodoNag {
    rounds_without_todo: u32,
}

impl TodoNag {
    pub(crate) fn new() -> Self {
        Self {
            rounds_without_todo: 0,
        }
    }

    /// The reminder block to prepend to this turn's injected content, if due.
    pub(crate) fn reminder(
        &self,
        registry: &ToolRegistry,
        todos: &std::sync::Mutex<crate::todo::TodoList>,
    ) -> Option<Block> {
        if registry.contains("TodoWrite") && self.rounds_without_todo >= REMINDER_THRESHOLD {
            let todos = todos.lock().unwrap();
            if todos.has_open_items() {
                return Some(Block::text(render_todo_reminder(todos.open_count())));
            }
        }
        None
    }

    /// Account for one round of tool dispatch: TodoWrite resets the
    /// counter, any other round with open items advances it.
    pub(crate) fn observe(
        &mut self,
        registry: &ToolRegistry,
        todos: &std::sync::Mutex<crate::todo::TodoList>,
        outcome: &DispatchOutcome,
    ) {
        if !registry.contains("TodoWrite") {
            return;
        }
        if outcome.todo_updated {
            self.rounds_without_todo = 0;
        } else if todos.lock().unwrap().has_open_items() {
            self.rounds_without_todo += 1;
        }
    }
}

/// What happened during one round of tool dispatch.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub results: Vec<Block>,
    pub compact_requested: bool,
    pub idle_requested: bool,
    pub todo_updated: bool,
}

/// Execute every tool_use block in listed order and collect tool_result
/// blocks. Handler failures become error results; the loop never aborts on
/// a tool.
pub async fn dispatch_tool_calls(
    content: &[Block],
    registry: &ToolRegistry,
    ctx: &ToolContext,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for block in content {
        let Block::ToolUse { id, name, input } = block else {
            continue;
        };

        if name == "compact" {
            outcome.compact_requested = true;
        }
        if name == "idle" {
            outcome.idle_requested = true;
        }

        let result = match registry.get(name) {
            None => ToolResult::error(format!("Unknown tool: {}", name)),
            Some(tool) => match tool.execute(input.clone(), ctx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("tool {} failed: {}", name, e);
                    ToolResult::error(format!("Error: {}", e))
                }
            },
        };

        if name == "TodoWrite" && !result.is_error {
            outcome.todo_updated = true;
        }

        debug!(
            "tool {} -> {} bytes, error={}",
            name,
            result.output.len(),
            result.is_error
        );

        let output = ctx.agent.context.handle_large_output(result.output);
        outcome.results.push(if result.is_error {
            Block::tool_error(id.clone(), output)
        } else {
            Block::tool_result(id.clone(), output)
        });
    }

    outcome
}

/// Merge injected event blocks into the trailing user message, or start a
/// new one. Keeps strict user/assistant alternation for the LLM interface.
pub fn inject_user_content(messages: &mut Vec<Message>, blocks: Vec<Block>) {
    match messages.last_mut() {
        Some(last) if last.role == Role::User => last.content.extend_blocks(blocks),
        _ => messages.push(Message::user_blocks(blocks)),
    }
}

/// In-transcript XML for a background-job completion. Non-editable:
/// micro-compact never rewrites these (they are plain text blocks, not
/// tool results).
pub fn render_notification(n: &Notification) -> String {
    format!(
        "<task-notification>\n  <task-id>{}</task-id>\n  <task-type>{}</task-type>\n  <status>{}</status>\n  <summary>{}</summary>\n  <output-file>{}</output-file>\n</task-notification>",
        n.task_id,
        n.kind.as_str(),
        n.status,
        n.summary,
        n.output_file
    )
}

pub fn render_teammate_message(message: &InboxMessage) -> String {
    format!(
        "<teammate-message sender=\"{}\" type=\"{}\">{}</teammate-message>",
        message.sender, message.msg_type, message.content
    )
}

fn render_todo_reminder(open: usize) -> String {
    format!(
        "<reminder>Your todo list has {} open item(s). Use TodoWrite to update progress before continuing.</reminder>",
        open
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::JobKind;
    use crate::llm::{Content, LlmResponse};
    use crate::testutil::{FailingClient, ScriptedClient};
    use crate::tools::AgentContext;
    use std::sync::Arc;

    fn lead_loop(tmp: &tempfile::TempDir, responses: Vec<LlmResponse>) -> AgentLoop {
        let llm = Arc::new(ScriptedClient::new(responses));
        let ctx = AgentContext::for_workspace(tmp.path(), llm).unwrap();
        AgentLoop::lead(ctx, "You are a coding agent.")
    }

    #[tokio::test]
    async fn test_single_turn_bash_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let mut agent = lead_loop(
            &tmp,
            vec![
                ScriptedClient::tool_use("t1", "bash", serde_json::json!({"command": "echo hi"})),
                ScriptedClient::text("Done", "end_turn"),
            ],
        );

        let mut messages = vec![Message::user("run: echo hi")];
        agent.run(&mut messages).await.unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].role, Role::Assistant);
        assert_eq!(messages[3].text(), "Done");
        // the tool result carries the bash output with the matching id
        match &messages[2].content {
            Content::Blocks(blocks) => match &blocks[0] {
                Block::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    assert_eq!(tool_use_id, "t1");
                    assert_eq!(content, "hi");
                    assert!(!is_error);
                }
                _ => panic!("expected tool_result"),
            },
            _ => panic!("expected blocks"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_and_continue() {
        let tmp = tempfile::tempdir().unwrap();
        let mut agent = lead_loop(
            &tmp,
            vec![
                ScriptedClient::tool_use("t1", "teleport", serde_json::json!({})),
                ScriptedClient::text("Recovered", "end_turn"),
            ],
        );
        let mut messages = vec![Message::user("go")];
        agent.run(&mut messages).await.unwrap();

        match &messages[2].content {
            Content::Blocks(blocks) => match &blocks[0] {
                Block::ToolResult {
                    content, is_error, ..
                } => {
                    assert_eq!(content, "Unknown tool: teleport");
                    assert!(is_error);
                }
                _ => panic!("expected tool_result"),
            },
            _ => panic!("expected blocks"),
        }
        assert_eq!(messages.last().unwrap().text(), "Recovered");
    }

    #[tokio::test]
    async fn test_tool_error_surfaces_not_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut agent = lead_loop(
            &tmp,
            vec![
                // bash with missing command argument -> handler Err
                ScriptedClient::tool_use("t1", "bash", serde_json::json!({})),
                ScriptedClient::text("Handled", "end_turn"),
            ],
        );
        let mut messages = vec![Message::user("go")];
        agent.run(&mut messages).await.unwrap();

        match &messages[2].content {
            Content::Blocks(blocks) => match &blocks[0] {
                Block::ToolResult {
                    content, is_error, ..
                } => {
                    assert!(content.starts_with("Error:"));
                    assert!(is_error);
                }
                _ => panic!("expected tool_result"),
            },
            _ => panic!("expected blocks"),
        }
    }

    #[tokio::test]
    async fn test_notifications_injected_as_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut agent = lead_loop(&tmp, vec![ScriptedClient::text("ok", "end_turn")]);

        // two completed jobs before the turn starts
        for output in ["first", "second"] {
            let id = agent
                .ctx
                .agent
                .background
                .run_in_background(JobKind::Bash, async move { Ok(output.to_string()) })
                .unwrap();
            agent
                .ctx
                .agent
                .background
                .get_output(&id, true, Some(5000))
                .await
                .unwrap();
        }

        let mut messages = vec![Message::user("status?")];
        agent.run(&mut messages).await.unwrap();

        // injected into the trailing user message as text blocks
        let injected = messages[0].text();
        assert_eq!(injected.matches("<task-notification>").count(), 2);
        assert!(injected.contains("<task-id>b"));
        assert!(injected.contains("<summary>first</summary>"));
        assert!(agent.ctx.agent.background.drain_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_inbox_injected_for_lead() {
        let tmp = tempfile::tempdir().unwrap();
        let mut agent = lead_loop(&tmp, vec![ScriptedClient::text("ok", "end_turn")]);
        agent.ctx.agent.bus.register("lead", "beta").unwrap();
        agent
            .ctx
            .agent
            .bus
            .send_simple("alice@beta", "lead", "done with #3", "message")
            .await
            .unwrap();

        let mut messages = vec![Message::user("check in")];
        agent.run(&mut messages).await.unwrap();

        let injected = messages[0].text();
        assert!(injected.contains("<teammate-message sender=\"alice@beta\" type=\"message\">done with #3</teammate-message>"));
    }

    #[tokio::test]
    async fn test_manual_compact_tool() {
        let tmp = tempfile::tempdir().unwrap();
        let mut agent = lead_loop(
            &tmp,
            vec![
                ScriptedClient::tool_use("t1", "compact", serde_json::json!({})),
                ScriptedClient::text("A summary of everything so far.", "end_turn"),
                ScriptedClient::text("Continuing.", "end_turn"),
            ],
        );
        let mut messages = vec![Message::user("please compact")];
        agent.run(&mut messages).await.unwrap();

        assert!(messages[0]
            .text()
            .starts_with("[Conversation compressed]"));
        assert_eq!(messages.last().unwrap().text(), "Continuing.");
        assert_eq!(messages.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_todo_reminder_after_three_idle_rounds() {
        let tmp = tempfile::tempdir().unwrap();
        let todo_input = serde_json::json!({"todos": [
            {"text": "big refactor", "status": "in_progress"}
        ]});
        let bash = serde_json::json!({"command": "true"});
        let mut agent = lead_loop(
            &tmp,
            vec![
                ScriptedClient::tool_use("t0", "TodoWrite", todo_input),
                ScriptedClient::tool_use("t1", "bash", bash.clone()),
                ScriptedClient::tool_use("t2", "bash", bash.clone()),
                ScriptedClient::tool_use("t3", "bash", bash.clone()),
                ScriptedClient::tool_use("t4", "bash", bash),
                ScriptedClient::text("wrapping up", "end_turn"),
            ],
        );
        let mut messages = vec![Message::user("do the refactor")];
        agent.run(&mut messages).await.unwrap();

        let full: String = messages.iter().map(|m| m.text()).collect();
        assert!(full.contains("<reminder>"));
        assert!(full.contains("TodoWrite"));
    }

    #[tokio::test]
    async fn test_no_reminder_when_list_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let bash = serde_json::json!({"command": "true"});
        let mut agent = lead_loop(
            &tmp,
            vec![
                ScriptedClient::tool_use("t1", "bash", bash.clone()),
                ScriptedClient::tool_use("t2", "bash", bash.clone()),
                ScriptedClient::tool_use("t3", "bash", bash.clone()),
                ScriptedClient::tool_use("t4", "bash", bash),
                ScriptedClient::text("done", "end_turn"),
            ],
        );
        let mut messages = vec![Message::user("just run things")];
        agent.run(&mut messages).await.unwrap();
        let full: String = messages.iter().map(|m| m.text()).collect();
        assert!(!full.contains("<reminder>"));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let llm = Arc::new(FailingClient);
        let ctx = AgentContext::for_workspace(tmp.path(), llm).unwrap();
        let mut agent = AgentLoop::lead(ctx, "sys");
        let mut messages = vec![Message::user("hi")];
        assert!(agent.run(&mut messages).await.is_err());
    }

    #[tokio::test]
    async fn test_round_cap_ends_with_assistant() {
        let tmp = tempfile::tempdir().unwrap();
        let responses: Vec<LlmResponse> = (0..MAX_TOOL_ROUNDS + 5)
            .map(|i| {
                ScriptedClient::tool_use(
                    &format!("t{}", i),
                    "bash",
                    serde_json::json!({"command": "true"}),
                )
            })
            .collect();
        let mut agent = lead_loop(&tmp, responses);
        let mut messages = vec![Message::user("loop forever")];
        agent.run(&mut messages).await.unwrap();
        assert_eq!(messages.last().unwrap().role, Role::Assistant);
        assert!(messages.last().unwrap().text().contains("maximum"));
    }

    #[test]
    fn test_todo_nag_counter() {
        let registry = ToolRegistry::for_teammate();
        let todos = std::sync::Mutex::new(crate::todo::TodoList::new());
        todos
            .lock()
            .unwrap()
            .update(vec![crate::todo::TodoItem {
                id: String::new(),
                text: "refactor".to_string(),
                status: crate::todo::TodoStatus::InProgress,
            }])
            .unwrap();

        let mut nag = TodoNag::new();
        let quiet_round = DispatchOutcome::default();
        let todo_round = DispatchOutcome {
            todo_updated: true,
            ..Default::default()
        };

        for _ in 0..REMINDER_THRESHOLD {
            assert!(nag.reminder(&registry, &todos).is_none());
            nag.observe(&registry, &todos, &quiet_round);
        }
        assert!(nag.reminder(&registry, &todos).is_some());

        // a TodoWrite round resets the counter
        nag.observe(&registry, &todos, &todo_round);
        assert!(nag.reminder(&registry, &todos).is_none());

        // no nagging once the list is clear
        nag.observe(&registry, &todos, &quiet_round);
        nag.observe(&registry, &todos, &quiet_round);
        nag.observe(&registry, &todos, &quiet_round);
        todos
            .lock()
            .unwrap()
            .update(vec![crate::todo::TodoItem {
                id: String::new(),
                text: "refactor".to_string(),
                status: crate::todo::TodoStatus::Completed,
            }])
            .unwrap();
        assert!(nag.reminder(&registry, &todos).is_none());
    }

    #[test]
    fn test_inject_merges_into_trailing_user() {
        let mut messages = vec![Message::user("tail")];
        inject_user_content(&mut messages, vec![Block::text("event")]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "tailevent");

        let mut messages = vec![Message::user("q"), Message::assistant("a")];
        inject_user_content(&mut messages, vec![Block::text("event")]);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::User);
    }

    #[test]
    fn test_notification_render_shape() {
        let n = Notification {
            task_id: "b2a9e1".to_string(),
            kind: JobKind::Bash,
            status: crate::background::JobStatus::Completed,
            summary: "hi".to_string(),
            output_file: ".task_outputs/b2a9e1.txt".to_string(),
        };
        let xml = render_notification(&n);
        assert!(xml.starts_with("<task-notification>"));
        assert!(xml.contains("<task-id>b2a9e1</task-id>"));
        assert!(xml.contains("<task-type>bash</task-type>"));
        assert!(xml.contains("<status>completed</status>"));
        assert!(xml.contains("<output-file>.task_outputs/b2a9e1.txt</output-file>"));
    }
}
