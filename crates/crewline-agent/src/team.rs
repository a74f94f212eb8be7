//! Teams of persistent worker agents. Each teammate runs its own agent
//! loop in a background job, drains a file-based inbox, and cycles between
//! active and idle phases; idle workers auto-claim unclaimed board tasks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crewline_core::paths;

use crate::background::{JobFailure, JobKind, JobResult};
use crate::bus::{InboxMessage, MessageBus};
use crate::llm::{Block, Message};
use crate::runtime::{dispatch_tool_calls, inject_user_content, render_teammate_message, TodoNag};
use crate::todo::TodoList;
use crate::tools::{AgentContext, Caller, ToolContext, ToolRegistry};

const COLOR_PALETTE: &[&str] = &["cyan", "magenta", "yellow", "green", "blue", "red"];

const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Cap on LLM rounds within one active phase.
const MAX_ACTIVE_ROUNDS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeammateStatus {
    Active,
    Idle,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teammate {
    pub name: String,
    pub team_name: String,
    pub agent_id: String,
    pub status: TeammateStatus,
    pub inbox_path: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TeamConfig {
    name: String,
    members: Vec<Teammate>,
}

struct TeamState {
    name: String,
    config_path: PathBuf,
    members: HashMap<String, Teammate>,
}

impl TeamState {
    fn persist(&self) -> Result<()> {
        let mut members: Vec<Teammate> = self.members.values().cloned().collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        let config = TeamConfig {
            name: self.name.clone(),
            members,
        };
        let json = serde_json::to_string_pretty(&config)?;
        std::fs::write(&self.config_path, json)
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }
}

struct ManagerInner {
    teams: HashMap<String, TeamState>,
    color_cursor: usize,
}

pub struct TeammateManager {
    workspace: PathBuf,
    bus: Arc<MessageBus>,
    inner: Mutex<ManagerInner>,
    idle_timings: Mutex<(Duration, Duration)>,
}

impl TeammateManager {
    pub fn new(workspace: &std::path::Path, bus: Arc<MessageBus>) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            bus,
            inner: Mutex::new(ManagerInner {
                teams: HashMap::new(),
                color_cursor: 0,
            }),
            idle_timings: Mutex::new((DEFAULT_IDLE_POLL_INTERVAL, DEFAULT_IDLE_TIMEOUT)),
        }
    }

    /// Shrink the idle cycle, mainly for tests and short-lived sessions.
    pub fn set_idle_timings(&self, poll_interval: Duration, timeout: Duration) {
        *self.idle_timings.lock().unwrap() = (poll_interval, timeout);
    }

    pub fn idle_timings(&self) -> (Duration, Duration) {
        *self.idle_timings.lock().unwrap()
    }

    /// Rehydrate team state from `<workspace>/.teams/*/config.json`.
    /// Members come back with their persisted statuses; their workers do
    /// not (workers die with the process). Returns the team count.
    pub fn load_teams(&self) -> Result<usize> {
        let root = paths::teams_dir(&self.workspace);
        let Ok(entries) = std::fs::read_dir(&root) else {
            return Ok(0);
        };
        let mut loaded = 0;
        for entry in entries.flatten() {
            let config_path = entry.path().join("config.json");
            let Ok(raw) = std::fs::read_to_string(&config_path) else {
                continue;
            };
            let config: TeamConfig = match serde_json::from_str(&raw) {
                Ok(c) => c,
                Err(e) => {
                    warn!("skipping unreadable team config {:?}: {}", config_path, e);
                    continue;
                }
            };
            let mut members = HashMap::new();
            for member in config.members {
                self.bus.register(&member.name, &config.name)?;
                members.insert(member.name.clone(), member);
            }
            let mut inner = self.inner.lock().unwrap();
            inner.teams.insert(
                config.name.clone(),
                TeamState {
                    name: config.name,
                    config_path,
                    members,
                },
            );
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn create_team(&self, name: &str) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.teams.contains_key(name) {
            anyhow::bail!("Team '{}' already exists", name);
        }
        let dir = paths::team_dir(&self.workspace, name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let state = TeamState {
            name: name.to_string(),
            config_path: paths::team_config_path(&self.workspace, name),
            members: HashMap::new(),
        };
        state.persist()?;
        inner.teams.insert(name.to_string(), state);
        // the lead gets an inbox in every team it creates
        self.bus.register("lead", name)?;
        info!("team '{}' created", name);
        Ok(format!("Team '{}' created", name))
    }

    pub fn team_exists(&self, name: &str) -> bool {
        self.inner.lock().unwrap().teams.contains_key(name)
    }

    pub fn list_teams(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().unwrap().teams.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn member_names(&self, team: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let Some(state) = inner.teams.get(team) else {
            return Vec::new();
        };
        let mut names: Vec<String> = state.members.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn roster(&self, team: &str) -> Vec<Teammate> {
        let inner = self.inner.lock().unwrap();
        let Some(state) = inner.teams.get(team) else {
            return Vec::new();
        };
        let mut members: Vec<Teammate> = state.members.values().cloned().collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members
    }

    pub fn get_status(&self, team: &str, name: &str) -> Option<TeammateStatus> {
        let inner = self.inner.lock().unwrap();
        inner
            .teams
            .get(team)
            .and_then(|t| t.members.get(name))
            .map(|m| m.status)
    }

    pub fn set_status(
        &self,
        team: &str,
        name: &str,
        status: TeammateStatus,
        idle_reason: Option<&str>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let Some(state) = inner.teams.get_mut(team) else {
            return;
        };
        let Some(member) = state.members.get_mut(name) else {
            return;
        };
        member.status = status;
        member.idle_reason = idle_reason.map(String::from);
        if let Err(e) = state.persist() {
            warn!("failed to persist team '{}': {}", team, e);
        }
    }

    /// Spawn a worker into a team. Refuses duplicate names and unknown
    /// teams; the worker runs as a background job of kind teammate.
    pub fn spawn_teammate(
        &self,
        ctx: &AgentContext,
        name: &str,
        team_name: &str,
        prompt: &str,
    ) -> Result<String> {
        let teammate = {
            let mut inner = self.inner.lock().unwrap();
            let color_idx = inner.color_cursor % COLOR_PALETTE.len();
            let state = inner
                .teams
                .get_mut(team_name)
                .with_context(|| format!("Team '{}' not found", team_name))?;
            if let Some(existing) = state.members.get(name) {
                if existing.status != TeammateStatus::Shutdown {
                    anyhow::bail!(
                        "Teammate '{}' already exists in team '{}'",
                        name,
                        team_name
                    );
                }
            }
            let inbox = self.bus.register(name, team_name)?;
            let teammate = Teammate {
                name: name.to_string(),
                team_name: team_name.to_string(),
                agent_id: format!("{}@{}", name, team_name),
                status: TeammateStatus::Active,
                inbox_path: inbox.display().to_string(),
                color: COLOR_PALETTE[color_idx].to_string(),
                idle_reason: None,
            };
            state.members.insert(name.to_string(), teammate.clone());
            state.persist()?;
            // cursor advances only on successful spawn
            inner.color_cursor += 1;
            teammate
        };

        let worker_ctx = ctx.clone();
        let mate = teammate.clone();
        let prompt = prompt.to_string();
        ctx.background.run_in_background(JobKind::Teammate, async move {
            run_teammate_loop(worker_ctx, mate, prompt).await
        })?;

        info!("teammate '{}' spawned into '{}'", name, team_name);
        Ok(format!(
            "Spawned teammate '{}' ({})",
            teammate.name, teammate.agent_id
        ))
    }

    /// Request shutdown from every member and mark them. Workers observe
    /// the request on their next inbox drain and exit.
    pub async fn delete_team(&self, team_name: &str) -> Result<String> {
        let members: Vec<Teammate> = {
            let inner = self.inner.lock().unwrap();
            let state = inner
                .teams
                .get(team_name)
                .with_context(|| format!("Team '{}' not found", team_name))?;
            state.members.values().cloned().collect()
        };

        let sends = members
            .iter()
            .filter(|m| m.status != TeammateStatus::Shutdown)
            .map(|member| {
                let mut message =
                    InboxMessage::new("shutdown_request", "lead", "Team is being deleted.");
                message.request_id = Some(crate::tools::send_message::short_request_id());
                self.bus.send(
                    "lead",
                    Some(member.name.as_str()),
                    "Team is being deleted.",
                    "shutdown_request",
                    message,
                )
            });
        let notified = futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(|r| match r {
                Ok(_) => true,
                Err(e) => {
                    warn!("shutdown notification failed: {}", e);
                    false
                }
            })
            .count();

        for member in &members {
            self.set_status(team_name, &member.name, TeammateStatus::Shutdown, None);
        }

        info!("team '{}' deleted, {} member(s) notified", team_name, notified);
        Ok(format!(
            "Team '{}' deleted ({} member(s) notified)",
            team_name, notified
        ))
    }
}

// ── Teammate worker loop ──

enum InboxAction {
    Continue,
    Shutdown,
}

/// Fold drained inbox messages into the transcript. shutdown_request wins
/// immediately; plan approvals become plain verdict lines; everything else
/// is wrapped as a teammate-message block.
fn apply_inbox(messages: &mut Vec<Message>, inbox: &[InboxMessage]) -> InboxAction {
    let mut blocks = Vec::new();
    for msg in inbox {
        match msg.msg_type.as_str() {
            "shutdown_request" => return InboxAction::Shutdown,
            "plan_approval_response" => {
                if msg.approved == Some(true) {
                    blocks.push(Block::text("Plan APPROVED."));
                } else {
                    blocks.push(Block::text(format!("Plan REJECTED: {}", msg.content)));
                }
            }
            _ => blocks.push(Block::text(render_teammate_message(msg))),
        }
    }
    if !blocks.is_empty() {
        inject_user_content(messages, blocks);
    }
    InboxAction::Continue
}

/// After compression the teammate's identity lives only in the summary, so
/// it is pinned back onto the first message.
fn reinject_identity(messages: &mut Vec<Message>, mate: &Teammate) {
    let Some(first) = messages.first_mut() else {
        return;
    };
    first.content.push_text(&format!(
        "\n\nRemember: You are teammate '{}' ({}) in team '{}'.",
        mate.name, mate.agent_id, mate.team_name
    ));
}

/// The autonomous worker: active phase runs the normal turn machine, idle
/// phase polls for messages and unclaimed tasks, timeout shuts down.
async fn run_teammate_loop(ctx: AgentContext, mate: Teammate, prompt: String) -> JobResult {
    // the checklist is per-loop state; only the board is shared with the lead
    let ctx = {
        let mut ctx = ctx;
        ctx.todos = Arc::new(Mutex::new(TodoList::new()));
        ctx
    };
    let registry = ToolRegistry::for_teammate();
    let definitions = registry.definitions();
    let tool_ctx = ToolContext::new(
        ctx.clone(),
        Caller::Teammate {
            name: mate.name.clone(),
            team_name: mate.team_name.clone(),
        },
    );
    let system = format!(
        "You are teammate '{}' ({}) in team '{}', working at {}. Claim board \
         tasks, report results with SendMessage, and call the idle tool when \
         you have no more work.",
        mate.name,
        mate.agent_id,
        mate.team_name,
        ctx.workspace_dir.display()
    );

    let mut messages = vec![Message::user(prompt)];
    let mut nag = TodoNag::new();
    let shutdown = |reason: &str| {
        ctx.team
            .set_status(&mate.team_name, &mate.name, TeammateStatus::Shutdown, Some(reason));
    };

    loop {
        // ── active phase ──
        ctx.team
            .set_status(&mate.team_name, &mate.name, TeammateStatus::Active, None);
        let mut idle_reason = "no_tool_use";

        for _ in 0..MAX_ACTIVE_ROUNDS {
            let inbox = ctx.bus.check_inbox(&mate.name).await;
            if matches!(apply_inbox(&mut messages, &inbox), InboxAction::Shutdown) {
                shutdown("shutdown_request");
                return Ok(format!("Teammate '{}' shut down (requested)", mate.name));
            }

            ctx.context.microcompact(&mut messages);
            if ctx.context.should_compact(&messages) {
                match ctx.context.auto_compact(std::mem::take(&mut messages)).await {
                    Ok(compacted) => {
                        messages = compacted;
                        reinject_identity(&mut messages, &mate);
                    }
                    Err(e) => {
                        shutdown("compact_failed");
                        return Err(JobFailure::Error(format!("Error: {}", e)));
                    }
                }
            }

            if let Some(reminder) = nag.reminder(&registry, &ctx.todos) {
                inject_user_content(&mut messages, vec![reminder]);
            }

            let response = match ctx
                .llm
                .send(&system, &messages, &definitions, ctx.max_tokens)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    // a dead LLM must not spin the worker forever
                    warn!("teammate '{}' LLM failure: {}", mate.name, e);
                    shutdown("llm_error");
                    return Err(JobFailure::Error(format!("Error: {}", e)));
                }
            };
            messages.push(Message::assistant_blocks(response.content.clone()));

            if !response.wants_tools() {
                idle_reason = "no_tool_use";
                break;
            }

            let outcome = dispatch_tool_calls(&response.content, &registry, &tool_ctx).await;
            nag.observe(&registry, &ctx.todos, &outcome);
            messages.push(Message::user_blocks(outcome.results));

            if outcome.compact_requested {
                match ctx.context.auto_compact(std::mem::take(&mut messages)).await {
                    Ok(compacted) => {
                        messages = compacted;
                        reinject_identity(&mut messages, &mate);
                    }
                    Err(e) => {
                        shutdown("compact_failed");
                        return Err(JobFailure::Error(format!("Error: {}", e)));
                    }
                }
            }
            if outcome.idle_requested {
                idle_reason = "awaiting_tasks";
                break;
            }
        }

        // ── idle phase ──
        ctx.team.set_status(
            &mate.team_name,
            &mate.name,
            TeammateStatus::Idle,
            Some(idle_reason),
        );
        let (poll_interval, idle_timeout) = ctx.team.idle_timings();
        let polls = idle_timeout.as_millis() / poll_interval.as_millis().max(1);
        let mut resumed = false;

        for _ in 0..polls {
            tokio::time::sleep(poll_interval).await;

            let inbox = ctx.bus.check_inbox(&mate.name).await;
            if !inbox.is_empty() {
                if matches!(apply_inbox(&mut messages, &inbox), InboxAction::Shutdown) {
                    shutdown("shutdown_request");
                    return Ok(format!("Teammate '{}' shut down (requested)", mate.name));
                }
                resumed = true;
                break;
            }

            let unclaimed = ctx.board.unclaimed().unwrap_or_default();
            if let Some(task) = unclaimed.first() {
                if ctx.board.claim(&task.id, &mate.name).is_ok() {
                    info!("teammate '{}' auto-claimed task #{}", mate.name, task.id);
                    inject_user_content(
                        &mut messages,
                        vec![Block::text(format!(
                            "Unclaimed task auto-claimed - #{}: {}\n\n{}",
                            task.id, task.subject, task.description
                        ))],
                    );
                    resumed = true;
                    break;
                }
            }
        }

        if !resumed {
            shutdown("timeout");
            return Ok(format!("Teammate '{}' shut down (idle timeout)", mate.name));
        }
    }
}
