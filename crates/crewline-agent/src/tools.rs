pub mod bash;
pub mod compact;
pub mod edit_file;
pub mod idle;
pub mod read_file;
pub mod send_message;
pub mod skill;
pub mod subagent_task;
pub mod task_crud;
pub mod task_output;
pub mod team_admin;
pub mod todo_write;
pub mod write_file;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crewline_core::config::{resolve_task_list, RuntimeConfig};
use crewline_core::paths;

use crate::background::BackgroundExecutor;
use crate::board::TaskBoard;
use crate::bus::MessageBus;
use crate::context::ContextManager;
use crate::llm::{LlmClient, ToolDefinition};
use crate::sandbox::SandboxPolicy;
use crate::subagent::SubagentKind;
use crate::team::TeammateManager;
use crate::todo::TodoList;

/// Shared handles for every subsystem. Cloned freely; all state is behind
/// Arcs so the lead, teammates, and subagents operate on the same board,
/// bus, and executor.
#[derive(Clone)]
pub struct AgentContext {
    pub workspace_dir: PathBuf,
    pub llm: Arc<dyn LlmClient>,
    pub board: Arc<TaskBoard>,
    pub background: Arc<BackgroundExecutor>,
    pub bus: Arc<MessageBus>,
    pub team: Arc<TeammateManager>,
    pub context: Arc<ContextManager>,
    pub todos: Arc<Mutex<TodoList>>,
    pub sandbox: SandboxPolicy,
    pub max_tokens: u32,
}

impl AgentContext {
    pub fn from_config(config: &RuntimeConfig, llm: Arc<dyn LlmClient>) -> Result<Self> {
        let workspace_dir = config.workspace_dir.clone();
        let list_id = resolve_task_list(config.task_list.as_deref(), None);
        let board = Arc::new(TaskBoard::open(
            &paths::tasks_dir(&workspace_dir, &list_id),
            config.agent_name.clone(),
        )?);
        let background = Arc::new(BackgroundExecutor::new(&workspace_dir));
        let bus = Arc::new(MessageBus::new(&workspace_dir));
        let team = Arc::new(TeammateManager::new(&workspace_dir, bus.clone()));
        let context = Arc::new(ContextManager::new(&workspace_dir, llm.clone()));
        Ok(Self {
            workspace_dir,
            llm,
            board,
            background,
            bus,
            team,
            context,
            todos: Arc::new(Mutex::new(TodoList::new())),
            sandbox: SandboxPolicy::default(),
            max_tokens: config.max_tokens,
        })
    }

    /// Context rooted at a plain workspace directory, with defaults for
    /// everything else. The main entry point for tests and embedders.
    pub fn for_workspace(workspace: &Path, llm: Arc<dyn LlmClient>) -> Result<Self> {
        let config = RuntimeConfig {
            workspace_dir: workspace.to_path_buf(),
            api_key: String::new(),
            base_url: None,
            model: String::new(),
            max_tokens: 8000,
            task_list: None,
            agent_name: None,
        };
        Self::from_config(&config, llm)
    }
}

/// Which agent is invoking a tool. Drives visibility filtering, inbox
/// identity, and task-claim ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Lead,
    Teammate { name: String, team_name: String },
    Subagent { kind: SubagentKind },
}

impl Caller {
    pub fn name(&self) -> &str {
        match self {
            Caller::Lead => "lead",
            Caller::Teammate { name, .. } => name,
            Caller::Subagent { .. } => "subagent",
        }
    }

    pub fn agent_id(&self) -> String {
        match self {
            Caller::Teammate { name, team_name } => format!("{}@{}", name, team_name),
            other => other.name().to_string(),
        }
    }
}

/// Context passed to every tool execution.
#[derive(Clone)]
pub struct ToolContext {
    pub agent: AgentContext,
    pub caller: Caller,
}

impl ToolContext {
    pub fn new(agent: AgentContext, caller: Caller) -> Self {
        Self { agent, caller }
    }
}

/// Result of a tool execution.
#[derive(Debug)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// Who may see a tool in their registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Lead only: team administration and background-job control, plus the
    /// subagent spawner (no recursion).
    LeadOnly,
    /// Lead and teammates.
    TeammateOk,
}

/// Trait for all agent tools.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn visibility(&self) -> Visibility {
        Visibility::TeammateOk
    }
    /// Read-only tools are the only ones explore/plan subagents see.
    fn read_only(&self) -> bool {
        false
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

/// Registry of available tools with per-agent visibility filtering.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

/// Teammate-workflow tools that make no sense inside a one-shot subagent.
const SUBAGENT_EXCLUDED: &[&str] = &["SendMessage", "idle", "claim_task"];

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Every built-in tool.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(bash::BashTool));
        registry.register(Arc::new(read_file::ReadFileTool));
        registry.register(Arc::new(write_file::WriteFileTool));
        registry.register(Arc::new(edit_file::EditFileTool));
        registry.register(Arc::new(todo_write::TodoWriteTool));
        registry.register(Arc::new(subagent_task::TaskTool));
        registry.register(Arc::new(task_crud::TaskCreateTool));
        registry.register(Arc::new(task_crud::TaskGetTool));
        registry.register(Arc::new(task_crud::TaskUpdateTool));
        registry.register(Arc::new(task_crud::TaskListTool));
        registry.register(Arc::new(task_output::TaskOutputTool));
        registry.register(Arc::new(task_output::TaskStopTool));
        registry.register(Arc::new(team_admin::TeamCreateTool));
        registry.register(Arc::new(team_admin::TeamDeleteTool));
        registry.register(Arc::new(send_message::SendMessageTool));
        registry.register(Arc::new(compact::CompactTool));
        registry.register(Arc::new(skill::LoadSkillTool));
        registry.register(Arc::new(idle::IdleTool));
        registry.register(Arc::new(idle::ClaimTaskTool));
        registry
    }

    /// The lead sees everything.
    pub fn for_lead() -> Self {
        Self::with_defaults()
    }

    /// Teammates: base tools, task CRUD, messaging. Never team admin,
    /// never the subagent spawner.
    pub fn for_teammate() -> Self {
        let mut registry = Self::with_defaults();
        registry.tools.retain(|t| t.visibility() == Visibility::TeammateOk);
        registry
    }

    /// Subagents: explore/plan get read-only tools, code gets working
    /// tools minus teammate messaging. The spawner itself is never listed.
    pub fn for_subagent(kind: SubagentKind) -> Self {
        let mut registry = Self::with_defaults();
        registry.tools.retain(|t| {
            if t.visibility() != Visibility::TeammateOk {
                return false;
            }
            match kind {
                SubagentKind::Explore | SubagentKind::Plan => t.read_only(),
                SubagentKind::Code => !SUBAGENT_EXCLUDED.contains(&t.name()),
            }
        });
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Tool definitions for sending to the LLM.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ── Shared argument helpers ──

pub(crate) fn required_str<'a>(args: &'a Value, key: &str, tool: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("{}: missing '{}' argument", tool, key))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let registry = ToolRegistry::with_defaults();
        let names = registry.tool_names();
        for expected in [
            "bash",
            "read_file",
            "write_file",
            "edit_file",
            "TodoWrite",
            "Task",
            "TaskCreate",
            "TaskGet",
            "TaskUpdate",
            "TaskList",
            "TaskOutput",
            "TaskStop",
            "TeamCreate",
            "SendMessage",
            "TeamDelete",
            "compact",
            "load_skill",
            "idle",
            "claim_task",
        ] {
            assert!(names.contains(&expected), "missing tool: {}", expected);
        }
        assert_eq!(names.len(), 19);
    }

    #[test]
    fn test_teammate_registry_excludes_lead_tools() {
        let registry = ToolRegistry::for_teammate();
        let names = registry.tool_names();
        assert!(!names.contains(&"TeamCreate"));
        assert!(!names.contains(&"TeamDelete"));
        assert!(!names.contains(&"TaskOutput"));
        assert!(!names.contains(&"TaskStop"));
        assert!(!names.contains(&"Task"));
        assert!(names.contains(&"bash"));
        assert!(names.contains(&"TodoWrite"));
        assert!(names.contains(&"TaskCreate"));
        assert!(names.contains(&"SendMessage"));
        assert!(names.contains(&"idle"));
        assert!(names.contains(&"claim_task"));
    }

    #[test]
    fn test_subagent_registries() {
        for kind in [SubagentKind::Explore, SubagentKind::Plan] {
            let registry = ToolRegistry::for_subagent(kind);
            let names = registry.tool_names();
            assert!(!names.contains(&"Task"), "no recursion for {:?}", kind);
            assert!(!names.contains(&"bash"));
            assert!(!names.contains(&"write_file"));
            assert!(names.contains(&"read_file"));
            assert!(names.contains(&"TaskList"));
        }

        let registry = ToolRegistry::for_subagent(SubagentKind::Code);
        let names = registry.tool_names();
        assert!(!names.contains(&"Task"));
        assert!(!names.contains(&"SendMessage"));
        assert!(!names.contains(&"idle"));
        assert!(names.contains(&"bash"));
        assert!(names.contains(&"write_file"));
    }

    #[test]
    fn test_definitions_format() {
        let registry = ToolRegistry::with_defaults();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 19);
        for def in &defs {
            assert!(!def.name.is_empty());
            assert!(!def.description.is_empty());
            assert_eq!(def.input_schema["type"], "object");
        }
    }

    #[test]
    fn test_caller_identity() {
        let caller = Caller::Teammate {
            name: "alice".to_string(),
            team_name: "beta".to_string(),
        };
        assert_eq!(caller.name(), "alice");
        assert_eq!(caller.agent_id(), "alice@beta");
        assert_eq!(Caller::Lead.agent_id(), "lead");
    }
}
