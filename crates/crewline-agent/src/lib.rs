pub mod background;
pub mod board;
pub mod bus;
pub mod context;
pub mod llm;
pub mod runtime;
pub mod sandbox;
pub mod skills;
pub mod subagent;
pub mod team;
pub mod todo;
pub mod tokens;
pub mod tools;
pub mod workspace;

pub use tools::{AgentContext, Caller, ToolContext};
