use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crewline_agent::llm::anthropic::AnthropicClient;
use crewline_agent::llm::Message;
use crewline_agent::runtime::AgentLoop;
use crewline_agent::AgentContext;
use crewline_core::config::RuntimeConfig;

#[derive(Parser)]
#[command(name = "crewline", about = "Multi-agent coding assistant runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single prompt through the lead agent loop
    Run {
        /// The user prompt
        prompt: String,
        /// System prompt override
        #[arg(long)]
        system: Option<String>,
    },
    /// Show the task board
    Tasks,
    /// Show team rosters
    Team,
    /// List available skills
    Skills,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();

    match cli.command {
        Commands::Run { prompt, system } => {
            anyhow::ensure!(!config.model.is_empty(), "MODEL_ID is not set");
            let llm = Arc::new(AnthropicClient::new(
                &config.api_key,
                &config.model,
                config.base_url.as_deref(),
            ));
            let ctx = AgentContext::from_config(&config, llm)?;
            let system = system.unwrap_or_else(|| {
                format!(
                    "You are a coding agent at {}. Use tools to solve tasks; put \
                     multi-step work on the task board so teammates can pick it up.",
                    config.workspace_dir.display()
                )
            });

            let mut agent = AgentLoop::lead(ctx, system);
            let mut messages = vec![Message::user(prompt)];
            agent.run(&mut messages).await?;

            if let Some(last) = messages.last() {
                println!("{}", last.text());
            }
        }

        Commands::Tasks => {
            let ctx = noop_context(&config)?;
            let tasks = ctx.board.list_all()?;
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                let owner = if task.owner.is_empty() {
                    String::new()
                } else {
                    format!(" @{}", task.owner)
                };
                println!("{} #{}: {}{}", task.status.marker(), task.id, task.subject, owner);
            }
        }

        Commands::Team => {
            let ctx = noop_context(&config)?;
            ctx.team.load_teams()?;
            let teams = ctx.team.list_teams();
            if teams.is_empty() {
                println!("No teams.");
            }
            for team in teams {
                println!("Team: {}", team);
                for member in ctx.team.roster(&team) {
                    println!("  {} ({:?})", member.agent_id, member.status);
                }
            }
        }

        Commands::Skills => {
            for name in crewline_agent::skills::list_skills(&config.workspace_dir) {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

/// Context for read-only commands; no LLM calls are made.
fn noop_context(config: &RuntimeConfig) -> Result<AgentContext> {
    let llm = Arc::new(AnthropicClient::new("", "none", None));
    AgentContext::from_config(config, llm)
}
