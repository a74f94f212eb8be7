use std::path::PathBuf;

/// Runtime configuration, resolved once at startup from the environment.
/// Nothing else is consulted after this point.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root directory all path-bound tools operate under.
    pub workspace_dir: PathBuf,
    /// API key for the LLM endpoint.
    pub api_key: String,
    /// Override for the LLM endpoint base URL (empty = provider default).
    pub base_url: Option<String>,
    /// Model id sent with every request.
    pub model: String,
    /// Max tokens requested per completion.
    pub max_tokens: u32,
    /// Explicit task-list id, if set.
    pub task_list: Option<String>,
    /// Default agent name used when a task goes in_progress with no owner.
    pub agent_name: Option<String>,
}

const DEFAULT_MAX_TOKENS: u32 = 16384;

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let workspace_dir = std::env::var("CREWLINE_WORKSPACE")
            .map(PathBuf::from)
            .ok()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| {
                dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
            });

        Self {
            workspace_dir,
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            base_url: std::env::var("ANTHROPIC_BASE_URL").ok(),
            model: std::env::var("MODEL_ID").unwrap_or_default(),
            max_tokens: std::env::var("CREWLINE_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_TOKENS),
            task_list: std::env::var("CREWLINE_TASK_LIST").ok().filter(|v| !v.is_empty()),
            agent_name: std::env::var("CREWLINE_AGENT_NAME").ok().filter(|v| !v.is_empty()),
        }
    }
}

/// Select the task-list id for a process: explicit config wins, then the
/// team name, then "default".
pub fn resolve_task_list(explicit: Option<&str>, team: Option<&str>) -> String {
    explicit
        .or(team)
        .filter(|s| !s.is_empty())
        .unwrap_or("default")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_task_list_order() {
        assert_eq!(resolve_task_list(Some("ops"), Some("beta")), "ops");
        assert_eq!(resolve_task_list(None, Some("beta")), "beta");
        assert_eq!(resolve_task_list(None, None), "default");
        assert_eq!(resolve_task_list(Some(""), None), "default");
    }
}
