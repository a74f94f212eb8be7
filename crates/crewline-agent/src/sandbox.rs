use std::time::Duration;

/// Coarse execution policy for the bash tool. Not a security boundary;
/// it catches the obviously destructive commands before they run.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// Substrings that cause a command to be refused outright.
    pub command_denylist: Vec<String>,
    /// Timeout for foreground bash commands.
    pub bash_timeout: Duration,
    /// Timeout for background bash jobs.
    pub background_timeout: Duration,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            command_denylist: default_denylist(),
            bash_timeout: Duration::from_secs(120),
            background_timeout: Duration::from_secs(300),
        }
    }
}

impl SandboxPolicy {
    /// Returns the matching denylist entry if the command is blocked.
    pub fn is_command_blocked(&self, command: &str) -> Option<&str> {
        self.command_denylist
            .iter()
            .find(|pattern| command.contains(pattern.as_str()))
            .map(|s| s.as_str())
    }
}

fn default_denylist() -> Vec<String> {
    ["rm -rf /", "sudo", "shutdown", "reboot", "> /dev/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
