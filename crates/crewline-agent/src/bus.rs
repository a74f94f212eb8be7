//! Per-recipient JSONL inboxes with advisory file locking. One inbox file
//! per agent, colocated with its team directory; a send appends one compact
//! JSON line, a drain reads and truncates the whole file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crewline_core::paths;

pub const VALID_TYPES: &[&str] = &[
    "message",
    "broadcast",
    "shutdown_request",
    "shutdown_response",
    "plan_approval_response",
];

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const LOCK_DEADLINE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub content: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    /// Extra protocol fields (e.g. `reason`) ride along untyped.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl InboxMessage {
    pub fn new(msg_type: &str, sender: &str, content: &str) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            sender: sender.to_string(),
            recipient: None,
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            request_id: None,
            approved: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Recipient {
    name: String,
    inbox: PathBuf,
}

pub struct MessageBus {
    workspace: PathBuf,
    recipients: Mutex<HashMap<String, Recipient>>,
}

impl MessageBus {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            recipients: Mutex::new(HashMap::new()),
        }
    }

    /// Register a recipient's inbox within a team directory. Idempotent;
    /// re-registration moves the name to the new team.
    pub fn register(&self, name: &str, team: &str) -> Result<PathBuf> {
        let inbox = paths::inbox_path(&self.workspace, team, name);
        if let Some(parent) = inbox.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut recipients = self.recipients.lock().unwrap();
        recipients.insert(
            name.to_string(),
            Recipient {
                name: name.to_string(),
                inbox: inbox.clone(),
            },
        );
        Ok(inbox)
    }

    pub fn unregister(&self, name: &str) {
        self.recipients.lock().unwrap().remove(name);
    }

    pub fn known_recipients(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .recipients
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Deliver a message. Broadcasts go to every known recipient except the
    /// sender; all other types require a registered recipient.
    pub async fn send(
        &self,
        sender: &str,
        recipient: Option<&str>,
        content: &str,
        msg_type: &str,
        mut message: InboxMessage,
    ) -> Result<String> {
        if !VALID_TYPES.contains(&msg_type) {
            anyhow::bail!("Invalid type '{}'", msg_type);
        }
        message.msg_type = msg_type.to_string();
        message.sender = sender.to_string();
        message.content = content.to_string();

        if msg_type == "broadcast" {
            let sender_name = split_agent_name(sender);
            let targets: Vec<Recipient> = {
                let recipients = self.recipients.lock().unwrap();
                recipients
                    .values()
                    .filter(|r| r.name != sender_name)
                    .cloned()
                    .collect()
            };
            message.recipient = None;
            let mut delivered = 0;
            for target in targets {
                self.append(&target.inbox, &message).await?;
                delivered += 1;
            }
            return Ok(format!("Broadcast to {} recipients", delivered));
        }

        let to = recipient.unwrap_or_default();
        let target = self
            .lookup(to)
            .with_context(|| format!("recipient not found: {}", to))?;
        message.recipient = Some(target.name.clone());
        self.append(&target.inbox, &message).await?;
        Ok(format!("Sent {} to {}", msg_type, target.name))
    }

    /// Convenience for plain messages.
    pub async fn send_simple(
        &self,
        sender: &str,
        recipient: &str,
        content: &str,
        msg_type: &str,
    ) -> Result<String> {
        self.send(
            sender,
            Some(recipient),
            content,
            msg_type,
            InboxMessage::new(msg_type, sender, content),
        )
        .await
    }

    /// Drain an inbox: read every line, skip malformed ones, truncate the
    /// file. Lock contention degrades to an empty result; the caller polls
    /// again next turn.
    pub async fn check_inbox(&self, name: &str) -> Vec<InboxMessage> {
        let Some(target) = self.lookup(name) else {
            return Vec::new();
        };
        if !target.inbox.exists() {
            return Vec::new();
        }

        let lock = match self.acquire_lock(&target.inbox).await {
            Ok(lock) => lock,
            Err(_) => {
                debug!("inbox lock contention for {}, returning empty", name);
                return Vec::new();
            }
        };

        let content = tokio::fs::read_to_string(&target.inbox)
            .await
            .unwrap_or_default();
        let messages: Vec<InboxMessage> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!("skipping malformed inbox line for {}: {}", name, e);
                    None
                }
            })
            .collect();

        if let Err(e) = tokio::fs::write(&target.inbox, "").await {
            warn!("failed to truncate inbox for {}: {}", name, e);
        }
        drop(lock);
        messages
    }

    fn lookup(&self, name: &str) -> Option<Recipient> {
        let recipients = self.recipients.lock().unwrap();
        if let Some(r) = recipients.get(name) {
            return Some(r.clone());
        }
        // accept "name@team" agent ids for plain-name registrations
        let plain = split_agent_name(name);
        recipients.get(plain).cloned()
    }

    async fn append(&self, inbox: &Path, message: &InboxMessage) -> Result<()> {
        let line = serde_json::to_string(message)?;
        // best-effort lock; liveness wins over exclusivity on deadline expiry
        let lock = self.acquire_lock(inbox).await.ok();
        let result = append_line(inbox, &line).await;
        drop(lock);
        result
    }

    async fn acquire_lock(&self, inbox: &Path) -> Result<LockGuard> {
        let lock_path = lock_path_for(inbox);
        let deadline = tokio::time::Instant::now() + LOCK_DEADLINE;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(LockGuard { path: lock_path }),
                Err(_) => {
                    if tokio::time::Instant::now() >= deadline {
                        anyhow::bail!("lock deadline expired for {}", lock_path.display());
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
            }
        }
    }
}

fn split_agent_name(agent_id: &str) -> &str {
    agent_id.split('@').next().unwrap_or(agent_id)
}

fn lock_path_for(inbox: &Path) -> PathBuf {
    let mut name = inbox.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    inbox.with_file_name(name)
}

async fn append_line(inbox: &Path, line: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(inbox)
        .await
        .with_context(|| format!("Failed to open {}", inbox.display()))?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
