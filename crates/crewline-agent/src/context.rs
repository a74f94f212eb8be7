//! Three-layer transcript compression. Layer 1 placeholders old compactable
//! tool outputs in place; layer 2 archives the transcript, asks the LLM for
//! a summary, and rebuilds the conversation around it with a file-restore
//! cache; the spill layer keeps any single tool output bounded.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crewline_core::paths;

use crate::llm::{Block, Content, LlmClient, Message, Role};
use crate::tokens::{estimate_messages, estimate_str, truncate_at};
use crate::workspace::safe_path;

pub const KEEP_RECENT: usize = 3;
pub const KEEP_TAIL: usize = 5;
pub const MIN_SAVINGS: usize = 20_000;
pub const MAX_OUTPUT_TOKENS: usize = 40_000;

const DEFAULT_CONTEXT_WINDOW: usize = 200_000;
const DEFAULT_MAX_OUTPUT: usize = 16_384;
const THRESHOLD_HEADROOM: usize = 13_000;
const THRESHOLD_OUTPUT_CAP: usize = 20_000;

const MAX_RESTORE_FILES: usize = 5;
const MAX_RESTORE_TOKENS_PER_FILE: usize = 5_000;
const MAX_RESTORE_TOKENS_TOTAL: usize = 50_000;

/// Old tool outputs below this size are not worth placeholdering.
const MIN_COMPACT_TOKENS: usize = 250;
const COMPACT_PLACEHOLDER: &str = "[Output compacted - re-read if needed]";
const SPILL_PREVIEW_CHARS: usize = 2_000;
const SUMMARY_MAX_TOKENS: u32 = 2_000;
const SUMMARY_INPUT_CHARS: usize = 320_000;

/// Tools whose results can be placeholdered; the model can always re-run
/// them to recover the content.
const COMPACTABLE_TOOLS: &[&str] = &["bash", "read_file", "write_file", "edit_file"];

const SUMMARY_PROMPT: &str = "Summarize this conversation chronologically for continuity. \
Include: 1) Goals, 2) Actions taken, 3) Key decisions, 4) Current state, \
5) Pending work. Be concise but preserve critical details.";

pub struct ContextManager {
    workspace_dir: PathBuf,
    llm: Arc<dyn LlmClient>,
    context_window: usize,
    max_output: usize,
}

impl ContextManager {
    pub fn new(workspace_dir: &Path, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            workspace_dir: workspace_dir.to_path_buf(),
            llm,
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_output: DEFAULT_MAX_OUTPUT,
        }
    }

    pub fn with_window(mut self, context_window: usize, max_output: usize) -> Self {
        self.context_window = context_window;
        self.max_output = max_output;
        self
    }

    /// Dynamic compaction threshold: the window minus reserved output space
    /// and fixed headroom.
    pub fn token_threshold(&self) -> usize {
        self.context_window - self.max_output.min(THRESHOLD_OUTPUT_CAP) - THRESHOLD_HEADROOM
    }

    // ── Layer 1 ──

    /// Replace the content of old compactable tool results with a
    /// placeholder, keeping the most recent KEEP_RECENT intact. Mutates in
    /// place; message and tool-call structure is preserved.
    pub fn microcompact(&self, messages: &mut [Message]) {
        let mut tool_names: HashMap<String, String> = HashMap::new();
        for msg in messages.iter() {
            if msg.role != Role::Assistant {
                continue;
            }
            if let Content::Blocks(blocks) = &msg.content {
                for block in blocks {
                    if let Block::ToolUse { id, name, .. } = block {
                        tool_names.insert(id.clone(), name.clone());
                    }
                }
            }
        }

        // positions of every compactable tool_result, in transcript order
        let mut positions: Vec<(usize, usize)> = Vec::new();
        for (msg_idx, msg) in messages.iter().enumerate() {
            if msg.role != Role::User {
                continue;
            }
            if let Content::Blocks(blocks) = &msg.content {
                for (block_idx, block) in blocks.iter().enumerate() {
                    if let Block::ToolResult { tool_use_id, .. } = block {
                        let compactable = tool_names
                            .get(tool_use_id)
                            .map(|name| COMPACTABLE_TOOLS.contains(&name.as_str()))
                            .unwrap_or(false);
                        if compactable {
                            positions.push((msg_idx, block_idx));
                        }
                    }
                }
            }
        }

        if positions.len() <= KEEP_RECENT {
            return;
        }

        let mut compacted = 0;
        for &(msg_idx, block_idx) in &positions[..positions.len() - KEEP_RECENT] {
            if let Content::Blocks(blocks) = &mut messages[msg_idx].content {
                if let Block::ToolResult { content, .. } = &mut blocks[block_idx] {
                    if estimate_str(content) > MIN_COMPACT_TOKENS {
                        *content = COMPACT_PLACEHOLDER.to_string();
                        compacted += 1;
                    }
                }
            }
        }
        if compacted > 0 {
            debug!("microcompact placeholdered {} old tool results", compacted);
        }
    }

    // ── Layer 2 ──

    /// Compact only when over the threshold AND the tail-trim would
    /// actually save something. Short conversations never trigger.
    pub fn should_compact(&self, messages: &[Message]) -> bool {
        let total = estimate_messages(messages);
        if total <= self.token_threshold() {
            return false;
        }
        let tail_start = messages.len().saturating_sub(KEEP_TAIL);
        let tail = estimate_messages(&messages[tail_start..]);
        total - tail >= MIN_SAVINGS
    }

    /// Archive, summarize, and rebuild the transcript. The returned
    /// conversation is: compressed-summary user message, ack, restored-file
    /// pairs, then the last KEEP_TAIL original messages.
    pub async fn auto_compact(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        self.save_transcript(&messages)?;
        let restored = self.restore_recent_files(&messages);

        let conversation = serde_json::to_string(&messages)?;
        let prompt = format!(
            "{}\n\n{}",
            SUMMARY_PROMPT,
            truncate_at(&conversation, SUMMARY_INPUT_CHARS)
        );
        let response = self
            .llm
            .send("", &[Message::user(prompt)], &[], SUMMARY_MAX_TOKENS)
            .await
            .context("Summarization call failed during auto_compact")?;
        let summary = response
            .content
            .iter()
            .filter_map(|b| match b {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        info!(
            "auto_compact: {} messages -> summary + {} restored files + {} tail",
            messages.len(),
            restored.len(),
            KEEP_TAIL.min(messages.len())
        );

        let mut result = Vec::with_capacity(2 + restored.len() * 2 + KEEP_TAIL);
        result.push(Message::user(format!(
            "[Conversation compressed]\n\n{}",
            summary
        )));
        result.push(Message::assistant(
            "Understood. I have the context from the summary. Continuing.",
        ));
        for (path, content) in restored {
            result.push(Message::user(format!(
                "[Restored after compact] {}:\n{}",
                path, content
            )));
            result.push(Message::assistant("Noted."));
        }
        let tail_start = messages.len().saturating_sub(KEEP_TAIL);
        result.extend(messages[tail_start..].iter().cloned());
        Ok(result)
    }

    /// Append every message to the permanent archive, one JSON per line.
    pub fn save_transcript(&self, messages: &[Message]) -> Result<()> {
        use std::io::Write;
        let dir = paths::transcripts_dir(&self.workspace_dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = paths::transcript_archive_path(&self.workspace_dir);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        for message in messages {
            let line = serde_json::to_string(message)?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    /// Files recently read through the read_file tool, re-read from disk in
    /// most-recent-first order, bounded per file and in total.
    fn restore_recent_files(&self, messages: &[Message]) -> Vec<(String, String)> {
        let mut seen: Vec<String> = Vec::new();
        for msg in messages.iter().rev() {
            if msg.role != Role::Assistant {
                continue;
            }
            if let Content::Blocks(blocks) = &msg.content {
                for block in blocks.iter().rev() {
                    if let Block::ToolUse { name, input, .. } = block {
                        if name != "read_file" {
                            continue;
                        }
                        if let Some(path) = input.get("path").and_then(|v| v.as_str()) {
                            if !seen.iter().any(|p| p == path) {
                                seen.push(path.to_string());
                            }
                        }
                    }
                }
            }
        }

        let mut restored = Vec::new();
        let mut total_tokens = 0usize;
        for raw in seen {
            if restored.len() >= MAX_RESTORE_FILES || total_tokens >= MAX_RESTORE_TOKENS_TOTAL {
                break;
            }
            let Ok(path) = safe_path(&self.workspace_dir, &raw) else {
                continue;
            };
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let budget = MAX_RESTORE_TOKENS_PER_FILE.min(MAX_RESTORE_TOKENS_TOTAL - total_tokens);
            let clipped = truncate_at(&content, budget * 4).to_string();
            total_tokens += estimate_str(&clipped);
            restored.push((raw, clipped));
        }
        restored
    }

    // ── Spill layer ──

    /// Pass small outputs through; spill oversized ones to disk and hand
    /// the model a pointer plus a preview.
    pub fn handle_large_output(&self, text: String) -> String {
        let tokens = estimate_str(&text);
        if tokens <= MAX_OUTPUT_TOKENS {
            return text;
        }
        let ts = chrono::Utc::now().timestamp();
        let path = paths::spill_path(&self.workspace_dir, ts);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, &text) {
            warn!("failed to spill large output: {}", e);
            return text;
        }
        format!(
            "[Output too large: ~{} tokens. Full output saved to {}]\n\nPreview:\n{}",
            tokens,
            path.display(),
            truncate_at(&text, SPILL_PREVIEW_CHARS)
        )
    }
}
