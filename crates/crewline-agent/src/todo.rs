//! The short in-memory checklist the model maintains through TodoWrite.
//! Distinct from board tasks: it does not survive the process and has a
//! single-in-progress rule.

use anyhow::Result;
use serde::{Deserialize, Serialize};

const MAX_ITEMS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn marker(self) -> &'static str {
        match self {
            TodoStatus::Pending => "[ ]",
            TodoStatus::InProgress => "[>]",
            TodoStatus::Completed => "[x]",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default = "default_status")]
    pub status: TodoStatus,
}

fn default_status() -> TodoStatus {
    TodoStatus::Pending
}

#[derive(Debug, Default)]
pub struct TodoList {
    items: Vec<TodoItem>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list after validation. Returns the rendered
    /// checklist on success.
    pub fn update(&mut self, items: Vec<TodoItem>) -> Result<String> {
        if items.len() > MAX_ITEMS {
            anyhow::bail!("Max {} todos allowed", MAX_ITEMS);
        }
        let mut validated = Vec::with_capacity(items.len());
        let mut in_progress = 0;
        for (i, mut item) in items.into_iter().enumerate() {
            item.text = item.text.trim().to_string();
            if item.text.is_empty() {
                anyhow::bail!("Item {}: text required", i + 1);
            }
            if item.id.is_empty() {
                item.id = (i + 1).to_string();
            }
            if item.status == TodoStatus::InProgress {
                in_progress += 1;
            }
            validated.push(item);
        }
        if in_progress > 1 {
            anyhow::bail!("Only one task can be in_progress at a time");
        }
        self.items = validated;
        Ok(self.render())
    }

    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "No todos.".to_string();
        }
        let mut lines: Vec<String> = self
            .items
            .iter()
            .map(|item| format!("{} #{}: {}", item.status.marker(), item.id, item.text))
            .collect();
        let done = self
            .items
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        lines.push(format!("\n({}/{} completed)", done, self.items.len()));
        lines.join("\n")
    }

    /// True when at least one item is not completed.
    pub fn has_open_items(&self) -> bool {
        self.items
            .iter()
            .any(|t| t.status != TodoStatus::Completed)
    }

    pub fn open_count(&self) -> usize {
        self.items
            .iter()
            .filter(|t| t.status != TodoStatus::Completed)
            .count()
    }
}
