//! File-backed task board. Tasks live as `task_<N>.json` files so they
//! survive context compression; a `.highwatermark` file keeps id allocation
//! monotonic even across board reopens.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crewline_core::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Deleted,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "deleted" => Ok(TaskStatus::Deleted),
            other => anyhow::bail!("Invalid status: {}", other),
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            TaskStatus::Pending => "[ ]",
            TaskStatus::InProgress => "[>]",
            TaskStatus::Completed => "[x]",
            TaskStatus::Deleted => "[-]",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub active_form: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Field changes applied by `TaskBoard::update`. Unset fields are left alone.
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub active_form: Option<String>,
    pub owner: Option<String>,
    pub metadata: Option<serde_json::Map<String, Value>>,
    pub add_blocks: Vec<String>,
    pub add_blocked_by: Vec<String>,
}

pub struct TaskBoard {
    dir: PathBuf,
    default_owner: Option<String>,
    // serializes id allocation and read-modify-write cycles on task files
    inner: Mutex<u64>,
}

impl TaskBoard {
    /// Open (or create) the board directory, recovering the highwatermark
    /// from disk or from a filename scan.
    pub fn open(dir: &Path, default_owner: Option<String>) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create tasks dir {}", dir.display()))?;
        let highwatermark = read_highwatermark(dir).unwrap_or_else(|| scan_max_id(dir));
        debug!("task board opened at {} (highwatermark {})", dir.display(), highwatermark);
        Ok(Self {
            dir: dir.to_path_buf(),
            default_owner,
            inner: Mutex::new(highwatermark),
        })
    }

    pub fn create(
        &self,
        subject: &str,
        description: &str,
        active_form: Option<&str>,
        metadata: Option<serde_json::Map<String, Value>>,
    ) -> Result<Task> {
        let mut hw = self.inner.lock().unwrap();
        let id = *hw + 1;
        // persist the highwatermark before the task file so a concurrent
        // board opening on this directory never re-allocates the id
        write_highwatermark(&self.dir, id)?;
        *hw = id;

        let now = chrono::Utc::now().timestamp();
        let task = Task {
            id: id.to_string(),
            subject: subject.to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            active_form: active_form.unwrap_or("").to_string(),
            owner: String::new(),
            blocks: Vec::new(),
            blocked_by: Vec::new(),
            metadata: metadata.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        self.save(&task)?;
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Result<Option<Task>> {
        let _guard = self.inner.lock().unwrap();
        self.load(id)
    }

    /// Apply a patch. Graph merges are bidirectional; completing a task
    /// removes its id from every other task's blocked_by; deleting removes
    /// the file and returns a tombstone.
    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let _guard = self.inner.lock().unwrap();
        let mut task = self
            .load(id)?
            .with_context(|| format!("Task {} not found", id))?;

        if let Some(subject) = patch.subject {
            task.subject = subject;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(active_form) = patch.active_form {
            task.active_form = active_form;
        }
        if let Some(owner) = patch.owner {
            task.owner = owner;
        }
        if let Some(metadata) = patch.metadata {
            for (key, value) in metadata {
                if value.is_null() {
                    task.metadata.remove(&key);
                } else {
                    task.metadata.insert(key, value);
                }
            }
        }

        for other_id in &patch.add_blocks {
            if other_id == id {
                continue;
            }
            if !task.blocks.contains(other_id) {
                task.blocks.push(other_id.clone());
            }
            if let Some(mut other) = self.load(other_id)? {
                if !other.blocked_by.contains(&task.id) {
                    other.blocked_by.push(task.id.clone());
                    other.updated_at = chrono::Utc::now().timestamp();
                    self.save(&other)?;
                }
            }
        }
        for other_id in &patch.add_blocked_by {
            if other_id == id {
                continue;
            }
            if !task.blocked_by.contains(other_id) {
                task.blocked_by.push(other_id.clone());
            }
            if let Some(mut other) = self.load(other_id)? {
                if !other.blocks.contains(&task.id) {
                    other.blocks.push(task.id.clone());
                    other.updated_at = chrono::Utc::now().timestamp();
                    self.save(&other)?;
                }
            }
        }

        if let Some(status) = patch.status {
            task.status = status;
            match status {
                TaskStatus::Completed => self.clear_dependency(&task.id)?,
                TaskStatus::InProgress => {
                    if task.owner.is_empty() {
                        if let Some(default) = &self.default_owner {
                            task.owner = default.clone();
                        }
                    }
                }
                TaskStatus::Deleted => {
                    let path = self.task_file(&task.id);
                    std::fs::remove_file(&path)
                        .with_context(|| format!("Failed to delete {}", path.display()))?;
                    task.updated_at = chrono::Utc::now().timestamp();
                    return Ok(task);
                }
                TaskStatus::Pending => {}
            }
        }

        task.updated_at = chrono::Utc::now().timestamp();
        self.save(&task)?;
        Ok(task)
    }

    /// Atomic owner + in_progress.
    pub fn claim(&self, id: &str, owner: &str) -> Result<Task> {
        let _guard = self.inner.lock().unwrap();
        let mut task = self
            .load(id)?
            .with_context(|| format!("Task {} not found", id))?;
        task.owner = owner.to_string();
        task.status = TaskStatus::InProgress;
        task.updated_at = chrono::Utc::now().timestamp();
        self.save(&task)?;
        Ok(task)
    }

    /// All tasks in ascending id order.
    pub fn list_all(&self) -> Result<Vec<Task>> {
        let _guard = self.inner.lock().unwrap();
        self.list_unlocked()
    }

    /// Tasks a worker may auto-claim: pending, ownerless, unblocked.
    pub fn unclaimed(&self) -> Result<Vec<Task>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|t| {
                t.status == TaskStatus::Pending && t.owner.is_empty() && t.blocked_by.is_empty()
            })
            .collect())
    }

    fn list_unlocked(&self) -> Result<Vec<Task>> {
        let mut tasks: BTreeMap<u64, Task> = BTreeMap::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read tasks dir {}", self.dir.display()))?;
        for entry in entries.flatten() {
            let Some(id) = parse_task_filename(&entry.path()) else {
                continue;
            };
            match std::fs::read_to_string(entry.path())
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str::<Task>(&s).map_err(Into::into))
            {
                Ok(task) => {
                    tasks.insert(id, task);
                }
                Err(e) => warn!("skipping unreadable task file {:?}: {}", entry.path(), e),
            }
        }
        Ok(tasks.into_values().collect())
    }

    fn clear_dependency(&self, completed_id: &str) -> Result<()> {
        for mut task in self.list_unlocked()? {
            if task.id == completed_id {
                continue;
            }
            let before = task.blocked_by.len();
            task.blocked_by.retain(|b| b != completed_id);
            if task.blocked_by.len() != before {
                task.updated_at = chrono::Utc::now().timestamp();
                self.save(&task)?;
            }
        }
        Ok(())
    }

    fn task_file(&self, id: &str) -> PathBuf {
        let n: u64 = id.parse().unwrap_or(0);
        paths::task_path(&self.dir, n)
    }

    fn load(&self, id: &str) -> Result<Option<Task>> {
        let path = self.task_file(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let task = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(task))
    }

    /// Whole-file replace via a temp file so readers never observe a torn
    /// task record.
    fn save(&self, task: &Task) -> Result<()> {
        let path = self.task_file(&task.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(task)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

fn read_highwatermark(dir: &Path) -> Option<u64> {
    let content = std::fs::read_to_string(paths::highwatermark_path(dir)).ok()?;
    content.trim().parse().ok()
}

fn write_highwatermark(dir: &Path, value: u64) -> Result<()> {
    let path = paths::highwatermark_path(dir);
    std::fs::write(&path, value.to_string())
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn scan_max_id(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter_map(|e| parse_task_filename(&e.path()))
        .max()
        .unwrap_or(0)
}

fn parse_task_filename(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("task_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}
