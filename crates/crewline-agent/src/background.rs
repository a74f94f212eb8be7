//! Fire-and-forget job runner. Jobs are spawned tokio tasks; completions
//! land in a notification queue the lead drains at the top of each turn.

use anyhow::{Context, Result};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tokens::truncate_at;

const NOTIFICATION_SUMMARY_CHARS: usize = 500;
const DEFAULT_OUTPUT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Bash,
    Agent,
    Teammate,
}

impl JobKind {
    fn prefix(self) -> char {
        match self {
            JobKind::Bash => 'b',
            JobKind::Agent => 'a',
            JobKind::Teammate => 't',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Bash => "bash",
            JobKind::Agent => "agent",
            JobKind::Teammate => "teammate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Stopped,
    Error,
    Timeout,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Stopped => "stopped",
            JobStatus::Error => "error",
            JobStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// How a job closure ended. Timeouts are a distinct terminal status, not a
/// generic error.
#[derive(Debug)]
pub enum JobFailure {
    Timeout(String),
    Error(String),
}

pub type JobResult = std::result::Result<String, JobFailure>;

struct Job {
    kind: JobKind,
    output: String,
    output_path: PathBuf,
    output_file: String,
    status_tx: watch::Sender<JobStatus>,
    status_rx: watch::Receiver<JobStatus>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub task_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// First ≤500 chars of the captured output.
    pub summary: String,
    /// Workspace-relative output file path.
    pub output_file: String,
}

#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub task_id: String,
    pub status: JobStatus,
    pub output: String,
}

pub struct BackgroundExecutor {
    outputs_dir: PathBuf,
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    notifications: Arc<Mutex<VecDeque<Notification>>>,
}

impl BackgroundExecutor {
    pub fn new(workspace: &Path) -> Self {
        Self {
            outputs_dir: crewline_core::paths::task_outputs_dir(workspace),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            notifications: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Start a job and return its id immediately. The wrapper handles the
    /// completion protocol: final output write, status transition, signal,
    /// and exactly one notification.
    pub fn run_in_background<F>(&self, kind: JobKind, fut: F) -> Result<String>
    where
        F: Future<Output = JobResult> + Send + 'static,
    {
        let task_id = new_task_id(kind);
        std::fs::create_dir_all(&self.outputs_dir)
            .with_context(|| format!("Failed to create {}", self.outputs_dir.display()))?;
        let output_path = self.outputs_dir.join(format!("{}.txt", task_id));
        std::fs::write(&output_path, "")
            .with_context(|| format!("Failed to create {}", output_path.display()))?;

        let (status_tx, status_rx) = watch::channel(JobStatus::Running);
        let cancel = CancellationToken::new();
        let job = Job {
            kind,
            output: String::new(),
            output_path: output_path.clone(),
            output_file: format!(".task_outputs/{}.txt", task_id),
            status_tx,
            status_rx,
            cancel: cancel.clone(),
        };
        self.jobs.lock().unwrap().insert(task_id.clone(), job);

        info!("background {} job {} started", kind.as_str(), task_id);

        let jobs = Arc::clone(&self.jobs);
        let notifications = Arc::clone(&self.notifications);
        let id = task_id.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                r = fut => r,
                _ = cancel.cancelled() => Err(JobFailure::Error("stopped".to_string())),
            };
            finish_job(&jobs, &notifications, &id, result);
        });

        Ok(task_id)
    }

    /// Snapshot a job, optionally blocking on its completion signal.
    pub async fn get_output(
        &self,
        task_id: &str,
        block: bool,
        timeout_ms: Option<u64>,
    ) -> Result<JobSnapshot> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_OUTPUT_TIMEOUT_MS));
        let deadline = tokio::time::Instant::now() + timeout;

        let mut status_rx = {
            let jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get(task_id)
                .with_context(|| format!("Unknown task {}", task_id))?;
            job.status_rx.clone()
        };

        if block {
            while *status_rx.borrow() == JobStatus::Running {
                match tokio::time::timeout_at(deadline, status_rx.changed()).await {
                    Ok(Ok(())) => {}
                    // sender dropped or deadline hit: report what we have
                    Ok(Err(_)) | Err(_) => break,
                }
            }
        }

        let jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get(task_id)
            .with_context(|| format!("Unknown task {}", task_id))?;
        let status = *job.status_rx.borrow();
        let output = job.output.clone();
        Ok(JobSnapshot {
            task_id: task_id.to_string(),
            status,
            output,
        })
    }

    /// Flip a running job to stopped and raise its signal. The closure is
    /// cancelled cooperatively; callers observe `stopped` immediately.
    pub fn stop_task(&self, task_id: &str) -> Result<JobStatus> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get(task_id)
            .with_context(|| format!("Unknown task {}", task_id))?;
        let current = *job.status_rx.borrow();
        if current == JobStatus::Running {
            let _ = job.status_tx.send(JobStatus::Stopped);
            job.cancel.cancel();
            info!("job {} stopped", task_id);
            Ok(JobStatus::Stopped)
        } else {
            Ok(current)
        }
    }

    /// Non-blocking: remove and return all queued notifications.
    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().drain(..).collect()
    }

    /// Read the append-only output file from a byte offset.
    pub fn read_output(&self, task_id: &str, offset: u64) -> Result<String> {
        let path = {
            let jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get(task_id)
                .with_context(|| format!("Unknown task {}", task_id))?;
            job.output_path.clone()
        };
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let start = (offset as usize).min(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[start..]).to_string())
    }

    pub fn job_status(&self, task_id: &str) -> Option<JobStatus> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(task_id).map(|j| *j.status_rx.borrow())
    }
}

/// Completion protocol: (a) final output to the output file, (b) status
/// transition unless already terminal, (c) signal, (d) one notification.
fn finish_job(
    jobs: &Mutex<HashMap<String, Job>>,
    notifications: &Mutex<VecDeque<Notification>>,
    task_id: &str,
    result: JobResult,
) {
    let mut jobs = jobs.lock().unwrap();
    let Some(job) = jobs.get_mut(task_id) else {
        warn!("finish for unknown job {}", task_id);
        return;
    };

    let (status, output) = match result {
        Ok(output) => (JobStatus::Completed, output),
        Err(JobFailure::Timeout(msg)) => (JobStatus::Timeout, msg),
        Err(JobFailure::Error(msg)) => (JobStatus::Error, msg),
    };

    // stop_task may already have flipped the job to a terminal status
    let final_status = if *job.status_rx.borrow() == JobStatus::Running {
        status
    } else {
        *job.status_rx.borrow()
    };

    if let Err(e) = append_output(&job.output_path, &output) {
        warn!("failed to write output for {}: {}", task_id, e);
    }
    job.output = output.clone();
    let _ = job.status_tx.send(final_status);

    debug!("job {} finished: {}", task_id, final_status);

    notifications.lock().unwrap().push_back(Notification {
        task_id: task_id.to_string(),
        kind: job.kind,
        status: final_status,
        summary: truncate_at(&output, NOTIFICATION_SUMMARY_CHARS).to_string(),
        output_file: job.output_file.clone(),
    });
}

fn new_task_id(kind: JobKind) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", kind.prefix(), &hex[..6])
}

fn append_output(path: &Path, output: &str) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(output.as_bytes())?;
    Ok(())
}
