use std::path::{Path, PathBuf};

/// Root of the task board for a given task list id.
pub fn tasks_dir(workspace: &Path, list_id: &str) -> PathBuf {
    workspace.join(".tasks").join(list_id)
}

/// Highwatermark file holding the largest allocated task id.
pub fn highwatermark_path(tasks_dir: &Path) -> PathBuf {
    tasks_dir.join(".highwatermark")
}

/// On-disk file for a single task.
pub fn task_path(tasks_dir: &Path, id: u64) -> PathBuf {
    tasks_dir.join(format!("task_{}.json", id))
}

/// Directory holding the permanent transcript archive and large-output spills.
pub fn transcripts_dir(workspace: &Path) -> PathBuf {
    workspace.join(".transcripts")
}

/// Permanent conversation archive (one JSON message per line).
pub fn transcript_archive_path(workspace: &Path) -> PathBuf {
    transcripts_dir(workspace).join("transcript.jsonl")
}

/// Spill file for a tool output too large to keep in the transcript.
pub fn spill_path(workspace: &Path, unix_ts: i64) -> PathBuf {
    transcripts_dir(workspace).join(format!("output_{}.txt", unix_ts))
}

/// Directory holding append-only background job outputs.
pub fn task_outputs_dir(workspace: &Path) -> PathBuf {
    workspace.join(".task_outputs")
}

/// Root of all team directories.
pub fn teams_dir(workspace: &Path) -> PathBuf {
    workspace.join(".teams")
}

/// Directory for one team (config.json + member inboxes).
pub fn team_dir(workspace: &Path, team: &str) -> PathBuf {
    teams_dir(workspace).join(team)
}

/// Team membership file.
pub fn team_config_path(workspace: &Path, team: &str) -> PathBuf {
    team_dir(workspace, team).join("config.json")
}

/// Inbox for one recipient within a team.
pub fn inbox_path(workspace: &Path, team: &str, name: &str) -> PathBuf {
    team_dir(workspace, team).join(format!("{}_inbox.jsonl", name))
}

/// Workspace skills directory.
pub fn skills_dir(workspace: &Path) -> PathBuf {
    workspace.join("skills")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let ws = Path::new("/ws");
        assert_eq!(tasks_dir(ws, "default"), PathBuf::from("/ws/.tasks/default"));
        assert_eq!(
            task_path(&tasks_dir(ws, "default"), 12),
            PathBuf::from("/ws/.tasks/default/task_12.json")
        );
        assert_eq!(
            transcript_archive_path(ws),
            PathBuf::from("/ws/.transcripts/transcript.jsonl")
        );
        assert_eq!(
            inbox_path(ws, "beta", "alice"),
            PathBuf::from("/ws/.teams/beta/alice_inbox.jsonl")
        );
        assert_eq!(spill_path(ws, 42).file_name().unwrap(), "output_42.txt");
    }
}
