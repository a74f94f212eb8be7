use anyhow::Result;
use std::path::{Component, Path, PathBuf};

/// Resolve a tool-supplied path against the workspace root, rejecting any
/// path that resolves outside it. The target does not need to exist yet
/// (write_file creates files), so resolution is lexical.
pub fn safe_path(workspace: &Path, raw: &str) -> Result<PathBuf> {
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workspace.join(candidate)
    };

    let normalized = normalize(&joined);
    let root = normalize(workspace);

    if normalized.starts_with(&root) {
        Ok(normalized)
    } else {
        anyhow::bail!("Path escapes workspace: {}", raw)
    }
}

/// Lexical normalization: fold `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                match parts.last() {
                    Some(Component::Normal(_)) => {
                        parts.pop();
                    }
                    // `..` above the root is preserved so the prefix check fails
                    _ => parts.push(component),
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_path_relative() {
        let ws = Path::new("/ws");
        assert_eq!(safe_path(ws, "src/main.rs").unwrap(), PathBuf::from("/ws/src/main.rs"));
        assert_eq!(safe_path(ws, "./notes.md").unwrap(), PathBuf::from("/ws/notes.md"));
    }

    #[test]
    fn test_safe_path_inside_absolute() {
        let ws = Path::new("/ws");
        assert_eq!(safe_path(ws, "/ws/a/b.txt").unwrap(), PathBuf::from("/ws/a/b.txt"));
    }

    #[test]
    fn test_safe_path_escape_rejected() {
        let ws = Path::new("/ws");
        assert!(safe_path(ws, "../etc/passwd").is_err());
        assert!(safe_path(ws, "/etc/passwd").is_err());
        assert!(safe_path(ws, "a/../../outside").is_err());
    }

    #[test]
    fn test_safe_path_dotdot_within() {
        let ws = Path::new("/ws");
        assert_eq!(
            safe_path(ws, "a/b/../c.txt").unwrap(),
            PathBuf::from("/ws/a/c.txt")
        );
    }
}
