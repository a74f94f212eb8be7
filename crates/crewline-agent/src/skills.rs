//! Skill files are plain markdown under `<workspace>/skills/`, either
//! `skills/<name>.md` or `skills/<name>/SKILL.md`. Loading is static; the
//! body is handed to the model verbatim after frontmatter stripping.

use anyhow::Result;
use std::path::Path;

use crewline_core::paths;

/// Load a skill body by name.
pub fn load_skill(workspace: &Path, name: &str) -> Result<String> {
    if name.contains('/') || name.contains("..") {
        anyhow::bail!("Invalid skill name: {}", name);
    }
    let dir = paths::skills_dir(workspace);
    let candidates = [dir.join(format!("{}.md", name)), dir.join(name).join("SKILL.md")];
    for path in &candidates {
        if let Ok(content) = std::fs::read_to_string(path) {
            return Ok(strip_frontmatter(&content));
        }
    }
    anyhow::bail!("Skill '{}' not found", name)
}

/// Names of every available skill, sorted.
pub fn list_skills(workspace: &Path) -> Vec<String> {
    let dir = paths::skills_dir(workspace);
    let mut names = Vec::new();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return names;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && path.join("SKILL.md").exists() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            if let Some(stem) = path.file_stem().and_then(|n| n.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    names
}

/// Strip YAML frontmatter (`--- ... ---`) from markdown content.
fn strip_frontmatter(content: &str) -> String {
    if !content.starts_with("---") {
        return content.to_string();
    }
    let rest = &content[3..];
    match rest.find("\n---") {
        Some(end) => {
            let start = end + "\n---".len();
            rest[start..].trim_start().to_string()
        }
        None => content.to_string(),
    }
}
