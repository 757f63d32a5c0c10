//! Heartbeat checklist file.
//!
//! A markdown file of free-text monitoring instructions, one per `- ` line.
//! The file may be edited by hand while the agent runs; its mtime is
//! checked on every read.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::info;

#[derive(Default)]
struct Cached {
    content: String,
    mtime: Option<SystemTime>,
}

/// Reads and edits the heartbeat checklist.
pub struct HeartbeatManager {
    path: PathBuf,
    cache: Mutex<Cached>,
}

impl HeartbeatManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(Cached::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full checklist text, reloaded when the file changed on disk.
    pub fn get_instructions(&self) -> String {
        let mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let Ok(mut cache) = self.cache.lock() else {
            return fs::read_to_string(&self.path).unwrap_or_default();
        };

        if mtime != cache.mtime || (mtime.is_some() && cache.content.is_empty()) {
            if cache.mtime.is_some() {
                info!("Heartbeat file changed on disk, reloading");
            }
            cache.content = fs::read_to_string(&self.path).unwrap_or_default();
            cache.mtime = mtime;
        }
        cache.content.clone()
    }

    /// Instruction lines: non-blank and not markdown headings or comments.
    fn lines(&self) -> Vec<String> {
        self.get_instructions()
            .lines()
            .filter(|line| {
                let trimmed = line.trim();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            })
            .map(str::to_string)
            .collect()
    }

    /// Numbered view of the checklist.
    pub fn list_instructions(&self) -> String {
        let lines = self.lines();
        if lines.is_empty() {
            return "No heartbeat instructions configured.".to_string();
        }
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}. {}", i + 1, line.trim_start_matches(['-', ' ']).trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Append one instruction as a `- ` bullet; returns the updated list.
    pub fn add_instruction(&self, instruction: &str) -> Result<String> {
        let mut content = self.get_instructions();
        let line = instruction.trim();
        let line = if line.starts_with("- ") {
            line.to_string()
        } else {
            format!("- {}", line)
        };
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&line);
        content.push('\n');
        self.write(&content)?;
        Ok(self.list_instructions())
    }

    /// Remove the instruction at a 1-based position.
    ///
    /// An out-of-range index is reported in the returned text, not as an error.
    pub fn remove_instruction(&self, index: usize) -> Result<String> {
        let lines = self.lines();
        if index < 1 || index > lines.len() {
            return Ok(format!(
                "Invalid index {}. There are {} instruction(s).",
                index,
                lines.len()
            ));
        }

        let target = lines[index - 1].trim().to_string();
        let mut removed = false;
        let remaining: String = self
            .get_instructions()
            .split_inclusive('\n')
            .filter(|raw| {
                if !removed && raw.trim() == target {
                    removed = true;
                    return false;
                }
                true
            })
            .collect();
        self.write(&remaining)?;
        Ok(self.list_instructions())
    }

    /// Overwrite the whole checklist.
    pub fn replace_instructions(&self, content: &str) -> Result<String> {
        self.write(content)?;
        Ok(self.list_instructions())
    }

    fn write(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write heartbeat file: {}", self.path.display()))?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.content = content.to_string();
            cache.mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        }
        Ok(())
    }
}
