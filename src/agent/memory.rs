//! Persistent markdown memory.
//!
//! Layout under the memory root:
//!
//! ```text
//! user.md              operator preferences
//! devices/<name>.md    learned device profiles
//! incidents/<slug>.md  past incident records
//! ```

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const INCIDENTS_IN_CONTEXT: usize = 5;
const INCIDENT_LIST_LIMIT: usize = 10;

/// Notes that survive restarts and are injected into the system prompt.
pub trait MemoryStore: Send + Sync {
    /// Budgeted memory block for the given devices, or empty when nothing is stored.
    fn build_context(&self, device_names: &[String]) -> String;

    /// Append `content` to a category entry; returns a confirmation line.
    fn save(&self, category: &str, key: Option<&str>, content: &str) -> Result<String>;

    /// Read an entry, or list the category when `key` is absent.
    fn read(&self, category: &str, key: Option<&str>) -> Result<String>;
}

/// [`MemoryStore`] over plain markdown files.
pub struct MarkdownMemory {
    root: PathBuf,
    max_file_size: usize,
    max_total_size: usize,
}

impl MarkdownMemory {
    /// `root` is the memory directory itself, created on first save.
    pub fn new(root: impl Into<PathBuf>, max_file_size: usize, max_total_size: usize) -> Self {
        Self {
            root: root.into(),
            max_file_size,
            max_total_size,
        }
    }

    fn user_path(&self) -> PathBuf {
        self.root.join("user.md")
    }

    fn device_path(&self, name: &str) -> PathBuf {
        self.root.join("devices").join(format!("{}.md", sanitize(name)))
    }

    fn incident_path(&self, slug: &str) -> PathBuf {
        self.root.join("incidents").join(format!("{}.md", sanitize(slug)))
    }

    fn device_names(&self) -> Vec<String> {
        let mut names = md_files(&self.root.join("devices"))
            .into_iter()
            .map(|(stem, _)| stem)
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Incident slugs, newest first.
    fn incident_slugs(&self, limit: usize) -> Vec<String> {
        let mut files = md_files(&self.root.join("incidents"));
        files.sort_by(|a, b| b.1.cmp(&a.1));
        files.into_iter().take(limit).map(|(stem, _)| stem).collect()
    }

    fn append(&self, path: &Path, heading: &str, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create memory directory: {}", parent.display()))?;
        }

        let updated = match fs::read_to_string(path) {
            Ok(existing) => format!("{}\n\n{}\n", existing.trim_end_matches('\n'), content.trim()),
            Err(_) => format!("{}\n\n{}\n", heading, content.trim()),
        };
        let updated = truncate_oldest(&updated, heading, self.max_file_size);

        fs::write(path, updated).with_context(|| format!("Failed to write memory file: {}", path.display()))
    }

    fn budget_trim(&self, text: &str, budget: usize) -> String {
        let limit = budget.min(self.max_file_size);
        if text.len() <= limit {
            return text.to_string();
        }
        let mut cut = limit.saturating_sub(3);
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &text[..cut])
    }
}

impl MemoryStore for MarkdownMemory {
    fn build_context(&self, device_names: &[String]) -> String {
        let mut parts = Vec::new();
        let mut budget = self.max_total_size;

        let user = read_or_empty(&self.user_path());
        if !user.is_empty() {
            let chunk = self.budget_trim(&user, self.max_file_size);
            budget = budget.saturating_sub(chunk.len());
            parts.push(chunk);
        }

        let names = if device_names.is_empty() {
            self.device_names()
        } else {
            device_names.to_vec()
        };
        for name in &names {
            if budget == 0 {
                break;
            }
            let profile = read_or_empty(&self.device_path(name));
            if !profile.is_empty() {
                let chunk = self.budget_trim(&profile, budget);
                budget = budget.saturating_sub(chunk.len());
                parts.push(chunk);
            }
        }

        for slug in self.incident_slugs(INCIDENTS_IN_CONTEXT) {
            if budget == 0 {
                break;
            }
            let incident = read_or_empty(&self.incident_path(&slug));
            if !incident.is_empty() {
                let chunk = self.budget_trim(&incident, budget);
                budget = budget.saturating_sub(chunk.len());
                parts.push(chunk);
            }
        }

        if parts.is_empty() {
            return String::new();
        }
        format!(
            "\n\n--- Persistent Memory ---\n\n{}\n\n--- End Memory ---",
            parts.join("\n\n")
        )
    }

    fn save(&self, category: &str, key: Option<&str>, content: &str) -> Result<String> {
        let key = key.map(str::trim).filter(|k| !k.is_empty());
        match category {
            "user" => self.append(&self.user_path(), "# User Preferences", content)?,
            "device" => {
                let Some(name) = key else {
                    bail!("a device name is required to save device memory");
                };
                self.append(&self.device_path(name), &format!("# Device: {}", name), content)?;
            }
            "incident" => {
                let Some(slug) = key else {
                    bail!("an incident slug is required to save incident memory");
                };
                self.append(&self.incident_path(slug), &format!("# Incident: {}", slug), content)?;
            }
            other => return Ok(format!("Unknown memory category: {}", other)),
        }
        Ok(format!("Saved to {}/{}.", category, key.unwrap_or("preferences")))
    }

    fn read(&self, category: &str, key: Option<&str>) -> Result<String> {
        let key = key.map(str::trim).filter(|k| !k.is_empty());
        let text = match (category, key) {
            ("device", Some(name)) => {
                non_empty_or(read_or_empty(&self.device_path(name)), format!("No memory for device '{}'.", name))
            }
            ("device", None) => {
                let names = self.device_names();
                if names.is_empty() {
                    "No device memories stored.".to_string()
                } else {
                    format!("Device memories: {}", names.join(", "))
                }
            }
            ("user", _) => non_empty_or(read_or_empty(&self.user_path()), "No user preferences stored.".to_string()),
            ("incident", Some(slug)) => {
                non_empty_or(read_or_empty(&self.incident_path(slug)), format!("No incident record for '{}'.", slug))
            }
            ("incident", None) => {
                let slugs = self.incident_slugs(INCIDENT_LIST_LIMIT);
                if slugs.is_empty() {
                    "No incident records stored.".to_string()
                } else {
                    format!("Incidents: {}", slugs.join(", "))
                }
            }
            (other, _) => format!("Unknown memory category: {}", other),
        };
        Ok(text)
    }
}

/// Keep the heading plus the newest lines that fit in `max_size`.
fn truncate_oldest(content: &str, heading: &str, max_size: usize) -> String {
    if content.len() <= max_size {
        return content.to_string();
    }

    let head = format!("{}\n\n", heading);
    let mut remaining = max_size.saturating_sub(head.len() + 40);
    let mut kept = Vec::new();
    for line in content.split('\n').rev() {
        if line.len() + 1 > remaining {
            break;
        }
        remaining -= line.len() + 1;
        kept.push(line);
    }
    kept.reverse();

    let body = format!("{}(earlier entries truncated)\n\n{}", head, kept.join("\n"));
    format!("{}\n", body.trim_end_matches('\n'))
}

fn read_or_empty(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}

fn non_empty_or(content: String, fallback: String) -> String {
    if content.is_empty() {
        fallback
    } else {
        content
    }
}

/// `(stem, mtime)` of every `.md` file directly inside `dir`.
fn md_files(dir: &Path) -> Vec<(String, SystemTime)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .filter_map(|path| {
            let stem = path.file_stem()?.to_string_lossy().into_owned();
            let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((stem, mtime))
        })
        .collect()
}

/// Restrict a name to characters that are safe in a file name.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory(dir: &TempDir) -> MarkdownMemory {
        MarkdownMemory::new(dir.path().join("memory"), 8000, 24000)
    }

    #[test]
    fn test_save_creates_heading_then_appends() {
        let dir = TempDir::new().unwrap();
        let mem = memory(&dir);

        let msg = mem.save("device", Some("mx-core-01"), "BGP peer 10.1.1.1 flaps nightly.").unwrap();
        assert_eq!(msg, "Saved to device/mx-core-01.");
        mem.save("device", Some("mx-core-01"), "  FPC1 runs hot.  ").unwrap();

        let content = mem.read("device", Some("mx-core-01")).unwrap();
        assert_eq!(
            content,
            "# Device: mx-core-01\n\nBGP peer 10.1.1.1 flaps nightly.\n\nFPC1 runs hot.\n"
        );
    }

    #[test]
    fn test_user_preferences() {
        let dir = TempDir::new().unwrap();
        let mem = memory(&dir);
        assert_eq!(mem.read("user", None).unwrap(), "No user preferences stored.");

        let msg = mem.save("user", None, "Prefer terse answers.").unwrap();
        assert_eq!(msg, "Saved to user/preferences.");
        assert!(mem.read("user", None).unwrap().starts_with("# User Preferences"));
    }

    #[test]
    fn test_listing_and_missing_entries() {
        let dir = TempDir::new().unwrap();
        let mem = memory(&dir);
        assert_eq!(mem.read("device", None).unwrap(), "No device memories stored.");
        assert_eq!(mem.read("incident", None).unwrap(), "No incident records stored.");
        assert_eq!(mem.read("device", Some("r9")).unwrap(), "No memory for device 'r9'.");
        assert_eq!(mem.read("incident", Some("x")).unwrap(), "No incident record for 'x'.");

        mem.save("device", Some("r2"), "a").unwrap();
        mem.save("device", Some("r1"), "b").unwrap();
        mem.save("incident", Some("2024-fpc-crash"), "FPC0 rebooted").unwrap();
        assert_eq!(mem.read("device", None).unwrap(), "Device memories: r1, r2");
        assert_eq!(mem.read("incident", None).unwrap(), "Incidents: 2024-fpc-crash");
    }

    #[test]
    fn test_unknown_category_and_missing_key() {
        let dir = TempDir::new().unwrap();
        let mem = memory(&dir);
        assert_eq!(mem.save("notes", None, "x").unwrap(), "Unknown memory category: notes");
        assert_eq!(mem.read("notes", None).unwrap(), "Unknown memory category: notes");
        assert!(mem.save("device", None, "x").is_err());
        assert!(mem.save("incident", Some("  "), "x").is_err());
    }

    #[test]
    fn test_names_are_sanitised() {
        let dir = TempDir::new().unwrap();
        let mem = memory(&dir);
        mem.save("device", Some("../etc/passwd"), "nope").unwrap();
        assert!(dir.path().join("memory").join("devices").join(".._etc_passwd.md").exists());
        assert_eq!(sanitize("edge 1/re0"), "edge_1_re0");
    }

    #[test]
    fn test_truncation_keeps_newest_lines() {
        let dir = TempDir::new().unwrap();
        let mem = MarkdownMemory::new(dir.path().join("memory"), 200, 24000);
        for i in 0..20 {
            mem.save("device", Some("r1"), &format!("observation number {:02}", i)).unwrap();
        }

        let content = mem.read("device", Some("r1")).unwrap();
        assert!(content.len() <= 200);
        assert!(content.starts_with("# Device: r1\n\n(earlier entries truncated)"));
        assert!(content.contains("observation number 19"));
        assert!(!content.contains("observation number 00"));
    }

    #[test]
    fn test_build_context() {
        let dir = TempDir::new().unwrap();
        let mem = memory(&dir);
        assert_eq!(mem.build_context(&[]), "");

        mem.save("user", None, "Page on-call for critical only.").unwrap();
        mem.save("device", Some("r1"), "Lab box, ignore fan alarms.").unwrap();
        mem.save("device", Some("r2"), "Core router.").unwrap();
        mem.save("incident", Some("bgp-flap"), "Upstream maintenance.").unwrap();

        let all = mem.build_context(&[]);
        assert!(all.starts_with("\n\n--- Persistent Memory ---\n\n# User Preferences"));
        assert!(all.ends_with("--- End Memory ---"));
        assert!(all.contains("Core router."));
        assert!(all.contains("Upstream maintenance."));

        let only_r1 = mem.build_context(&["r1".to_string()]);
        assert!(only_r1.contains("Lab box"));
        assert!(!only_r1.contains("Core router."));
    }

    #[test]
    fn test_build_context_respects_budget() {
        let dir = TempDir::new().unwrap();
        let mem = MarkdownMemory::new(dir.path().join("memory"), 8000, 60);
        mem.save("user", None, &"x".repeat(20)).unwrap();
        mem.save("device", Some("r1"), &"y".repeat(200)).unwrap();

        let ctx = mem.build_context(&[]);
        let body = ctx
            .trim_start_matches("\n\n--- Persistent Memory ---\n\n")
            .trim_end_matches("\n\n--- End Memory ---");
        let parts: Vec<&str> = body.split("\n\n# ").collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[1].ends_with("..."));
        assert!(body.len() <= 60 + 2);
    }
}
