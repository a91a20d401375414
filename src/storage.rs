// Filesystem-based storage layer for Deadline
// Project tree in a single JSON document, settings and project notes as Markdown + YAML frontmatter

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{DeadlineError, Result};
use crate::models::{ProjectsFile, Settings, SettingsOverride};

// ============================================
// PATH HELPERS
// ============================================

/// Global config directory (~/.deadline/)
pub fn globalConfigDir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deadline")
}

/// Global config file path
pub fn globalConfigPath() -> PathBuf {
    globalConfigDir().join("config.md")
}

/// Per-vault state directory (<vault>/.deadline/)
pub fn vaultStateDir(vaultPath: &Path) -> PathBuf {
    vaultPath.join(".deadline")
}

/// Vault config override file
pub fn vaultConfigPath(vaultPath: &Path) -> PathBuf {
    vaultStateDir(vaultPath).join("config.md")
}

/// Project tree document
pub fn dataFilePath(vaultPath: &Path) -> PathBuf {
    vaultStateDir(vaultPath).join("projects.json")
}

/// Join vault-relative paths with "/" the way project notes are referenced
pub fn joinVaultPath(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

/// Parent folder of a vault-relative path ("" at the vault root)
pub fn parentVaultPath(path: &str) -> String {
    path.rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default()
}

// ============================================
// FRONTMATTER PARSING
// ============================================

/// Split markdown content into (yaml, body) when it starts with a frontmatter block
pub fn splitFrontmatter(content: &str) -> Option<(&str, &str)> {
    let content = content.trim_start();
    if !content.starts_with("---") {
        return None;
    }

    let rest = &content[3..];
    let end = rest.find("\n---")?;
    let yaml = rest[..end].trim();
    let body = rest[end + 4..].trim_start_matches('-').trim();
    Some((yaml, body))
}

/// Parse YAML frontmatter from markdown content
pub fn parseFrontmatter<T: serde::de::DeserializeOwned>(content: &str) -> Option<(T, String)> {
    let (yaml, body) = splitFrontmatter(content)?;
    // An empty block parses as null rather than an empty mapping
    let yaml = if yaml.is_empty() { "{}" } else { yaml };
    let frontmatter: T = serde_yaml::from_str(yaml).ok()?;
    Some((frontmatter, body.to_string()))
}

/// Serialize frontmatter + body to markdown
pub fn toMarkdown<T: serde::Serialize>(frontmatter: &T, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(frontmatter)
        .map_err(|e| DeadlineError::Storage(format!("YAML error: {}", e)))?;
    Ok(format!("---\n{}---\n\n{}", yaml, body))
}

/// Rewrite the `id:` line of the frontmatter block, leaving everything else untouched.
/// Inserts the line if the block has none. Returns None without a frontmatter block.
pub fn replaceHeaderId(content: &str, id: &str) -> Option<String> {
    splitFrontmatter(content)?;

    let idLine = format!("id: \"{}\"", id);
    let mut lines: Vec<String> = Vec::new();
    let mut opened = false;
    let mut inHeader = false;
    let mut replaced = false;

    for line in content.lines() {
        if !opened {
            if line.trim_end() == "---" {
                opened = true;
                inHeader = true;
            }
            lines.push(line.to_string());
            continue;
        }
        if inHeader {
            if line.starts_with("---") {
                if !replaced {
                    lines.push(idLine.clone());
                    replaced = true;
                }
                inHeader = false;
            } else if !replaced && isIdLine(line) {
                lines.push(idLine.clone());
                replaced = true;
                continue;
            }
        }
        lines.push(line.to_string());
    }

    let mut result = lines.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    Some(result)
}

/// `id: ...` with any spacing around the key
fn isIdLine(line: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(key, _)| key.trim() == "id")
}

// ============================================
// GLOBAL CONFIG
// ============================================

pub fn loadGlobalConfig() -> Settings {
    let path = globalConfigPath();
    debug!("[loadGlobalConfig] Config path: {:?}", path);

    if !path.exists() {
        debug!("[loadGlobalConfig] Config file does not exist, returning defaults");
        return Settings::default();
    }

    let content = fs::read_to_string(&path).unwrap_or_default();
    parseFrontmatter::<Settings>(&content)
        .map(|(settings, _)| settings.normalized())
        .unwrap_or_else(|| {
            warn!("[loadGlobalConfig] Failed to parse frontmatter, using defaults");
            Settings::default()
        })
}

pub fn saveGlobalConfig(settings: &Settings) -> Result<()> {
    let path = globalConfigPath();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DeadlineError::Storage(e.to_string()))?;
    }

    let content = toMarkdown(settings, "# Deadline settings\n")?;
    fs::write(&path, content).map_err(|e| DeadlineError::Storage(e.to_string()))
}

/// Global settings with the vault's override applied
pub fn loadVaultSettings(global: &Settings, vaultPath: &Path) -> Settings {
    let configPath = vaultConfigPath(vaultPath);
    let over = if configPath.exists() {
        debug!("[loadVaultSettings] Loading vault override from {:?}", configPath);
        fs::read_to_string(&configPath)
            .ok()
            .and_then(|content| parseFrontmatter::<SettingsOverride>(&content).map(|(o, _)| o))
            .unwrap_or_default()
    } else {
        SettingsOverride::default()
    };
    global.withOverride(&over)
}

// ============================================
// PROJECT STORE
// ============================================

/// Reads and writes the project tree document.
///
/// Every read-modify-write of the document must hold [`ProjectStore::lockForWrite`]
/// for the whole cycle. The lock is handed out in request order, so writers are
/// applied one at a time in the order they arrived.
#[derive(Debug)]
pub struct ProjectStore {
    path: PathBuf,
    writeQueue: Mutex<()>,
}

impl ProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writeQueue: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn lockForWrite(&self) -> MutexGuard<'_, ()> {
        self.writeQueue.lock().await
    }

    /// Load the project tree. A missing document is created empty;
    /// an unreadable or unparseable one is an error, never an empty tree.
    pub async fn load(&self) -> Result<ProjectsFile> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            self.initialize().await?;
        }

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            error!("[ProjectStore::load] Failed to read {}: {}", self.path.display(), e);
            DeadlineError::Storage(e.to_string())
        })?;

        let data: ProjectsFile = serde_json::from_str(&content).map_err(|e| {
            error!("[ProjectStore::load] Corrupt project data in {}: {}", self.path.display(), e);
            DeadlineError::CorruptData {
                path: self.path.display().to_string(),
                message: e.to_string(),
            }
        })?;

        debug!("[ProjectStore::load] Loaded {} top-level projects", data.projects.len());
        Ok(data)
    }

    /// Write the whole tree: temp sibling first, then rename over the original
    pub async fn save(&self, data: &ProjectsFile) -> Result<()> {
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| DeadlineError::Storage(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DeadlineError::Storage(e.to_string()))?;
        }

        let tmpPath = {
            let filename = self
                .path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "projects.json".to_string());
            self.path.with_file_name(format!("{}.tmp", filename))
        };

        let writeResult: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&tmpPath).await?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(e) = writeResult {
            let _ = tokio::fs::remove_file(&tmpPath).await;
            error!("[ProjectStore::save] Failed to write {}: {}", tmpPath.display(), e);
            return Err(DeadlineError::Storage(e.to_string()));
        }

        if let Err(e) = tokio::fs::rename(&tmpPath, &self.path).await {
            let _ = tokio::fs::remove_file(&tmpPath).await;
            error!("[ProjectStore::save] Failed to replace {}: {}", self.path.display(), e);
            return Err(DeadlineError::Storage(e.to_string()));
        }

        debug!("[ProjectStore::save] Saved {} top-level projects", data.projects.len());
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DeadlineError::Storage(e.to_string()))?;
        }

        let empty = serde_json::to_string_pretty(&ProjectsFile::default())
            .map_err(|e| DeadlineError::Storage(e.to_string()))?;

        // create_new: never clobber a document another writer just created
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(mut file) => {
                file.write_all(empty.as_bytes())
                    .await
                    .map_err(|e| DeadlineError::Storage(e.to_string()))?;
                file.flush().await.map_err(|e| DeadlineError::Storage(e.to_string()))?;
                info!("[ProjectStore::initialize] Created empty project data at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(DeadlineError::Storage(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectData, ProjectNode};

    #[test]
    fn test_parse_frontmatter() {
        let content = "---\nid: \"1\"\nname: A\n---\n\n# A\n\nBody";
        let (map, body) = parseFrontmatter::<serde_yaml::Mapping>(content).unwrap();
        assert_eq!(map.get("name").and_then(|v| v.as_str()), Some("A"));
        assert_eq!(body, "# A\n\nBody");
        assert!(parseFrontmatter::<serde_yaml::Mapping>("# No header").is_none());
    }

    #[test]
    fn test_replace_header_id_only_touches_id_line() {
        let content = "---\nid: \"3-9\"\nname: Docs\nstatus: done\n---\nid: in body stays\n";
        let restored = replaceHeaderId(content, "3-1").unwrap();
        assert_eq!(restored, "---\nid: \"3-1\"\nname: Docs\nstatus: done\n---\nid: in body stays\n");
    }

    #[test]
    fn test_replace_header_id_matches_spaced_key() {
        let restored = replaceHeaderId("---\nid : \"9\"\nname: Docs\n---\n", "3-1").unwrap();
        assert_eq!(restored, "---\nid: \"3-1\"\nname: Docs\n---\n");

        let restored = replaceHeaderId("---\n  id: \"9\"\nname: Docs\n---\n", "3-1").unwrap();
        assert_eq!(restored, "---\nid: \"3-1\"\nname: Docs\n---\n");
        let (map, _) = parseFrontmatter::<serde_yaml::Mapping>(&restored).unwrap();
        assert_eq!(map.get("id").and_then(|v| v.as_str()), Some("3-1"));
    }

    #[test]
    fn test_replace_header_id_inserts_missing_line() {
        let restored = replaceHeaderId("---\nname: Docs\n---\n", "4").unwrap();
        assert_eq!(restored, "---\nname: Docs\nid: \"4\"\n---\n");
        assert!(replaceHeaderId("no header", "4").is_none());
    }

    #[test]
    fn test_vault_paths() {
        assert_eq!(joinVaultPath("Projects", "1-A"), "Projects/1-A");
        assert_eq!(joinVaultPath("", "1-A"), "1-A");
        assert_eq!(parentVaultPath("Projects/1-A/1-A.md"), "Projects/1-A");
        assert_eq!(parentVaultPath("top.md"), "");
    }

    #[tokio::test]
    async fn test_load_creates_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path().join(".deadline").join("projects.json"));
        let data = store.load().await.unwrap();
        assert!(data.projects.is_empty());
        let content = std::fs::read_to_string(store.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, serde_json::json!({ "projects": [] }));
    }

    #[tokio::test]
    async fn test_load_rejects_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        std::fs::write(&path, "{ \"projects\": [ {").unwrap();
        let store = ProjectStore::new(&path);
        assert!(matches!(store.load().await, Err(DeadlineError::CorruptData { .. })));
        // The corrupt document is left for the user to inspect
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ \"projects\": [ {");
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_nesting() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path().join("projects.json"));
        let mut parent = ProjectNode::new(
            "1".to_string(),
            ProjectData::new("A"),
            "Projects/1-A".to_string(),
            "Projects/1-A/1-A.md".to_string(),
        );
        let mut child = ProjectNode::new(
            "1-1".to_string(),
            ProjectData::new("B"),
            "Projects/1-A/1-1-B".to_string(),
            "Projects/1-A/1-1-B/1-1-B.md".to_string(),
        );
        child.addTimelog("20240101 08:00".to_string(), 2.0, Some("setup".to_string()));
        parent.subprojects.push(child);
        let data = ProjectsFile { projects: vec![parent] };

        store.save(&data).await.unwrap();
        assert_eq!(store.load().await.unwrap(), data);
        assert!(!dir.path().join("projects.json.tmp").exists());
    }
}
