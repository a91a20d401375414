// Vault access for project notes and folders
// Paths are vault-relative and "/"-separated ("Projects/1-A/1-A.md")

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{DeadlineError, Result};

/// Characters a note or folder name may not contain
const INVALID_NAME_CHARS: &[char] = &['*', '"', '\\', '/', '<', '>', ':', '|', '?', '#', '^', '[', ']'];

#[async_trait]
pub trait Vault: Send + Sync {
    async fn exists(&self, path: &str) -> bool;

    /// Fails if the folder already exists
    async fn createFolder(&self, path: &str) -> Result<()>;

    /// Fails if the document already exists
    async fn createDocument(&self, path: &str, text: &str) -> Result<()>;

    async fn readDocument(&self, path: &str) -> Result<String>;

    async fn writeDocument(&self, path: &str, text: &str) -> Result<()>;

    /// Names of the entries directly inside a folder
    async fn listChildren(&self, path: &str) -> Result<Vec<String>>;
}

/// Check a single path segment (project or note name)
pub fn validateName(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(DeadlineError::Filesystem(format!("Invalid name: \"{}\"", name)));
    }
    if let Some(c) = name.chars().find(|c| INVALID_NAME_CHARS.contains(c) || c.is_control()) {
        return Err(DeadlineError::Filesystem(format!(
            "Invalid character '{}' in name \"{}\"",
            c, name
        )));
    }
    Ok(())
}

/// Vault backed by a directory on disk
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a vault path onto disk, refusing anything that escapes the root
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(DeadlineError::Filesystem(format!("Path outside vault: {}", path)));
        }
        Ok(self.root.join(relative))
    }

    /// Inverse of `resolve` for paths reported by the file watcher
    pub fn toVaultPath(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

#[async_trait]
impl Vault for FsVault {
    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => tokio::fs::try_exists(full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn createFolder(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Err(DeadlineError::Filesystem(format!("Folder already exists: {}", path)));
        }
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| DeadlineError::Filesystem(format!("Cannot create folder {}: {}", path, e)))?;
        debug!("[FsVault::createFolder] Created {}", full.display());
        Ok(())
    }

    async fn createDocument(&self, path: &str, text: &str) -> Result<()> {
        let full = self.resolve(path)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    DeadlineError::Filesystem(format!("File already exists: {}", path))
                }
                _ => DeadlineError::Filesystem(format!("Cannot create {}: {}", path, e)),
            })?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| DeadlineError::Filesystem(format!("Cannot write {}: {}", path, e)))?;
        file.flush()
            .await
            .map_err(|e| DeadlineError::Filesystem(format!("Cannot write {}: {}", path, e)))?;
        debug!("[FsVault::createDocument] Created {}", full.display());
        Ok(())
    }

    async fn readDocument(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => DeadlineError::NotFound(path.to_string()),
            _ => DeadlineError::Filesystem(format!("Cannot read {}: {}", path, e)),
        })
    }

    async fn writeDocument(&self, path: &str, text: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::write(&full, text)
            .await
            .map_err(|e| DeadlineError::Filesystem(format!("Cannot write {}: {}", path, e)))
    }

    async fn listChildren(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| DeadlineError::Filesystem(format!("Cannot list {}: {}", path, e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DeadlineError::Filesystem(format!("Cannot list {}: {}", path, e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
