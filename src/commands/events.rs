// Vault events - file watcher notifications translated into sync work

use std::path::Path;

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::error::{DeadlineError, Result};
use crate::vault::FsVault;
use super::sync::ProjectSync;

/// Something that happened to a note or folder in the vault (vault-relative paths)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    /// A note's content (and possibly its header) changed
    HeaderChanged { path: String },
    /// A note or folder moved
    Renamed { from: String, to: String },
}

/// Turns raw watcher events into [`VaultEvent`]s.
///
/// Backends report renames differently: one event with both paths, a
/// From/To pair, or two path-only events. All of them come out as a single
/// `Renamed`.
pub struct EventTranslator {
    vault: FsVault,
    pendingFrom: Option<String>,
    lastRename: Option<(String, String)>,
}

impl EventTranslator {
    pub fn new(vault: FsVault) -> Self {
        Self {
            vault,
            pendingFrom: None,
            lastRename: None,
        }
    }

    pub fn translate(&mut self, event: &Event) -> Vec<VaultEvent> {
        match &event.kind {
            EventKind::Modify(ModifyKind::Name(mode)) => self.translateRename(*mode, &event.paths),
            EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => event
                .paths
                .iter()
                .filter_map(|p| self.notePath(p))
                .map(|path| VaultEvent::HeaderChanged { path })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn translateRename(&mut self, mode: RenameMode, paths: &[std::path::PathBuf]) -> Vec<VaultEvent> {
        match mode {
            RenameMode::Both => {
                let (Some(from), Some(to)) = (paths.first(), paths.get(1)) else {
                    return Vec::new();
                };
                self.pendingFrom = None;
                let (Some(from), Some(to)) = (self.vaultPath(from), self.vaultPath(to)) else {
                    return Vec::new();
                };
                // Already reported through the From/To pair
                if self.lastRename.as_ref() == Some(&(from.clone(), to.clone())) {
                    self.lastRename = None;
                    return Vec::new();
                }
                self.renamed(from, to)
            }
            RenameMode::From => {
                self.pendingFrom = paths.first().and_then(|p| self.vaultPath(p));
                Vec::new()
            }
            RenameMode::To => {
                let to = paths.first().and_then(|p| self.vaultPath(p));
                match (self.pendingFrom.take(), to) {
                    (Some(from), Some(to)) => self.renamed(from, to),
                    _ => Vec::new(),
                }
            }
            _ => {
                // Path-only notifications: the vanished path comes first
                let Some(path) = paths.first() else {
                    return Vec::new();
                };
                let Some(vaultPath) = self.vaultPath(path) else {
                    return Vec::new();
                };
                if !path.exists() {
                    self.pendingFrom = Some(vaultPath);
                    return Vec::new();
                }
                match self.pendingFrom.take() {
                    Some(from) => self.renamed(from, vaultPath),
                    None => Vec::new(),
                }
            }
        }
    }

    fn renamed(&mut self, from: String, to: String) -> Vec<VaultEvent> {
        if from == to {
            return Vec::new();
        }
        self.lastRename = Some((from.clone(), to.clone()));
        vec![VaultEvent::Renamed { from, to }]
    }

    /// Vault path for anything outside the vault's own state
    fn vaultPath(&self, path: &Path) -> Option<String> {
        let relative = self.vault.toVaultPath(path)?;
        let hidden = relative.split('/').any(|part| part.starts_with('.'));
        if hidden { None } else { Some(relative) }
    }

    fn notePath(&self, path: &Path) -> Option<String> {
        self.vaultPath(path).filter(|p| p.ends_with(".md"))
    }
}

/// Watch the whole vault. Events arrive on the returned channel for as long
/// as the watcher is kept alive.
pub fn watchVault(vault: &FsVault) -> Result<(RecommendedWatcher, UnboundedReceiver<VaultEvent>)> {
    let (tx, rx) = unbounded_channel();
    let mut translator = EventTranslator::new(vault.clone());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for vaultEvent in translator.translate(&event) {
                let _ = tx.send(vaultEvent);
            }
        }
        Err(e) => warn!("[watchVault] Watcher error: {}", e),
    })
    .map_err(|e| DeadlineError::Filesystem(format!("Failed to create file watcher: {}", e)))?;

    watcher
        .watch(vault.root(), RecursiveMode::Recursive)
        .map_err(|e| DeadlineError::Filesystem(format!("Failed to watch {:?}: {}", vault.root(), e)))?;

    info!("[watchVault] Watching {:?}", vault.root());
    Ok((watcher, rx))
}

/// Feed events to the sync engine one at a time until the channel closes
pub async fn runEventLoop(sync: &ProjectSync, mut events: UnboundedReceiver<VaultEvent>) {
    while let Some(event) = events.recv().await {
        debug!("[runEventLoop] {:?}", event);
        sync.handleEvent(event).await;
    }
    info!("[runEventLoop] Event channel closed");
}
