// In-memory snapshot of the project tree
// Read path only: writers go through ProjectStore and then reload this cache

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{DeadlineError, Result};
use crate::models::ProjectNode;
use crate::storage::ProjectStore;

pub struct ProjectCache {
    store: Arc<ProjectStore>,
    cachedProjects: RwLock<Option<Vec<ProjectNode>>>,
}

impl ProjectCache {
    pub fn new(store: Arc<ProjectStore>) -> Self {
        Self {
            store,
            cachedProjects: RwLock::new(None),
        }
    }

    pub async fn load(&self) -> Result<()> {
        let data = self.store.load().await?;
        debug!("[ProjectCache::load] Cached {} top-level projects", data.projects.len());
        *self.cachedProjects.write() = Some(data.projects);
        Ok(())
    }

    /// Copy of the top-level project list. Fails until `load()` has completed.
    pub fn get(&self) -> Result<Vec<ProjectNode>> {
        self.cachedProjects
            .read()
            .as_ref()
            .cloned()
            .ok_or(DeadlineError::NotInitialized)
    }

    pub fn clear(&self) {
        debug!("[ProjectCache::clear] Clearing cache");
        *self.cachedProjects.write() = None;
    }

    pub fn isInitialized(&self) -> bool {
        self.cachedProjects.read().is_some()
    }

    pub async fn reload(&self) -> Result<()> {
        self.clear();
        self.load().await
    }
}
