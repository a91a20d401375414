// Project manager - the only place new projects and work-log entries come from

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::ProjectCache;
use crate::error::{DeadlineError, Result};
use crate::host::Host;
use crate::models::{HeaderFrontmatter, ProjectData, ProjectNode, Settings, Timelog};
use crate::storage::{joinVaultPath, toMarkdown, ProjectStore};
use crate::tree::{countDirectChildren, findById, findByIdMut, flattenWithDepth};
use crate::vault::{validateName, Vault};
use super::common::{localTimestamp, newProjectId};

pub struct ProjectManager {
    settings: Settings,
    store: Arc<ProjectStore>,
    cache: Arc<ProjectCache>,
    vault: Arc<dyn Vault>,
    host: Arc<dyn Host>,
}

impl ProjectManager {
    pub fn new(
        settings: Settings,
        store: Arc<ProjectStore>,
        cache: Arc<ProjectCache>,
        vault: Arc<dyn Vault>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            settings,
            store,
            cache,
            vault,
            host,
        }
    }

    /// "<id> <name>" for every top-level project
    pub fn getProjectList(&self) -> Result<Vec<String>> {
        let projects = self.cache.get()?;
        Ok(projects
            .iter()
            .map(|p| format!("{} {}", p.id, p.name))
            .collect())
    }

    /// "<id> <name>" for every project, indented two spaces per level
    pub fn getAllProjectList(&self) -> Result<Vec<String>> {
        let projects = self.cache.get()?;
        Ok(flattenWithDepth(&projects)
            .map(|(p, depth)| format!("{}{} {}", "  ".repeat(depth), p.id, p.name))
            .collect())
    }

    /// Create a project (or a subproject of `parentId`): folder, note with header,
    /// then the node in the project tree.
    pub async fn createProject(&self, data: ProjectData, parentId: Option<&str>) -> Result<ProjectNode> {
        let parentId = parentId.filter(|p| !p.is_empty());
        validateName(&data.name)?;
        if !data.workload.is_finite() || data.workload < 0.0 {
            return Err(DeadlineError::InvalidInput(format!(
                "Workload must be a non-negative number of hours, got {}",
                data.workload
            )));
        }

        // Held until the new node is saved, so sibling ids cannot collide
        let _writeGuard = self.store.lockForWrite().await;

        self.cache.reload().await?;
        let projects = self.cache.get()?;

        let parent = match parentId {
            Some(pid) => Some(
                findById(&projects, pid)
                    .cloned()
                    .ok_or_else(|| DeadlineError::NotFound(format!("project with ID \"{}\"", pid)))?,
            ),
            None => None,
        };

        let id = newProjectId(parentId, countDirectChildren(&projects, parentId.unwrap_or("")));
        debug!("[createProject] New project id: {}", id);

        let projectPath = self.createProjectFolder(&id, &data.name, parent.as_ref()).await?;
        let projectFile = joinVaultPath(&projectPath, &format!("{}-{}.md", id, data.name));
        let node = ProjectNode::new(id, data, projectPath, projectFile);

        self.createProjectFile(&node, parent.as_ref()).await?;

        // Fresh from the store, not from the cache
        let mut stored = self.store.load().await?;
        match parentId {
            None => stored.projects.push(node.clone()),
            Some(pid) => findByIdMut(&mut stored.projects, pid)
                .ok_or_else(|| DeadlineError::NotFound(format!("project with ID \"{}\"", pid)))?
                .subprojects
                .push(node.clone()),
        }
        self.store.save(&stored).await?;
        self.cache.reload().await?;

        info!("[createProject] Created project {} at {}", node.id, node.externalFile);
        Ok(node)
    }

    async fn createProjectFolder(&self, id: &str, name: &str, parent: Option<&ProjectNode>) -> Result<String> {
        let dirName = self.settings.projectDirName(id, name);
        let base = match parent {
            Some(p) => p.externalPath.as_str(),
            None => self.settings.projectPath.as_str(),
        };
        let path = joinVaultPath(base, &dirName);

        self.vault.createFolder(&path).await?;
        debug!("[createProjectFolder] Created folder {}", path);
        Ok(path)
    }

    async fn createProjectFile(&self, node: &ProjectNode, parent: Option<&ProjectNode>) -> Result<()> {
        let header = HeaderFrontmatter::new(node, parent.map(|p| p.externalFile.as_str()));
        let content = toMarkdown(&header, "")?;

        self.vault.createDocument(&node.externalFile, &content).await?;
        self.host.openDocument(&node.externalFile);
        Ok(())
    }

    /// Append a work-log entry stamped with the local time
    pub async fn logTime(&self, projectId: &str, hours: f64, description: Option<String>) -> Result<Timelog> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(DeadlineError::InvalidInput(format!(
                "Time spent must be a non-negative number of hours, got {}",
                hours
            )));
        }
        let info = description.filter(|d| !d.trim().is_empty());

        let _writeGuard = self.store.lockForWrite().await;

        let mut data = self.store.load().await?;
        let project = findByIdMut(&mut data.projects, projectId)
            .ok_or_else(|| DeadlineError::NotFound(format!("project with ID \"{}\"", projectId)))?;

        let entry = project.addTimelog(localTimestamp(), hours, info);
        let projectName = project.name.clone();

        self.store.save(&data).await?;
        self.cache.reload().await?;

        info!("[logTime] Logged {}h on project {}", hours, projectId);
        self.host.notice(&format!("Added Timelog to Project \"{}\".", projectName));
        Ok(entry)
    }
}
