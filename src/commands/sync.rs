// Project sync - keeps project notes and the project tree in agreement
// Header edits flow into the tree; renames move the tree's note reference; ids never change

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_yaml::Mapping;
use tracing::{debug, info, warn};

use crate::cache::ProjectCache;
use crate::error::{DeadlineError, Result};
use crate::host::Host;
use crate::models::{ProjectHeader, ProjectNode};
use crate::storage::{joinVaultPath, parentVaultPath, parseFrontmatter, replaceHeaderId, splitFrontmatter, ProjectStore};
use crate::tree::{findByExternalFile, findByExternalFileMut, forEachMut};
use crate::vault::Vault;
use super::events::VaultEvent;

/// What a header sync found
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No header, or not tagged as a project note
    Untracked,
    /// Tagged, but no project refers to this note
    Unowned,
    /// Header text identical to the last one seen for this note
    Unchanged,
    /// Header matches the project
    Consistent,
    /// Header values accepted into the project tree
    Updated(Vec<&'static str>),
}

pub struct ProjectSync {
    store: Arc<ProjectStore>,
    cache: Arc<ProjectCache>,
    vault: Arc<dyn Vault>,
    host: Arc<dyn Host>,
    cachedHeaders: Mutex<HashMap<String, String>>,
}

impl ProjectSync {
    pub fn new(
        store: Arc<ProjectStore>,
        cache: Arc<ProjectCache>,
        vault: Arc<dyn Vault>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            store,
            cache,
            vault,
            host,
            cachedHeaders: Mutex::new(HashMap::new()),
        }
    }

    /// Read a note's header. None when the note has no parseable header.
    async fn readHeader(&self, path: &str) -> Result<Option<(String, String, ProjectHeader)>> {
        let content = self.vault.readDocument(path).await?;
        let Some((yaml, _)) = splitFrontmatter(&content) else {
            return Ok(None);
        };
        let yaml = yaml.to_string();
        let Some((map, _)) = parseFrontmatter::<Mapping>(&content) else {
            warn!("[readHeader] Unparseable header in {}", path);
            return Ok(None);
        };
        let header = ProjectHeader::fromMapping(&map);
        Ok(Some((content, yaml, header)))
    }

    /// Bring the project tree in line with an edited note header.
    ///
    /// A changed id is reverted in the note and reported as
    /// [`DeadlineError::IdentifierConflict`]; nothing else from that edit is applied.
    pub async fn syncFromHeader(&self, path: &str) -> Result<SyncOutcome> {
        let Some((content, yaml, header)) = self.readHeader(path).await? else {
            return Ok(SyncOutcome::Untracked);
        };
        if !header.isTracked() {
            return Ok(SyncOutcome::Untracked);
        }
        if self.cachedHeaders.lock().get(path) == Some(&yaml) {
            debug!("[syncFromHeader] Header of {} unchanged", path);
            return Ok(SyncOutcome::Unchanged);
        }

        let _writeGuard = self.store.lockForWrite().await;

        // The store, not the cache: other processes may have added projects
        let mut data = self.store.load().await?;
        let Some(project) = findByExternalFileMut(&mut data.projects, path) else {
            debug!("[syncFromHeader] No project for {}", path);
            return Ok(SyncOutcome::Unowned);
        };

        if header.id.as_deref() != Some(project.id.as_str()) {
            let found = header.id.clone().unwrap_or_default();
            let restored = replaceHeaderId(&content, &project.id).ok_or_else(|| {
                DeadlineError::Filesystem(format!("Cannot restore header of {}", path))
            })?;
            self.vault.writeDocument(path, &restored).await?;
            // No snapshot: the next event for this note picks up its other fields
            self.cachedHeaders.lock().remove(path);
            warn!("[syncFromHeader] Reverted id change {} -> {} in {}", project.id, found, path);
            return Err(DeadlineError::IdentifierConflict {
                path: path.to_string(),
                expected: project.id.clone(),
                found,
            });
        }

        let changed = applyHeader(project, &header);
        if changed.is_empty() {
            self.cachedHeaders.lock().insert(path.to_string(), yaml);
            return Ok(SyncOutcome::Consistent);
        }
        let (id, name) = (project.id.clone(), project.name.clone());

        self.store.save(&data).await?;
        self.cache.reload().await?;
        self.cachedHeaders.lock().insert(path.to_string(), yaml);

        info!("[syncFromHeader] Project {} updated from {}: {:?}", id, path, changed);
        self.host.notice(&format!("Project \"{}\" updated.", name));
        Ok(SyncOutcome::Updated(changed))
    }

    /// A project note moved from `oldPath` to `newPath`
    pub async fn handleRename(&self, oldPath: &str, newPath: &str) -> Result<()> {
        let _writeGuard = self.store.lockForWrite().await;

        let mut data = self.store.load().await?;
        let project = findByExternalFileMut(&mut data.projects, oldPath)
            .ok_or_else(|| DeadlineError::NotFound(format!("project with file \"{}\"", oldPath)))?;

        project.externalFile = newPath.to_string();
        project.externalPath = parentVaultPath(newPath);
        let id = project.id.clone();

        self.store.save(&data).await?;
        self.cache.reload().await?;

        let mut headers = self.cachedHeaders.lock();
        if let Some(snapshot) = headers.remove(oldPath) {
            headers.insert(newPath.to_string(), snapshot);
        }

        info!("[handleRename] Project {} moved {} -> {}", id, oldPath, newPath);
        Ok(())
    }

    /// A folder moved: every project under it follows. Returns how many moved.
    pub async fn handleFolderRename(&self, oldFolder: &str, newFolder: &str) -> Result<usize> {
        let _writeGuard = self.store.lockForWrite().await;

        let mut data = self.store.load().await?;
        let mut moved = 0;
        forEachMut(&mut data.projects, &mut |project: &mut ProjectNode| {
            if let Some(file) = movedPath(&project.externalFile, oldFolder, newFolder) {
                project.externalFile = file;
                project.externalPath = parentVaultPath(&project.externalFile);
                moved += 1;
            }
        });

        if moved > 0 {
            self.store.save(&data).await?;
            self.cache.reload().await?;
            let mut headers = self.cachedHeaders.lock();
            let snapshots: Vec<(String, String)> = headers.drain().collect();
            for (path, snapshot) in snapshots {
                let path = movedPath(&path, oldFolder, newFolder).unwrap_or(path);
                headers.insert(path, snapshot);
            }
            info!("[handleFolderRename] {} projects moved {} -> {}", moved, oldFolder, newFolder);
        }
        Ok(moved)
    }

    /// Sync every note below `root`. Per-note failures are reported and skipped.
    pub async fn syncAll(&self, root: &str) -> Result<usize> {
        let mut folders = vec![root.to_string()];
        let mut updated = 0;

        while let Some(folder) = folders.pop() {
            let children = match self.vault.listChildren(&folder).await {
                Ok(children) => children,
                Err(e) if folder == root => return Err(e),
                Err(e) => {
                    debug!("[syncAll] Skipping {}: {}", folder, e);
                    continue;
                }
            };

            for name in children {
                let path = joinVaultPath(&folder, &name);
                if !name.ends_with(".md") {
                    folders.push(path);
                    continue;
                }
                match self.syncFromHeader(&path).await {
                    Ok(SyncOutcome::Updated(_)) => updated += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("[syncAll] {}: {}", path, e);
                        self.host.notice(&e.to_string());
                    }
                }
            }
        }

        info!("[syncAll] {} project notes updated under {}", updated, root);
        Ok(updated)
    }

    /// Event entry point: every failure ends here as a notice
    pub async fn handleEvent(&self, event: VaultEvent) {
        debug!("[handleEvent] {:?}", event);
        let result = match &event {
            VaultEvent::HeaderChanged { path } => self.syncFromHeader(path).await.map(|_| ()),
            VaultEvent::Renamed { from, to } => self.dispatchRename(from, to).await,
        };

        if let Err(e) = result {
            warn!("[handleEvent] {:?} failed: {}", event, e);
            self.host.notice(&e.to_string());
        }
    }

    async fn dispatchRename(&self, from: &str, to: &str) -> Result<()> {
        if !self.vault.exists(to).await {
            debug!("[dispatchRename] {} is gone again, skipping", to);
            return Ok(());
        }
        if to.ends_with(".md") {
            // Only project notes are tracked; other renames pass by
            match self.readHeader(to).await? {
                Some((_, _, header)) if header.isTracked() => {
                    let owned = findByExternalFile(&self.store.load().await?.projects, from).is_some();
                    if owned {
                        self.handleRename(from, to).await
                    } else {
                        // Saved through a temp file renamed over the note
                        debug!("[dispatchRename] {} replaced {}, syncing its header", from, to);
                        self.syncFromHeader(to).await.map(|_| ())
                    }
                }
                _ => Ok(()),
            }
        } else {
            self.handleFolderRename(from, to).await.map(|_| ())
        }
    }
}

/// Accept header values into `project`; names the fields that changed
fn applyHeader(project: &mut ProjectNode, header: &ProjectHeader) -> Vec<&'static str> {
    let mut changed = Vec::new();

    if let Some(name) = &header.name {
        if *name != project.name {
            project.name = name.clone();
            changed.push("name");
        }
    }
    if let Some(deadline) = &header.deadline {
        if *deadline != project.deadline {
            project.deadline = deadline.clone();
            changed.push("deadline");
        }
    }
    if let Some(priority) = header.priority {
        if priority != project.priority {
            project.priority = priority;
            changed.push("priority");
        }
    }
    if let Some(workload) = header.workload {
        if workload != project.workload {
            project.workload = workload;
            changed.push("workload");
        }
    }
    if let Some(status) = header.status {
        if status != project.status {
            project.status = status;
            changed.push("status");
        }
    }

    changed
}

/// `path` re-rooted from `oldFolder` to `newFolder`, if it lies below `oldFolder`
fn movedPath(path: &str, oldFolder: &str, newFolder: &str) -> Option<String> {
    let rest = path.strip_prefix(oldFolder)?.strip_prefix('/')?;
    Some(joinVaultPath(newFolder, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::manager::ProjectManager;
    use crate::host::testing::RecordingHost;
    use crate::models::{ProjectData, ProjectPriority, ProjectStatus, Settings};
    use crate::storage::dataFilePath;
    use crate::tree::findById;
    use crate::vault::FsVault;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
        store: Arc<ProjectStore>,
        cache: Arc<ProjectCache>,
        host: Arc<RecordingHost>,
        manager: ProjectManager,
        sync: ProjectSync,
    }

    impl Fixture {
        fn read(&self, path: &str) -> String {
            std::fs::read_to_string(self.root.join(path)).unwrap()
        }

        fn write(&self, path: &str, content: &str) {
            std::fs::write(self.root.join(path), content).unwrap();
        }

        /// Rewrite the header line for `key`, as a user editing the note would
        fn setField(&self, path: &str, key: &str, value: &str) {
            let content = self.read(path);
            let prefix = format!("{}:", key);
            assert!(content.lines().any(|l| l.starts_with(&prefix)), "{} not in {}", key, content);
            let edited: Vec<String> = content
                .lines()
                .map(|l| if l.starts_with(&prefix) { format!("{} {}", prefix, value) } else { l.to_string() })
                .collect();
            self.write(path, &(edited.join("\n") + "\n"));
        }

        fn project(&self, id: &str) -> ProjectNode {
            findById(&self.cache.get().unwrap(), id).cloned().unwrap()
        }
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let store = Arc::new(ProjectStore::new(dataFilePath(&root)));
        let cache = Arc::new(ProjectCache::new(store.clone()));
        cache.load().await.unwrap();
        let host = Arc::new(RecordingHost::default());
        let vault: Arc<dyn Vault> = Arc::new(FsVault::new(&root));
        let manager = ProjectManager::new(
            Settings::default(),
            store.clone(),
            cache.clone(),
            vault.clone(),
            host.clone(),
        );
        let sync = ProjectSync::new(store.clone(), cache.clone(), vault, host.clone());
        Fixture { _dir: dir, root, store, cache, host, manager, sync }
    }

    const A_FILE: &str = "Projects/1-A/1-A.md";

    #[tokio::test]
    async fn test_matching_header_writes_nothing() {
        let f = fixture().await;
        let node = f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        assert_eq!(node.priority, ProjectPriority::Medium);
        assert_eq!(node.status, ProjectStatus::Open);

        let before = std::fs::read(f.store.path()).unwrap();
        let noticesBefore = f.host.notices().len();

        assert_eq!(f.sync.syncFromHeader(A_FILE).await.unwrap(), SyncOutcome::Consistent);
        assert_eq!(std::fs::read(f.store.path()).unwrap(), before);
        assert_eq!(f.host.notices().len(), noticesBefore);

        // Second pass short-circuits on the remembered header
        assert_eq!(f.sync.syncFromHeader(A_FILE).await.unwrap(), SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_header_edits_flow_into_tree() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        f.manager.logTime("1", 2.0, None).await.unwrap();

        f.setField(A_FILE, "priority", "High");
        f.setField(A_FILE, "status", "done");
        f.setField(A_FILE, "deadline", "2024-12-24");

        let outcome = f.sync.syncFromHeader(A_FILE).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Updated(vec!["deadline", "priority", "status"]));

        let project = f.project("1");
        assert_eq!(project.priority, ProjectPriority::High);
        assert_eq!(project.status, ProjectStatus::Done);
        assert_eq!(project.deadline.as_deref(), Some("2024-12-24"));
        assert_eq!(project.timelog.len(), 1);
        assert_eq!(f.store.load().await.unwrap().projects[0], project);
        assert_eq!(f.host.notices().last().map(String::as_str), Some("Project \"A\" updated."));
    }

    #[tokio::test]
    async fn test_invalid_enum_values_are_not_accepted() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        f.setField(A_FILE, "priority", "Critical");
        f.setField(A_FILE, "workload", "3");

        assert_eq!(f.sync.syncFromHeader(A_FILE).await.unwrap(), SyncOutcome::Updated(vec!["workload"]));
        let project = f.project("1");
        assert_eq!(project.priority, ProjectPriority::Medium);
        assert_eq!(project.workload, 3.0);
    }

    #[tokio::test]
    async fn test_id_change_is_reverted_and_nothing_else_applied() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        f.manager.createProject(ProjectData::new("B"), None).await.unwrap();
        let sub = f.manager.createProject(ProjectData::new("Docs"), Some("2")).await.unwrap();
        let node = f.manager.createProject(ProjectData::new("C"), None).await.unwrap();
        let child = f.manager.createProject(ProjectData::new("Web"), Some(&node.id)).await.unwrap();
        assert_eq!(sub.id, "2-1");
        assert_eq!(child.id, "3-1");

        let before = std::fs::read(f.store.path()).unwrap();
        f.setField(&child.externalFile, "id", "\"3-9\"");
        f.setField(&child.externalFile, "name", "Hijacked");

        let result = f.sync.syncFromHeader(&child.externalFile).await;
        match result {
            Err(DeadlineError::IdentifierConflict { expected, found, .. }) => {
                assert_eq!(expected, "3-1");
                assert_eq!(found, "3-9");
            }
            other => panic!("expected identifier conflict, got {:?}", other),
        }

        let content = f.read(&child.externalFile);
        assert!(content.contains("id: \"3-1\""));
        assert!(!content.contains("3-9"));
        assert_eq!(std::fs::read(f.store.path()).unwrap(), before);
        assert_eq!(f.project("3-1").name, "Web");

        // The write-back raises another change event; that pass reads the
        // restored header and takes the remaining edits
        assert_eq!(
            f.sync.syncFromHeader(&child.externalFile).await.unwrap(),
            SyncOutcome::Updated(vec!["name"])
        );
        assert_eq!(f.project("3-1").name, "Hijacked");
    }

    #[tokio::test]
    async fn test_save_through_temp_file_syncs_header() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();

        let tmp = "Projects/1-A/1-A.md___jb_tmp___";
        let edited = f.read(A_FILE).replace("status: open", "status: done");
        f.write(tmp, &edited);
        std::fs::rename(f.root.join(tmp), f.root.join(A_FILE)).unwrap();
        f.sync
            .handleEvent(VaultEvent::Renamed { from: tmp.to_string(), to: A_FILE.to_string() })
            .await;

        let project = f.project("1");
        assert_eq!(project.status, ProjectStatus::Done);
        assert_eq!(project.externalFile, A_FILE);
        assert_eq!(f.host.notices(), vec!["Project \"A\" updated.".to_string()]);
    }

    #[tokio::test]
    async fn test_projects_created_elsewhere_are_synced() {
        let f = fixture().await;

        // A second process on the same vault: its own store handle and cache
        let otherStore = Arc::new(ProjectStore::new(dataFilePath(&f.root)));
        let otherCache = Arc::new(ProjectCache::new(otherStore.clone()));
        otherCache.load().await.unwrap();
        let other = ProjectManager::new(
            Settings::default(),
            otherStore,
            otherCache,
            Arc::new(FsVault::new(&f.root)),
            Arc::new(RecordingHost::default()),
        );
        other.createProject(ProjectData::new("A"), None).await.unwrap();
        assert!(f.cache.get().unwrap().is_empty());

        f.setField(A_FILE, "status", "done");
        assert_eq!(f.sync.syncFromHeader(A_FILE).await.unwrap(), SyncOutcome::Updated(vec!["status"]));
        assert_eq!(f.store.load().await.unwrap().projects[0].status, ProjectStatus::Done);
        assert_eq!(f.project("1").status, ProjectStatus::Done);
    }

    #[tokio::test]
    async fn test_untracked_and_unowned_notes_are_ignored() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        f.write("Projects/plain.md", "# Just a note\n");
        f.write("Projects/other.md", "---\nid: \"1\"\nname: X\ntags:\n  - reading\n---\n");
        f.write("Projects/stray.md", "---\nid: \"1\"\nname: X\ntags:\n  - deadline\n---\n");

        let before = std::fs::read(f.store.path()).unwrap();
        assert_eq!(f.sync.syncFromHeader("Projects/plain.md").await.unwrap(), SyncOutcome::Untracked);
        assert_eq!(f.sync.syncFromHeader("Projects/other.md").await.unwrap(), SyncOutcome::Untracked);
        assert_eq!(f.sync.syncFromHeader("Projects/stray.md").await.unwrap(), SyncOutcome::Unowned);
        assert_eq!(std::fs::read(f.store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_rename_updates_location_only() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        f.manager.logTime("1", 1.0, None).await.unwrap();
        let before = f.project("1");

        std::fs::rename(f.root.join(A_FILE), f.root.join("Projects/1-A/renamed.md")).unwrap();
        f.sync.handleRename(A_FILE, "Projects/1-A/renamed.md").await.unwrap();

        let after = f.project("1");
        assert_eq!(after.externalFile, "Projects/1-A/renamed.md");
        assert_eq!(after.externalPath, "Projects/1-A");
        assert_eq!(ProjectNode { externalFile: before.externalFile.clone(), ..after.clone() }, before);
    }

    #[tokio::test]
    async fn test_queued_renames_apply_in_order() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();

        // The second rename only finds its project if the first has completed
        let (first, second) = tokio::join!(
            f.sync.handleRename(A_FILE, "Projects/1-A/step.md"),
            f.sync.handleRename("Projects/1-A/step.md", "Projects/1-A/final.md"),
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(f.project("1").externalFile, "Projects/1-A/final.md");
    }

    #[tokio::test]
    async fn test_rename_of_unknown_note_is_not_found() {
        let f = fixture().await;
        let result = f.sync.handleRename("Projects/x.md", "Projects/y.md").await;
        assert!(matches!(result, Err(DeadlineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_folder_rename_moves_nested_projects() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        f.manager.createProject(ProjectData::new("Docs"), Some("1")).await.unwrap();
        f.manager.createProject(ProjectData::new("B"), None).await.unwrap();

        std::fs::rename(f.root.join("Projects/1-A"), f.root.join("Projects/1-Alpha")).unwrap();
        f.sync
            .handleEvent(VaultEvent::Renamed {
                from: "Projects/1-A".to_string(),
                to: "Projects/1-Alpha".to_string(),
            })
            .await;

        assert_eq!(f.project("1").externalFile, "Projects/1-Alpha/1-A.md");
        assert_eq!(f.project("1-1").externalPath, "Projects/1-Alpha/1-1-Docs");
        assert_eq!(f.project("2").externalFile, "Projects/2-B/2-B.md");
    }

    #[tokio::test]
    async fn test_events_turn_failures_into_notices() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        f.setField(A_FILE, "id", "\"7\"");

        f.sync.handleEvent(VaultEvent::HeaderChanged { path: A_FILE.to_string() }).await;
        let notice = f.host.notices().last().cloned().unwrap();
        assert!(notice.contains("ID change not allowed"), "{}", notice);

        // Untagged renames are ignored without a notice
        f.write("Projects/plain.md", "# plain\n");
        std::fs::rename(f.root.join("Projects/plain.md"), f.root.join("Projects/moved.md")).unwrap();
        let count = f.host.notices().len();
        f.sync
            .handleEvent(VaultEvent::Renamed {
                from: "Projects/plain.md".to_string(),
                to: "Projects/moved.md".to_string(),
            })
            .await;
        assert_eq!(f.host.notices().len(), count);
    }

    #[tokio::test]
    async fn test_sync_all_picks_up_offline_edits() {
        let f = fixture().await;
        f.manager.createProject(ProjectData::new("A"), None).await.unwrap();
        let docs = f.manager.createProject(ProjectData::new("Docs"), Some("1")).await.unwrap();
        f.manager.createProject(ProjectData::new("B"), None).await.unwrap();

        f.setField(&docs.externalFile, "name", "Handbook");
        f.setField("Projects/2-B/2-B.md", "workload", "8");

        assert_eq!(f.sync.syncAll("Projects").await.unwrap(), 2);
        assert_eq!(f.project("1-1").name, "Handbook");
        assert_eq!(f.project("2").workload, 8.0);
        assert_eq!(f.sync.syncAll("Projects").await.unwrap(), 0);
    }
}
