// Allow non-snake_case names for JSON/YAML field compatibility with existing vaults
#![allow(non_snake_case)]

pub mod cache;
pub mod commands;
pub mod error;
pub mod host;
pub mod models;
pub mod storage;
pub mod tree;
pub mod vault;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cache::ProjectCache;
use crate::commands::events::{runEventLoop, watchVault};
use crate::commands::manager::ProjectManager;
use crate::commands::sync::ProjectSync;
use crate::error::{DeadlineError, Result};
use crate::host::{ConsoleHost, Host};
use crate::models::{ProjectData, ProjectPriority, ProjectStatus, Settings};
use crate::storage::{dataFilePath, loadGlobalConfig, loadVaultSettings, saveGlobalConfig, ProjectStore};
use crate::tree::flattenWithDepth;
use crate::vault::{FsVault, Vault};

/// Everything needed to work on one vault
pub struct Deadline {
    pub settings: Settings,
    pub vault: Arc<FsVault>,
    pub store: Arc<ProjectStore>,
    pub cache: Arc<ProjectCache>,
    pub manager: ProjectManager,
    pub sync: ProjectSync,
}

impl Deadline {
    /// Wire up store, cache, manager and sync for `vaultPath` and load the project tree
    pub async fn open(vaultPath: &Path, settings: Settings, host: Arc<dyn Host>) -> Result<Self> {
        let vault = Arc::new(FsVault::new(vaultPath));
        let store = Arc::new(ProjectStore::new(dataFilePath(vaultPath)));
        let cache = Arc::new(ProjectCache::new(store.clone()));
        cache.load().await?;

        let documents: Arc<dyn Vault> = vault.clone();
        let manager = ProjectManager::new(
            settings.clone(),
            store.clone(),
            cache.clone(),
            documents.clone(),
            host.clone(),
        );
        let sync = ProjectSync::new(store.clone(), cache.clone(), documents, host);

        info!("[Deadline::open] Opened vault {:?}", vaultPath);
        Ok(Self {
            settings,
            vault,
            store,
            cache,
            manager,
            sync,
        })
    }

    /// One line per project, indented by depth, with status, deadline and logged hours
    pub fn describeProjects(&self) -> Result<Vec<String>> {
        let projects = self.cache.get()?;
        Ok(flattenWithDepth(&projects)
            .map(|(p, depth)| {
                let deadline = p
                    .deadline
                    .as_deref()
                    .map(|d| format!(" due {}", d))
                    .unwrap_or_default();
                format!(
                    "{}{} {} [{}, {}]{} {}h/{}h",
                    "  ".repeat(depth),
                    p.id,
                    p.name,
                    p.status.label(),
                    p.priority.label(),
                    deadline,
                    p.totalTime(),
                    p.workload
                )
            })
            .collect())
    }

    /// Resync every note, then follow vault events until Ctrl-C
    pub async fn watch(&self) -> Result<()> {
        self.sync.syncAll(&self.settings.projectPath).await?;

        let (_watcher, events) = watchVault(&self.vault)?;
        tokio::select! {
            _ = runEventLoop(&self.sync, events) => {}
            _ = tokio::signal::ctrl_c() => info!("[Deadline::watch] Interrupted"),
        }
        Ok(())
    }
}

// ============================================
// COMMAND LINE
// ============================================

#[derive(Debug, Parser)]
#[command(
    name = "deadline",
    version,
    about = "Project tree kept in sync with markdown project notes"
)]
struct Cli {
    /// Vault directory (defaults to the one remembered by `init`)
    #[arg(long, global = true, value_name = "DIR")]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Remember a vault as the current one and create its project data
    Init { dir: PathBuf },
    /// Create a top-level project
    New(NewProjectArgs),
    /// Create a subproject below an existing project
    Sub {
        parentId: String,
        #[command(flatten)]
        project: NewProjectArgs,
    },
    /// Log hours spent on a project
    Log {
        id: String,
        hours: f64,
        description: Option<String>,
    },
    /// Show the project tree
    List {
        /// Only top-level projects, without details
        #[arg(long)]
        top: bool,
    },
    /// Bring the project tree in line with every project note
    Sync,
    /// Keep the project tree in sync while notes change
    Watch,
}

#[derive(Debug, Args)]
struct NewProjectArgs {
    name: String,
    #[arg(long)]
    deadline: Option<String>,
    #[arg(long)]
    priority: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    workload: f64,
    #[arg(long)]
    status: Option<String>,
}

impl NewProjectArgs {
    fn toProjectData(&self) -> Result<ProjectData> {
        let priority = match &self.priority {
            Some(p) => ProjectPriority::fromStr(p)
                .ok_or_else(|| DeadlineError::InvalidInput(format!("Unknown priority \"{}\"", p)))?,
            None => ProjectPriority::default(),
        };
        let status = match &self.status {
            Some(s) => ProjectStatus::fromStr(s)
                .ok_or_else(|| DeadlineError::InvalidInput(format!("Unknown status \"{}\"", s)))?,
            None => ProjectStatus::default(),
        };

        Ok(ProjectData {
            name: self.name.trim().to_string(),
            deadline: self.deadline.clone().filter(|d| !d.trim().is_empty()),
            priority,
            workload: self.workload,
            status,
        })
    }
}

pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let host = Arc::new(ConsoleHost);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("[run] Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli, host.clone())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            host.notice(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli, host: Arc<ConsoleHost>) -> Result<()> {
    let mut global = loadGlobalConfig();

    if let Commands::Init { dir } = &cli.command {
        return initVault(&mut global, dir, host.as_ref()).await;
    }

    let vaultPath = cli
        .vault
        .clone()
        .or_else(|| global.currentVault.clone().map(PathBuf::from))
        .ok_or_else(|| {
            DeadlineError::InvalidInput("No vault selected. Run `deadline init <dir>` or pass --vault".to_string())
        })?;
    let settings = loadVaultSettings(&global, &vaultPath);
    let app = Deadline::open(&vaultPath, settings, host.clone()).await?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::New(args) => {
            app.manager.createProject(args.toProjectData()?, None).await?;
            Ok(())
        }
        Commands::Sub { parentId, project } => {
            app.manager
                .createProject(project.toProjectData()?, Some(&parentId))
                .await?;
            Ok(())
        }
        Commands::Log { id, hours, description } => {
            app.manager.logTime(&id, hours, description).await?;
            Ok(())
        }
        Commands::List { top } => {
            let lines = if top {
                app.manager.getProjectList()?
            } else {
                app.describeProjects()?
            };
            for line in lines {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Sync => {
            let updated = app.sync.syncAll(&app.settings.projectPath).await?;
            host.notice(&format!("{} project(s) updated.", updated));
            Ok(())
        }
        Commands::Watch => app.watch().await,
    }
}

async fn initVault(global: &mut Settings, dir: &Path, host: &dyn Host) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DeadlineError::Filesystem(format!("Cannot create {:?}: {}", dir, e)))?;
    let dir = tokio::fs::canonicalize(dir)
        .await
        .map_err(|e| DeadlineError::Filesystem(format!("Cannot resolve {:?}: {}", dir, e)))?;

    ProjectStore::new(dataFilePath(&dir)).load().await?;

    global.currentVault = Some(dir.to_string_lossy().to_string());
    saveGlobalConfig(global)?;

    info!("[initVault] Current vault set to {:?}", dir);
    host.notice(&format!("Vault {} ready.", dir.display()));
    Ok(())
}
