// Models module for Deadline
// All fields use camelCase, matching the JSON and frontmatter keys

pub mod config;
pub mod header;
pub mod project;

pub use config::{Settings, SettingsOverride};
pub use header::{HeaderFrontmatter, ProjectHeader, PROJECT_TAG};
pub use project::{ProjectData, ProjectNode, ProjectPriority, ProjectStatus, ProjectsFile, Timelog};
