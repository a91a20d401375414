// Project model for the project tree document
// Sequential hierarchical id ("2", "2-1", "2-1-3"), external note path, nested subprojects

use serde::{Deserialize, Deserializer, Serialize};

/// Project priority - closed set, defaults to Medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProjectPriority {
    High,
    #[default]
    Medium,
    Low,
    None,
}

impl ProjectPriority {
    pub fn fromStr(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::None => "None",
        }
    }
}

/// Project status - defaults to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Open,
    InProgress,
    Done,
}

impl ProjectStatus {
    pub fn fromStr(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "open" => Some(Self::Open),
            "in_progress" | "inprogress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

/// One work-log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timelog {
    pub date: String, // Local timestamp, YYYYMMDD HH:MM
    pub time: f64,    // Hours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

/// Input for creating a project (id and locations are assigned by the manager)
#[derive(Debug, Clone, Default)]
pub struct ProjectData {
    pub name: String,
    pub deadline: Option<String>,
    pub priority: ProjectPriority,
    pub workload: f64,
    pub status: ProjectStatus,
}

impl ProjectData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A node of the project tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "path", default)]
    pub externalPath: String, // Folder holding the project note
    #[serde(rename = "file", default)]
    pub externalFile: String, // Project note itself
    #[serde(default, deserialize_with = "emptyAsNone", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default)]
    pub priority: ProjectPriority,
    #[serde(default)]
    pub workload: f64,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub timelog: Vec<Timelog>,
    #[serde(default)]
    pub subprojects: Vec<ProjectNode>,
}

impl ProjectNode {
    pub fn new(id: String, data: ProjectData, externalPath: String, externalFile: String) -> Self {
        Self {
            id,
            name: data.name,
            externalPath,
            externalFile,
            deadline: data.deadline.filter(|d| !d.trim().is_empty()),
            priority: data.priority,
            workload: data.workload.max(0.0),
            status: data.status,
            timelog: Vec::new(),
            subprojects: Vec::new(),
        }
    }

    /// Own logged hours plus those of every descendant. Never cached.
    pub fn totalTime(&self) -> f64 {
        let ownTime: f64 = self.timelog.iter().map(|log| log.time).sum();
        let subprojectTime: f64 = self.subprojects.iter().map(|sub| sub.totalTime()).sum();
        ownTime + subprojectTime
    }

    /// Append a work-log entry and hand back a copy of it
    pub fn addTimelog(&mut self, date: String, time: f64, info: Option<String>) -> Timelog {
        let entry = Timelog { date, time, info };
        self.timelog.push(entry.clone());
        entry
    }
}

/// Root of the persisted project tree document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectsFile {
    #[serde(default)]
    pub projects: Vec<ProjectNode>,
}

fn emptyAsNone<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
