// Project note header (YAML frontmatter at the top of each project note)
// Read as an untyped mapping, then validated field by field into typed values

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::warn;

use super::project::{ProjectNode, ProjectPriority, ProjectStatus};

/// Tag marking a note as one owned by the project tree
pub const PROJECT_TAG: &str = "deadline";

/// Header written into a newly created project note
#[derive(Debug, Clone, Serialize)]
pub struct HeaderFrontmatter {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>, // "[[parent note]]" for subprojects
    pub deadline: String,
    pub priority: ProjectPriority,
    pub workload: f64,
    pub status: ProjectStatus,
    pub tags: Vec<String>,
}

impl HeaderFrontmatter {
    pub fn new(node: &ProjectNode, parentFile: Option<&str>) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            link: parentFile.map(|file| format!("[[{}]]", file)),
            deadline: node.deadline.clone().unwrap_or_default(),
            priority: node.priority,
            workload: node.workload,
            status: node.status,
            tags: vec![PROJECT_TAG.to_string()],
        }
    }
}

/// Validated header values. `None` means the field is absent or invalid and
/// must not change the project; `deadline: Some(None)` clears the deadline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectHeader {
    pub id: Option<String>,
    pub name: Option<String>,
    pub link: Option<String>,
    pub deadline: Option<Option<String>>,
    pub priority: Option<ProjectPriority>,
    pub workload: Option<f64>,
    pub status: Option<ProjectStatus>,
    pub tags: Vec<String>,
}

impl ProjectHeader {
    pub fn fromMapping(map: &Mapping) -> Self {
        let get = |key: &str| map.get(key).filter(|v| !v.is_null());

        let priority = get("priority").and_then(|v| {
            let parsed = scalarString(v).and_then(|s| ProjectPriority::fromStr(&s));
            if parsed.is_none() {
                warn!("[ProjectHeader] Ignoring unrecognized priority: {:?}", v);
            }
            parsed
        });

        let status = get("status").and_then(|v| {
            let parsed = scalarString(v).and_then(|s| ProjectStatus::fromStr(&s));
            if parsed.is_none() {
                warn!("[ProjectHeader] Ignoring unrecognized status: {:?}", v);
            }
            parsed
        });

        let workload = get("workload").and_then(|v| {
            let parsed = match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|w| w.is_finite() && *w >= 0.0);
            if parsed.is_none() {
                warn!("[ProjectHeader] Ignoring invalid workload: {:?}", v);
            }
            parsed
        });

        // Present-but-empty deadline clears it; absent leaves it untouched
        let deadline = if map.contains_key("deadline") {
            Some(get("deadline").and_then(scalarString).filter(|d| !d.trim().is_empty()))
        } else {
            None
        };

        let tags = match map.get("tags") {
            Some(Value::Sequence(items)) => items.iter().filter_map(scalarString).collect(),
            Some(Value::String(tag)) => vec![tag.clone()],
            _ => Vec::new(),
        };

        Self {
            id: get("id").and_then(scalarString),
            name: get("name").and_then(scalarString),
            link: get("link").or_else(|| get("main")).and_then(scalarString),
            deadline,
            priority,
            workload,
            status,
            tags,
        }
    }

    /// Only notes carrying the project tag take part in synchronization
    pub fn isTracked(&self) -> bool {
        self.tags.iter().any(|t| t.trim_start_matches('#') == PROJECT_TAG)
    }
}

fn scalarString(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
