// Common helpers for commands

use chrono::{DateTime, Local};

/// Local wall-clock timestamp for work-log entries (YYYYMMDD HH:MM)
pub fn localTimestamp() -> String {
    formatTimestamp(&Local::now())
}

pub fn formatTimestamp(at: &DateTime<Local>) -> String {
    at.format("%Y%m%d %H:%M").to_string()
}

/// Id for the next child: "<n>" at the top level, "<parentId>-<n>" below a parent
pub fn newProjectId(parentId: Option<&str>, siblingCount: usize) -> String {
    let index = siblingCount + 1;
    match parentId {
        Some(parent) if !parent.is_empty() => format!("{}-{}", parent, index),
        _ => index.to_string(),
    }
}
