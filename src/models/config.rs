// Configuration models for Deadline
// Global config and per-vault config overrides

use serde::{Deserialize, Serialize};

/// All settings (stored in global config.md, can be overridden by the vault)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub projectPath: String, // Vault folder holding top-level projects
    pub dirPrefix: String,   // "{{id}}" is replaced by the project id
    pub workingHoursPerWeek: u32,
    pub workingDaysPerWeek: u32,
    pub priorityLevels: u32,
    pub prioritySplit: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currentVault: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            projectPath: "Projects".to_string(),
            dirPrefix: "{{id}}".to_string(),
            workingHoursPerWeek: 40,
            workingDaysPerWeek: 5,
            priorityLevels: 3,
            prioritySplit: vec![50, 35, 15],
            currentVault: None,
        }
    }
}

/// Partial settings for vault overrides (all fields optional)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projectPath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirPrefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workingHoursPerWeek: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workingDaysPerWeek: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priorityLevels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritySplit: Option<Vec<u32>>,
}

impl Settings {
    /// Merge with vault override
    pub fn withOverride(&self, over: &SettingsOverride) -> Self {
        Self {
            projectPath: over.projectPath.clone().unwrap_or_else(|| self.projectPath.clone()),
            dirPrefix: over.dirPrefix.clone().unwrap_or_else(|| self.dirPrefix.clone()),
            workingHoursPerWeek: over.workingHoursPerWeek.unwrap_or(self.workingHoursPerWeek),
            workingDaysPerWeek: over.workingDaysPerWeek.unwrap_or(self.workingDaysPerWeek),
            priorityLevels: over.priorityLevels.unwrap_or(self.priorityLevels),
            prioritySplit: over.prioritySplit.clone().unwrap_or_else(|| self.prioritySplit.clone()),
            currentVault: self.currentVault.clone(),
        }
        .normalized()
    }

    /// Project path is vault-relative; a leading "./" or trailing "/" is dropped
    pub fn normalized(mut self) -> Self {
        while let Some(rest) = self.projectPath.strip_prefix("./") {
            self.projectPath = rest.to_string();
        }
        self.projectPath = self.projectPath.trim_end_matches('/').to_string();
        self
    }

    /// Folder name for a project: "<prefix>-<name>", or just the name without a prefix
    pub fn projectDirName(&self, id: &str, name: &str) -> String {
        let prefix = self.dirPrefix.replace("{{id}}", id);
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}-{}", prefix, name)
        }
    }
}
