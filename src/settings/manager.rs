//! Settings manager implementation
//!
//! Handles loading and merging settings files from the user and project
//! directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Settings directory name, under the home directory and the project root
const SETTINGS_DIR: &str = ".agent-supervisor";
const SETTINGS_FILE: &str = "settings.json";
const LOCAL_SETTINGS_FILE: &str = "settings.local.json";

/// Approval policy overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySettings {
    /// Extra auto-approved action patterns; appended to the built-in list
    #[serde(default)]
    pub safe_actions: Option<Vec<String>>,

    /// Auto-approve file edits
    #[serde(default)]
    pub auto_approve_edits: Option<bool>,
}

/// Supervisor settings file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Path to the Claude Code executable
    #[serde(default)]
    pub claude_path: Option<String>,

    /// Path to the Codex executable
    #[serde(default)]
    pub codex_path: Option<String>,

    /// Codex server subcommand (`mcp-server` or `mcp`); skips the version probe
    #[serde(default)]
    pub codex_subcommand: Option<String>,

    #[serde(default)]
    pub permission_mode: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Extra arguments passed to the agent executable
    #[serde(default)]
    pub extra_args: Option<Vec<String>>,

    /// Consecutive failed tool outcomes before interrupting
    #[serde(default)]
    pub loop_threshold: Option<u32>,

    #[serde(default)]
    pub policy: Option<PolicySettings>,

    /// Environment for the agent subprocess
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,

    /// Unknown keys are kept so newer files still load
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another settings into this one
    ///
    /// Scalars from `other` take precedence; lists and maps are combined.
    pub fn merge(&mut self, other: Settings) {
        if other.claude_path.is_some() {
            self.claude_path = other.claude_path;
        }
        if other.codex_path.is_some() {
            self.codex_path = other.codex_path;
        }
        if other.codex_subcommand.is_some() {
            self.codex_subcommand = other.codex_subcommand;
        }
        if other.permission_mode.is_some() {
            self.permission_mode = other.permission_mode;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if let Some(other_args) = other.extra_args {
            self.extra_args
                .get_or_insert_with(Vec::new)
                .extend(other_args);
        }
        if other.loop_threshold.is_some() {
            self.loop_threshold = other.loop_threshold;
        }
        if let Some(other_policy) = other.policy {
            let policy = self.policy.get_or_insert_with(PolicySettings::default);
            if let Some(safe) = other_policy.safe_actions {
                policy.safe_actions.get_or_insert_with(Vec::new).extend(safe);
            }
            if other_policy.auto_approve_edits.is_some() {
                policy.auto_approve_edits = other_policy.auto_approve_edits;
            }
        }
        if let Some(other_env) = other.env {
            self.env.get_or_insert_with(HashMap::new).extend(other_env);
        }
        self.extra.extend(other.extra);
    }
}

/// Settings manager for loading and accessing settings
#[derive(Debug)]
pub struct SettingsManager {
    settings: Settings,
    project_dir: PathBuf,
}

impl SettingsManager {
    /// Load user, project and local settings for `project_dir`
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.as_ref().to_path_buf();
        let user_dir = dirs::home_dir().map(|home| home.join(SETTINGS_DIR));
        let settings = Self::load_all_settings(user_dir.as_deref(), &project_dir);
        Self {
            settings,
            project_dir,
        }
    }

    /// Same as [`new`](Self::new) but with an explicit user settings
    /// directory (`None` skips user settings)
    pub fn with_user_dir(project_dir: impl AsRef<Path>, user_dir: Option<&Path>) -> Self {
        let project_dir = project_dir.as_ref().to_path_buf();
        let settings = Self::load_all_settings(user_dir, &project_dir);
        Self {
            settings,
            project_dir,
        }
    }

    /// Priority: Local > Project > User
    fn load_all_settings(user_dir: Option<&Path>, project_dir: &Path) -> Settings {
        let mut settings = Settings::new();
        let project_settings_dir = project_dir.join(SETTINGS_DIR);

        let sources = [
            user_dir.map(|dir| dir.join(SETTINGS_FILE)),
            Some(project_settings_dir.join(SETTINGS_FILE)),
            Some(project_settings_dir.join(LOCAL_SETTINGS_FILE)),
        ];
        for path in sources.iter().flatten() {
            if let Some(loaded) = Self::load_settings_file(path) {
                tracing::debug!(path = %path.display(), "Loaded settings");
                settings.merge(loaded);
            }
        }

        settings
    }

    fn load_settings_file(path: &Path) -> Option<Settings> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::warn!("Failed to parse settings file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read settings file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn model(&self) -> Option<&str> {
        self.settings.model.as_deref()
    }

    pub fn permission_mode(&self) -> Option<&str> {
        self.settings.permission_mode.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_settings(dir: &Path, name: &str, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        writeln!(file, "{body}").unwrap();
    }

    #[test]
    fn test_settings_merge() {
        let mut base = Settings::new();
        base.model = Some("opus".to_string());
        base.extra_args = Some(vec!["--a".to_string()]);

        let mut other = Settings::new();
        other.model = Some("sonnet".to_string());
        other.permission_mode = Some("acceptEdits".to_string());
        other.extra_args = Some(vec!["--b".to_string()]);

        base.merge(other);

        assert_eq!(base.model.as_deref(), Some("sonnet"));
        assert_eq!(base.permission_mode.as_deref(), Some("acceptEdits"));
        assert_eq!(
            base.extra_args,
            Some(vec!["--a".to_string(), "--b".to_string()])
        );
    }

    #[test]
    fn test_local_overrides_project_overrides_user() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let project_dir = project.path().join(SETTINGS_DIR);

        write_settings(
            user.path(),
            SETTINGS_FILE,
            r#"{"model": "user-model", "claudePath": "/opt/claude", "policy": {"safeActions": ["mcp__fs__*"]}}"#,
        );
        write_settings(
            &project_dir,
            SETTINGS_FILE,
            r#"{"model": "project-model", "loopThreshold": 5, "policy": {"autoApproveEdits": true}}"#,
        );
        write_settings(
            &project_dir,
            LOCAL_SETTINGS_FILE,
            r#"{"model": "local-model", "env": {"FOO": "1"}}"#,
        );

        let manager = SettingsManager::with_user_dir(project.path(), Some(user.path()));
        let settings = manager.settings();

        assert_eq!(manager.model(), Some("local-model"));
        assert_eq!(settings.claude_path.as_deref(), Some("/opt/claude"));
        assert_eq!(settings.loop_threshold, Some(5));
        assert_eq!(
            settings.policy,
            Some(PolicySettings {
                safe_actions: Some(vec!["mcp__fs__*".to_string()]),
                auto_approve_edits: Some(true),
            })
        );
        assert_eq!(
            settings.env.as_ref().and_then(|e| e.get("FOO")).map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_invalid_file_is_skipped() {
        let project = TempDir::new().unwrap();
        let project_dir = project.path().join(SETTINGS_DIR);
        write_settings(&project_dir, SETTINGS_FILE, "{ not json");
        write_settings(&project_dir, LOCAL_SETTINGS_FILE, r#"{"permissionMode": "plan"}"#);

        let manager = SettingsManager::with_user_dir(project.path(), None);
        assert_eq!(manager.permission_mode(), Some("plan"));
        assert_eq!(manager.model(), None);
    }

    #[test]
    fn test_unknown_keys_are_kept() {
        let settings: Settings =
            serde_json::from_str(r#"{"codexSubcommand": "mcp", "theme": "dark"}"#).unwrap();
        assert_eq!(settings.codex_subcommand.as_deref(), Some("mcp"));
        assert!(settings.extra.contains_key("theme"));
    }
}
