//! Supervisor configuration
//!
//! Resolved from three sources, highest priority first:
//!
//! 1. Environment variables (`AGENT_*`)
//! 2. Settings files (see [`crate::settings`])
//! 3. Defaults

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::permissions::{ApprovalPolicy, PolicyConfig};
use crate::session::{DEFAULT_LOOP_THRESHOLD, PermissionMode};
use crate::settings::{Settings, SettingsManager};
use crate::types::{AgentError, Result};

pub const ENV_CLAUDE_PATH: &str = "AGENT_CLAUDE_PATH";
pub const ENV_CODEX_PATH: &str = "AGENT_CODEX_PATH";
pub const ENV_PERMISSION_MODE: &str = "AGENT_PERMISSION_MODE";
pub const ENV_MODEL: &str = "AGENT_MODEL";
pub const ENV_LOOP_THRESHOLD: &str = "AGENT_LOOP_THRESHOLD";
pub const ENV_AUTO_APPROVE_EDITS: &str = "AGENT_AUTO_APPROVE_EDITS";

const DEFAULT_CLAUDE_PATH: &str = "claude";
const DEFAULT_CODEX_PATH: &str = "codex";

/// Everything needed to start an agent session
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Working directory of the agent subprocess
    pub cwd: PathBuf,

    /// Claude Code executable
    /// Environment variable: `AGENT_CLAUDE_PATH`
    pub claude_path: String,

    /// Codex executable
    /// Environment variable: `AGENT_CODEX_PATH`
    pub codex_path: String,

    /// Codex server subcommand; `None` probes `codex --version`
    pub codex_subcommand: Option<String>,

    /// Environment variable: `AGENT_PERMISSION_MODE`
    pub permission_mode: PermissionMode,

    /// Environment variable: `AGENT_MODEL`
    pub model: Option<String>,

    pub extra_args: Vec<String>,

    /// Environment variable: `AGENT_LOOP_THRESHOLD`
    pub loop_threshold: u32,

    /// `autoApproveEdits` can be overridden with `AGENT_AUTO_APPROVE_EDITS`
    pub policy: PolicyConfig,

    /// Extra environment for the subprocess; the supervisor's own
    /// environment is inherited
    pub env: HashMap<String, String>,
}

impl SupervisorConfig {
    /// Defaults only
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            claude_path: DEFAULT_CLAUDE_PATH.to_string(),
            codex_path: DEFAULT_CODEX_PATH.to_string(),
            codex_subcommand: None,
            permission_mode: PermissionMode::default(),
            model: None,
            extra_args: Vec::new(),
            loop_threshold: DEFAULT_LOOP_THRESHOLD,
            policy: PolicyConfig::default(),
            env: HashMap::new(),
        }
    }

    /// Load settings files for `cwd`, then apply the process environment
    pub fn load(cwd: impl AsRef<Path>) -> Result<Self> {
        let cwd = cwd.as_ref();
        let settings = SettingsManager::new(cwd).into_settings();
        Self::from_sources(cwd, &settings, |key| std::env::var(key).ok())
    }

    /// Resolve from explicit sources. `env` looks up one variable.
    pub fn from_sources(
        cwd: impl Into<PathBuf>,
        settings: &Settings,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::new(cwd);
        config.apply_settings(settings)?;
        config.apply_env(env)?;
        Ok(config)
    }

    fn apply_settings(&mut self, settings: &Settings) -> Result<()> {
        if let Some(path) = &settings.claude_path {
            self.claude_path.clone_from(path);
        }
        if let Some(path) = &settings.codex_path {
            self.codex_path.clone_from(path);
        }
        if let Some(sub) = &settings.codex_subcommand {
            self.codex_subcommand = Some(sub.clone());
        }
        if let Some(mode) = &settings.permission_mode {
            self.permission_mode = mode.parse()?;
        }
        if let Some(model) = &settings.model {
            self.model = Some(model.clone());
        }
        if let Some(args) = &settings.extra_args {
            self.extra_args.clone_from(args);
        }
        if let Some(threshold) = settings.loop_threshold {
            self.loop_threshold = threshold;
        }
        if let Some(policy) = &settings.policy {
            if let Some(safe) = &policy.safe_actions {
                self.policy.safe_actions.extend(safe.iter().cloned());
            }
            if let Some(edits) = policy.auto_approve_edits {
                self.policy.auto_approve_edits = edits;
            }
        }
        if let Some(env) = &settings.env {
            self.env
                .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(())
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty(ENV_CLAUDE_PATH) {
            self.claude_path = path;
        }
        if let Some(path) = non_empty(ENV_CODEX_PATH) {
            self.codex_path = path;
        }
        if let Some(mode) = non_empty(ENV_PERMISSION_MODE) {
            self.permission_mode = mode.parse()?;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.model = Some(model);
        }
        if let Some(threshold) = non_empty(ENV_LOOP_THRESHOLD) {
            self.loop_threshold = threshold.trim().parse().map_err(|_| {
                AgentError::config_error(format!("{ENV_LOOP_THRESHOLD} must be a number, got {threshold:?}"))
            })?;
        }
        if let Some(flag) = non_empty(ENV_AUTO_APPROVE_EDITS) {
            self.policy.auto_approve_edits = parse_bool(&flag).ok_or_else(|| {
                AgentError::config_error(format!("{ENV_AUTO_APPROVE_EDITS} must be true or false, got {flag:?}"))
            })?;
        }
        Ok(())
    }

    /// Compile the policy table
    pub fn approval_policy(&self) -> Result<ApprovalPolicy> {
        ApprovalPolicy::new(self.policy.clone())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
