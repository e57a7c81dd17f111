//! Command-line interface definitions
//!
//! Provides CLI argument parsing using clap for the agent supervisor.

use std::path::PathBuf;

use clap::Parser;

use crate::session::PermissionMode;
use crate::types::{BackendKind, SupervisorConfig};

/// Agent supervisor - run Claude Code or Codex with mediated tool approvals
#[derive(Parser, Debug, Clone)]
#[command(name = "agent-supervisor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Agent backend to run
    #[arg(short, long, value_enum, default_value_t = BackendKind::Claude)]
    pub backend: BackendKind,

    /// Working directory for the agent (defaults to the current directory)
    #[arg(short = 'C', long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Permission mode (default, read-only, safe-yolo, yolo, bypassPermissions, acceptEdits, plan)
    #[arg(short = 'm', long, value_name = "MODE")]
    pub permission_mode: Option<PermissionMode>,

    /// Model to request from the backend
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Continue the most recent conversation
    #[arg(short = 'c', long = "continue", conflicts_with = "resume")]
    pub continue_last: bool,

    /// Resume a conversation by id
    #[arg(short, long, value_name = "ID")]
    pub resume: Option<String>,

    /// List resumable conversations for the working directory and exit
    #[arg(long)]
    pub history: bool,

    /// Number of conversations `--history` lists
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub history_limit: usize,

    /// Enable diagnostic mode (auto-log to temp file)
    #[arg(short, long)]
    pub diagnostic: bool,

    /// Log directory (implies diagnostic mode)
    #[arg(short = 'l', long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log file name (implies diagnostic mode)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub log_file: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long)]
    pub quiet: bool,

    /// OpenTelemetry OTLP endpoint (e.g., http://localhost:4317)
    /// When otel feature is enabled, this configures the OTLP exporter.
    /// When otel feature is disabled, this argument is accepted but ignored.
    #[arg(long, value_name = "URL", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// OpenTelemetry service name
    #[arg(long, value_name = "NAME", default_value = "agent-supervisor")]
    pub otel_service_name: String,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            backend: BackendKind::Claude,
            cwd: None,
            permission_mode: None,
            model: None,
            continue_last: false,
            resume: None,
            history: false,
            history_limit: 10,
            diagnostic: false,
            log_dir: None,
            log_file: None,
            verbose: 0,
            quiet: false,
            otel_endpoint: None,
            otel_service_name: "agent-supervisor".to_string(),
        }
    }
}

impl Cli {
    /// Check if diagnostic mode is enabled (output to file)
    ///
    /// Returns true if `--diagnostic` is set, or if `--log-dir` or `--log-file` is specified.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    /// Check if OpenTelemetry tracing is enabled
    #[cfg(feature = "otel")]
    pub fn is_otel_enabled(&self) -> bool {
        self.otel_endpoint.is_some()
    }

    /// Always false without the otel feature
    #[cfg(not(feature = "otel"))]
    pub fn is_otel_enabled(&self) -> bool {
        if self.otel_endpoint.is_some() {
            tracing::warn!("--otel-endpoint specified but otel feature is not enabled, ignoring");
        }
        false
    }

    /// Get the log level based on CLI arguments
    ///
    /// - `--quiet`: ERROR
    /// - default: INFO
    /// - `-v`: DEBUG
    /// - `-vv` or more: TRACE
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::INFO,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Get the log file path for diagnostic mode
    ///
    /// Defaults to `agent-supervisor-{timestamp}.log` in the system temp directory.
    pub fn log_path(&self) -> PathBuf {
        let dir = self.log_dir.clone().unwrap_or_else(std::env::temp_dir);

        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("agent-supervisor-{timestamp}.log")
        });

        dir.join(filename)
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_to(&self, config: &mut SupervisorConfig) {
        if let Some(mode) = self.permission_mode {
            config.permission_mode = mode;
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cli() {
        let cli = Cli::default();
        assert!(!cli.is_diagnostic());
        assert_eq!(cli.log_level(), tracing::Level::INFO);
        assert_eq!(cli.backend, BackendKind::Claude);
    }

    #[test]
    fn test_log_dir_implies_diagnostic() {
        let cli = Cli {
            log_dir: Some(PathBuf::from("/tmp")),
            ..Default::default()
        };
        assert!(cli.is_diagnostic());
    }

    #[test]
    fn test_log_levels() {
        let cli = Cli {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::ERROR);

        let cli = Cli {
            verbose: 2,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_log_path_default_generates_timestamp() {
        let path = Cli::default().log_path();
        assert!(path.starts_with(std::env::temp_dir()));
        let filename = path.file_name().unwrap().to_str().unwrap();
        assert!(filename.starts_with("agent-supervisor-"));
        assert!(filename.ends_with(".log"));
    }

    #[test]
    fn test_parse_session_flags() {
        let cli = Cli::try_parse_from([
            "agent-supervisor",
            "--backend",
            "codex",
            "-m",
            "read-only",
            "--model",
            "gpt-5",
            "--resume",
            "conv-1",
        ])
        .unwrap();
        assert_eq!(cli.backend, BackendKind::Codex);
        assert_eq!(cli.permission_mode, Some(PermissionMode::ReadOnly));
        assert_eq!(cli.resume.as_deref(), Some("conv-1"));

        let mut config = SupervisorConfig::new("/work");
        cli.apply_to(&mut config);
        assert_eq!(config.permission_mode, PermissionMode::ReadOnly);
        assert_eq!(config.model.as_deref(), Some("gpt-5"));
    }

    #[test]
    fn test_continue_conflicts_with_resume() {
        assert!(Cli::try_parse_from(["agent-supervisor", "--continue", "--resume", "x"]).is_err());
        assert!(Cli::try_parse_from(["agent-supervisor", "-m", "turbo"]).is_err());
    }
}
