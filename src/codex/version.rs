//! Codex CLI version probing
//!
//! Releases before 0.40.0 expose the MCP server as `codex mcp`; later ones
//! renamed it to `codex mcp-server`.

use std::path::Path;
use std::time::Duration;

use semver::Version;

pub const MCP_SERVER_SUBCOMMAND: &str = "mcp-server";
pub const LEGACY_MCP_SUBCOMMAND: &str = "mcp";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// First release with the `mcp-server` subcommand
fn renamed_in() -> Version {
    Version::new(0, 40, 0)
}

/// Find the version in `codex --version` output (`codex-cli 0.39.0`)
pub fn parse_version(output: &str) -> Option<Version> {
    output
        .split_whitespace()
        .map(|token| token.trim_start_matches('v'))
        .find_map(|token| Version::parse(token).ok())
}

/// Subcommand for a probed version. Unknown versions get the current name.
/// Pre-release tags are ignored, so `0.40.0-alpha.1` counts as 0.40.0.
pub fn subcommand_for(version: Option<&Version>) -> &'static str {
    match version {
        Some(v) if Version::new(v.major, v.minor, v.patch) < renamed_in() => LEGACY_MCP_SUBCOMMAND,
        _ => MCP_SERVER_SUBCOMMAND,
    }
}

/// Run `<program> --version` and parse the result
pub async fn probe_version(program: &str, cwd: &Path) -> Option<Version> {
    let output = tokio::process::Command::new(program)
        .arg("--version")
        .current_dir(cwd)
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = parse_version(&String::from_utf8_lossy(&output.stdout));
            tracing::debug!(program, ?version, "Probed Codex version");
            version
        }
        Ok(Ok(output)) => {
            tracing::debug!(program, status = %output.status, "Version probe failed");
            None
        }
        Ok(Err(e)) => {
            tracing::debug!(program, error = %e, "Version probe could not run");
            None
        }
        Err(_) => {
            tracing::debug!(program, "Version probe timed out");
            None
        }
    }
}

/// Subcommand to launch: the configured override, else by probed version
pub async fn resolve_subcommand(program: &str, cwd: &Path, configured: Option<&str>) -> String {
    if let Some(subcommand) = configured.filter(|s| !s.trim().is_empty()) {
        return subcommand.to_string();
    }
    let version = probe_version(program, cwd).await;
    subcommand_for(version.as_ref()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_output() {
        assert_eq!(parse_version("codex-cli 0.39.0\n"), Some(Version::new(0, 39, 0)));
        assert_eq!(parse_version("v0.41.2"), Some(Version::new(0, 41, 2)));
        assert_eq!(
            parse_version("codex-cli 0.40.0-alpha.3").map(|v| v.pre.to_string()),
            Some("alpha.3".to_string())
        );
        assert_eq!(parse_version("codex (dev build)"), None);
    }

    #[test]
    fn test_subcommand_threshold() {
        assert_eq!(subcommand_for(Some(&Version::new(0, 39, 9))), "mcp");
        assert_eq!(subcommand_for(Some(&Version::new(0, 40, 0))), "mcp-server");
        assert_eq!(subcommand_for(Some(&Version::new(1, 0, 0))), "mcp-server");
        assert_eq!(
            subcommand_for(parse_version("0.40.0-alpha.1").as_ref()),
            "mcp-server"
        );
        assert_eq!(subcommand_for(None), "mcp-server");
    }

    #[tokio::test]
    async fn test_configured_subcommand_skips_probe() {
        let cwd = std::env::temp_dir();
        assert_eq!(
            resolve_subcommand("definitely-not-a-codex-binary", &cwd, Some("mcp")).await,
            "mcp"
        );
        assert_eq!(
            resolve_subcommand("definitely-not-a-codex-binary", &cwd, None).await,
            "mcp-server"
        );
    }
}
