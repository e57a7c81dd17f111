//! Codex backend
//!
//! Runs `codex mcp-server` and drives it as a JSON-RPC (MCP) client. Tool
//! approvals arrive as elicitation requests.

mod agent;
pub mod events;
pub mod transport;
pub mod version;

pub use agent::{CodexAgent, PROTOCOL_VERSION};
