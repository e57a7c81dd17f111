//! Claude Code backend
//!
//! Drives the `claude` CLI in stream-json mode and answers its
//! `can_use_tool` permission prompts on stdio.

mod agent;
pub mod frames;

pub use agent::ClaudeAgent;
