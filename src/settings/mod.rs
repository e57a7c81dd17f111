//! Settings management
//!
//! Loads and merges settings from multiple sources:
//! - User settings: `~/.agent-supervisor/settings.json`
//! - Project settings: `.agent-supervisor/settings.json`
//! - Local settings: `.agent-supervisor/settings.local.json`
//!
//! Priority: Local > Project > User

mod manager;

pub use manager::{PolicySettings, Settings, SettingsManager};
