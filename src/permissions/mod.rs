//! Approval policy
//!
//! Decides which actions an agent may run without asking.

pub mod danger;
pub mod policy;

pub use policy::{ApprovalPolicy, ConfirmReason, PolicyConfig, PolicyVerdict, command_text};
