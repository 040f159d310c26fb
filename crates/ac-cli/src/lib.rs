//! agent-coder: Command-line interface
//!
//! Runs a coding session in the local terminal, or drives sessions hosted
//! by the `agent-coderd` daemon.

pub mod commands;
pub mod ipc;
pub mod output;
