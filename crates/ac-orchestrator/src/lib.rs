//! ac-orchestrator: Multiplexing and session orchestration for agent-coder
//!
//! The daemon attaches any number of human-facing endpoints to a session,
//! merges their input into one ordered stream, drives a single agent run
//! through a small command language and persists every exchanged message
//! exactly once. It also serves the IPC interface for the CLI.

pub mod backend;
pub mod endpoint;
pub mod ipc;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod store;
pub mod summarizer;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;

pub use orchestrator::{LoopExit, Orchestrator, OrchestratorState};
pub use session::{Multiplexer, RunEnvironment, SessionManager};
pub use state::DaemonState;
