//! Session management

mod manager;
mod multiplexer;

pub use manager::{MessageRecorder, RunEnvironment, SessionManager};
pub use multiplexer::Multiplexer;
