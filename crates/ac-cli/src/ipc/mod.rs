//! IPC client for communicating with the daemon
//!
//! Uses TCP on localhost, one JSON object per line.

mod client;

pub use client::DaemonClient;

pub use ac_core::ipc::DEFAULT_IPC_PORT;
