//! IPC server for CLI communication
//!
//! Newline-delimited JSON over TCP on 127.0.0.1.

mod server;

pub use server::IpcServer;
