//! Agent backends

mod process;

pub use process::{ProcessBackend, ProcessBackendFactory};
