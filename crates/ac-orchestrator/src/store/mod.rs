//! Session storage
//!
//! [`MemoryStore`] keeps everything in process and backs the tests and local
//! runs; [`SqliteStore`] is what the daemon uses.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
