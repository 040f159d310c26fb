//! CLI command implementations

mod list;
mod run;
mod session;
mod watch;

pub use list::{messages_command, sessions_command};
pub use run::{run_command, RunOptions};
pub use session::{create_command, ping_command, send_command, show_command, start_command};
pub use watch::watch_command;
