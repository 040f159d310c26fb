//! Interactive command grammar

/// One interpreted line of human input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// End the interactive loop
    Stop,
    /// Progress summary for the originating endpoint
    Status,
    /// High-priority course correction
    Steer(String),
    /// Hold a message until the next flush
    Queue(String),
    /// Send every queued message as one turn
    Flush,
    /// Explicit human feedback
    Feedback(String),
    /// Anything else, forwarded verbatim
    Chat(String),
}

impl Command {
    /// Classify trimmed input. Keywords are case-insensitive, arguments keep
    /// their case. Blank input yields None.
    ///
    /// A keyword that needs an argument but has none is treated as chat.
    pub fn parse(input: &str) -> Option<Command> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (keyword, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (trimmed, ""),
        };
        let keyword = keyword.to_ascii_lowercase();

        let command = match (keyword.as_str(), rest.is_empty()) {
            ("stop", true) => Command::Stop,
            ("status", true) => Command::Status,
            ("flush", true) => Command::Flush,
            ("steer", false) => Command::Steer(rest.to_string()),
            ("queue", false) => Command::Queue(rest.to_string()),
            ("feedback", false) => Command::Feedback(rest.to_string()),
            _ => Command::Chat(trimmed.to_string()),
        };
        Some(command)
    }
}
