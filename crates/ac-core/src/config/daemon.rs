//! Top-level agent-coder configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{BackendCommand, BackendsConfig, EndpointsConfig};
use crate::error::ConfigError;
use crate::ipc::DEFAULT_IPC_PORT;
use crate::types::BackendKind;

/// Configuration shared by the daemon and the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCoderConfig {
    /// SQLite database holding sessions and messages
    pub database_path: PathBuf,

    /// IPC port for CLI communication (localhost only)
    pub ipc_port: u16,

    /// Backend used when a session does not name one
    pub default_backend: BackendKind,

    /// Agent CLI commands per backend
    pub backends: BackendsConfig,

    /// Credentials for the remote endpoints
    pub endpoints: EndpointsConfig,
}

impl Default for AgentCoderConfig {
    fn default() -> Self {
        Self {
            database_path: super::default_config_dir().join("agentcoder.db"),
            ipc_port: DEFAULT_IPC_PORT,
            default_backend: BackendKind::default(),
            backends: BackendsConfig::default(),
            endpoints: EndpointsConfig::default(),
        }
    }
}

impl AgentCoderConfig {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match super::load_config(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Get the IPC address (localhost:port)
    pub fn ipc_address(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }

    /// Command configured for a backend variant
    pub fn backend(&self, kind: BackendKind) -> &BackendCommand {
        self.backends.get(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentCoderConfig::default();
        assert_eq!(config.ipc_port, DEFAULT_IPC_PORT);
        assert_eq!(config.ipc_address(), format!("127.0.0.1:{}", DEFAULT_IPC_PORT));
        assert!(config.database_path.ends_with("agentcoder.db"));
        assert_eq!(config.default_backend, BackendKind::Copilot);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AgentCoderConfig = toml::from_str(
            r#"
            default_backend = "claude"

            [backends.claude]
            program = "/opt/bin/claude"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_backend, BackendKind::Claude);
        assert_eq!(config.backend(BackendKind::Claude).program, "/opt/bin/claude");
        assert_eq!(config.ipc_port, DEFAULT_IPC_PORT);
        assert_eq!(config.backend(BackendKind::Codex).program, "codex");
    }
}
