//! Remote endpoint credentials
//!
//! Every credential can be given in the config file or through the
//! environment. The environment wins, so secrets never need to be written
//! to disk.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::EndpointKind;

/// Credentials for every remote endpoint kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub telegram: TelegramConfig,
    pub teams: TeamsConfig,
    pub jira: JiraConfig,
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamsConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraConfig {
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub issue_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub pr_url: Option<String>,
}

/// Resolved Telegram credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

/// Resolved Jira credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraCredentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub issue_key: String,
}

/// Resolved GitHub credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubCredentials {
    pub token: String,
    pub pr_url: String,
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Pick the environment value, then the file value, rejecting blanks
fn pick(
    env: &dyn Fn(&str) -> Option<String>,
    variable: &'static str,
    file_value: &Option<String>,
    endpoint: EndpointKind,
) -> Result<String, ConfigError> {
    env(variable)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| file_value.clone().filter(|v| !v.trim().is_empty()))
        .ok_or(ConfigError::MissingCredential { endpoint, variable })
}

impl TelegramConfig {
    pub fn resolve(&self) -> Result<TelegramCredentials, ConfigError> {
        self.resolve_with(&process_env)
    }

    pub fn resolve_with(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<TelegramCredentials, ConfigError> {
        let kind = EndpointKind::Telegram;
        Ok(TelegramCredentials {
            bot_token: pick(env, "TELEGRAM_BOT_TOKEN", &self.bot_token, kind)?,
            chat_id: pick(env, "TELEGRAM_CHAT_ID", &self.chat_id, kind)?,
        })
    }
}

impl TeamsConfig {
    pub fn resolve(&self) -> Result<String, ConfigError> {
        self.resolve_with(&process_env)
    }

    pub fn resolve_with(&self, env: &dyn Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
        pick(env, "TEAMS_WEBHOOK_URL", &self.webhook_url, EndpointKind::Teams)
    }
}

impl JiraConfig {
    pub fn resolve(&self) -> Result<JiraCredentials, ConfigError> {
        self.resolve_with(&process_env)
    }

    pub fn resolve_with(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<JiraCredentials, ConfigError> {
        let kind = EndpointKind::Jira;
        Ok(JiraCredentials {
            base_url: pick(env, "JIRA_BASE_URL", &self.base_url, kind)?,
            email: pick(env, "JIRA_EMAIL", &self.email, kind)?,
            api_token: pick(env, "JIRA_API_TOKEN", &self.api_token, kind)?,
            issue_key: pick(env, "JIRA_ISSUE_KEY", &self.issue_key, kind)?,
        })
    }
}

impl GitHubConfig {
    pub fn resolve(&self) -> Result<GitHubCredentials, ConfigError> {
        self.resolve_with(&process_env)
    }

    pub fn resolve_with(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<GitHubCredentials, ConfigError> {
        let kind = EndpointKind::GitHubPr;
        Ok(GitHubCredentials {
            token: pick(env, "GITHUB_TOKEN", &self.token, kind)?,
            pr_url: pick(env, "GITHUB_PR_URL", &self.pr_url, kind)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_environment_wins_over_file() {
        let config = TeamsConfig {
            webhook_url: Some("https://file.test".into()),
        };
        let env = env_of(&[("TEAMS_WEBHOOK_URL", "https://env.test")]);
        assert_eq!(config.resolve_with(&env).unwrap(), "https://env.test");
    }

    #[test]
    fn test_file_value_used_without_environment() {
        let config = GitHubConfig {
            token: Some("ghp_file".into()),
            pr_url: Some("https://github.com/o/r/pull/3".into()),
        };
        let creds = config.resolve_with(&env_of(&[])).unwrap();
        assert_eq!(creds.token, "ghp_file");
    }

    #[test]
    fn test_missing_credential_names_variable() {
        let config = JiraConfig {
            base_url: Some("https://jira.test".into()),
            email: Some("dev@example.com".into()),
            api_token: None,
            issue_key: Some("AC-1".into()),
        };
        let err = config.resolve_with(&env_of(&[])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential {
                endpoint: EndpointKind::Jira,
                variable: "JIRA_API_TOKEN"
            }
        ));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let config = TelegramConfig {
            bot_token: Some("   ".into()),
            chat_id: Some("42".into()),
        };
        assert!(config.resolve_with(&env_of(&[])).is_err());
    }
}
