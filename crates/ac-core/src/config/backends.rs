//! Agent backend command configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::BackendKind;

/// Placeholder replaced with the per-run identifier
pub const RUN_ID_PLACEHOLDER: &str = "{run_id}";
/// Placeholder replaced with the workspace path
pub const WORKSPACE_PLACEHOLDER: &str = "{workspace}";
/// Placeholder replaced with the prompt text
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Commands for every backend variant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub copilot: BackendCommand,
    pub claude: BackendCommand,
    pub codex: BackendCommand,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            copilot: BackendCommand {
                program: "copilot".into(),
                args: strings(&["-p", PROMPT_PLACEHOLDER]),
                resume_args: strings(&["--continue", "-p", PROMPT_PLACEHOLDER]),
                auto_approve_args: strings(&["--allow-all-tools"]),
                turn_timeout: DEFAULT_TURN_TIMEOUT,
            },
            claude: BackendCommand {
                program: "claude".into(),
                args: strings(&["-p", PROMPT_PLACEHOLDER, "--session-id", RUN_ID_PLACEHOLDER]),
                resume_args: strings(&["-p", PROMPT_PLACEHOLDER, "--resume", RUN_ID_PLACEHOLDER]),
                auto_approve_args: strings(&["--dangerously-skip-permissions"]),
                turn_timeout: DEFAULT_TURN_TIMEOUT,
            },
            codex: BackendCommand {
                program: "codex".into(),
                args: strings(&["exec", PROMPT_PLACEHOLDER]),
                resume_args: strings(&["exec", "resume", "--last", PROMPT_PLACEHOLDER]),
                auto_approve_args: strings(&["--full-auto"]),
                turn_timeout: DEFAULT_TURN_TIMEOUT,
            },
        }
    }
}

impl BackendsConfig {
    pub fn get(&self, kind: BackendKind) -> &BackendCommand {
        match kind {
            BackendKind::Copilot => &self.copilot,
            BackendKind::Claude => &self.claude,
            BackendKind::Codex => &self.codex,
        }
    }
}

const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How to invoke one agent CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendCommand {
    /// Executable name or path
    pub program: String,

    /// Arguments for the first turn of a run
    pub args: Vec<String>,

    /// Arguments for every later turn of the same run
    pub resume_args: Vec<String>,

    /// Extra arguments appended when the session auto-approves
    pub auto_approve_args: Vec<String>,

    /// Maximum time a single turn may take
    #[serde(with = "super::serde_utils::duration_secs")]
    pub turn_timeout: Duration,
}

impl Default for BackendCommand {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            resume_args: Vec::new(),
            auto_approve_args: Vec::new(),
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }
}

impl BackendCommand {
    /// Expand the argument template for one turn.
    ///
    /// Returns the arguments and whether the prompt must go to stdin
    /// because no argument carries it.
    pub fn render_args(
        &self,
        resume: bool,
        auto_approve: bool,
        run_id: &str,
        workspace: &str,
        prompt: &str,
    ) -> (Vec<String>, bool) {
        let template = if resume && !self.resume_args.is_empty() {
            &self.resume_args
        } else {
            &self.args
        };

        let prompt_in_args = template.iter().any(|a| a.contains(PROMPT_PLACEHOLDER));
        let mut rendered: Vec<String> = template
            .iter()
            .map(|arg| {
                arg.replace(RUN_ID_PLACEHOLDER, run_id)
                    .replace(WORKSPACE_PLACEHOLDER, workspace)
                    .replace(PROMPT_PLACEHOLDER, prompt)
            })
            .collect();
        if auto_approve {
            rendered.extend(self.auto_approve_args.iter().cloned());
        }
        (rendered, !prompt_in_args)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_first_turn() {
        let config = BackendsConfig::default();
        let (args, stdin) = config.claude.render_args(false, false, "run-1", "/w", "hello");
        assert_eq!(args, vec!["-p", "hello", "--session-id", "run-1"]);
        assert!(!stdin);
    }

    #[test]
    fn test_render_resume_with_auto_approve() {
        let config = BackendsConfig::default();
        let (args, _) = config.claude.render_args(true, true, "run-1", "/w", "next");
        assert_eq!(
            args,
            vec!["-p", "next", "--resume", "run-1", "--dangerously-skip-permissions"]
        );
    }

    #[test]
    fn test_prompt_goes_to_stdin_without_placeholder() {
        let command = BackendCommand {
            program: "cat".into(),
            args: vec!["--cwd".into(), "{workspace}".into()],
            ..Default::default()
        };
        let (args, stdin) = command.render_args(true, false, "r", "/repo", "p");
        assert_eq!(args, vec!["--cwd", "/repo"]);
        assert!(stdin);
    }
}
