//! Workspace helpers: devcontainer provisioning, git worktrees and pull
//! requests

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use ac_core::error::AcError;
use ac_core::traits::{ArtifactPublisher, ArtifactRequest, Provisioner};

/// `devcontainer up` may build an image on first use
const DEVCONTAINER_UP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Result of a finished external command
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Run `program args` in `dir` and collect its output.
///
/// A program that cannot be launched is reported as an unsuccessful run.
async fn run(program: &str, args: &[&str], dir: &Path, timeout: Option<Duration>) -> CommandOutput {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, output).await {
            Ok(result) => result,
            Err(_) => {
                return CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("{} timed out after {}s", program, limit.as_secs()),
                }
            }
        },
        None => output.await,
    };

    match result {
        Ok(output) => CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        },
        Err(e) => CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: format!("failed to run {}: {}", program, e),
        },
    }
}

/// Provisions the devcontainer declared by a workspace
#[derive(Debug, Default, Clone)]
pub struct DevContainerProvisioner;

impl DevContainerProvisioner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provisioner for DevContainerProvisioner {
    fn has_config(&self, workspace: &Path) -> bool {
        workspace.join(".devcontainer").join("devcontainer.json").exists()
            || workspace.join(".devcontainer.json").exists()
    }

    async fn provision(&self, workspace: &Path) -> Result<(), AcError> {
        let folder = workspace.to_string_lossy();
        tracing::info!("Starting devcontainer for {}", folder);

        let output = run(
            "devcontainer",
            &["up", "--workspace-folder", &folder],
            workspace,
            Some(DEVCONTAINER_UP_TIMEOUT),
        )
        .await;
        if !output.success {
            return Err(AcError::Workspace(format!(
                "devcontainer up failed:\n{}",
                output.stderr
            )));
        }

        tracing::info!("devcontainer is running");
        Ok(())
    }
}

/// Publishes a run's changes as a GitHub pull request via `git` and `gh`
#[derive(Debug, Default, Clone)]
pub struct GitPublisher;

impl GitPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactPublisher for GitPublisher {
    async fn publish(&self, request: &ArtifactRequest) -> Result<Option<String>, AcError> {
        let dir = request.workspace.as_path();
        let branch = request.branch.as_str();

        let add = run("git", &["add", "-A"], dir, None).await;
        if !add.success {
            tracing::warn!("git add failed: {}", add.stderr);
            return Ok(None);
        }

        let staged = run("git", &["diff", "--cached", "--stat"], dir, None).await;
        if staged.stdout.is_empty() {
            tracing::info!("No changes to commit in {}", dir.display());
            return Ok(None);
        }

        let title = request.title.as_str();
        let body = request.body.as_str();
        let steps: [(&str, Vec<&str>); 3] = [
            ("git", vec!["commit", "-m", title]),
            ("git", vec!["push", "-u", "origin", branch]),
            (
                "gh",
                vec!["pr", "create", "--title", title, "--body", body, "--head", branch],
            ),
        ];

        let mut last = None;
        for (program, args) in &steps {
            let output = run(program, args, dir, None).await;
            if !output.success {
                tracing::warn!("{} {} failed: {}", program, args[0], output.stderr);
                return Ok(None);
            }
            last = Some(output);
        }

        let url = last.map(|output| output.stdout).filter(|url| !url.is_empty());
        if let Some(url) = &url {
            tracing::info!("Pull request created: {}", url);
        }
        Ok(url)
    }
}

/// Branch name usable as a path component
pub fn sanitize_branch(branch: &str) -> String {
    branch.replace(['/', '\\'], "-")
}

/// Where the worktree for `branch` of `repo` lives: a sibling directory
pub fn worktree_path(repo: &Path, branch: &str) -> PathBuf {
    let name = repo
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    let parent = repo.parent().unwrap_or(repo);
    parent.join(format!("{}-worktree-{}", name, sanitize_branch(branch)))
}

/// Create (or reuse) a worktree of `repo` checked out on `branch`
pub async fn create_worktree(repo: &Path, branch: &str) -> Result<PathBuf, AcError> {
    let path = worktree_path(repo, branch);
    if path.exists() {
        tracing::info!("Reusing worktree at {}", path.display());
        return Ok(path);
    }

    let target = path.to_string_lossy().into_owned();
    let mut output = run("git", &["worktree", "add", &target, "-b", branch], repo, None).await;
    if !output.success && output.stderr.contains("already exists") {
        // Branch exists already: check it out instead of creating it
        output = run("git", &["worktree", "add", &target, branch], repo, None).await;
    }
    if !output.success {
        return Err(AcError::Workspace(format!(
            "Failed to create worktree: {}",
            output.stderr
        )));
    }

    tracing::info!("Created worktree at {} on branch '{}'", path.display(), branch);
    Ok(path)
}

/// Remove a worktree; failure is only logged
pub async fn remove_worktree(repo: &Path, worktree: &Path) {
    let target = worktree.to_string_lossy();
    let output = run("git", &["worktree", "remove", &target, "--force"], repo, None).await;
    if output.success {
        tracing::info!("Removed worktree at {}", target);
    } else {
        tracing::warn!("Failed to remove worktree: {}", output.stderr);
    }
}

/// Whether `path` is inside a git work tree
pub async fn is_git_repository(path: &Path) -> bool {
    run("git", &["rev-parse", "--is-inside-work-tree"], path, None)
        .await
        .stdout
        == "true"
}
