//! Prompts sent to the agent and texts shown to humans

use std::path::Path;

/// Longest pull request title before it is cut
const MAX_TITLE_CHARS: usize = 72;

pub const INTERACTIVE_BANNER: &str = "Interactive session started. Commands: status, stop, steer <msg>, queue <msg>, flush, feedback <msg>, or type freely to chat.";
pub const STOPPING: &str = "Stopping agent. Goodbye.";
pub const QUEUE_EMPTY: &str = "No messages in queue.";
pub const STATUS_PROMPT: &str = "Provide a brief status update on what you have done so far, what you are currently doing, and what remains.";
pub const PR_DESCRIPTION_PROMPT: &str = "Please provide a concise pull request description summarizing:
1. What changes were made
2. Why they were made
3. Any important notes for reviewers
Format it as markdown suitable for a GitHub PR body.";

/// Standing instructions, with the project's CLAUDE.md appended if present
pub fn base_instructions(workspace: &Path) -> String {
    let project_context = std::fs::read_to_string(workspace.join("CLAUDE.md"))
        .map(|content| format!("\n\n## Project Context (from CLAUDE.md)\n\n{}", content))
        .unwrap_or_default();

    format!(
        "You are a skilled software engineer working on a codebase.
You can read and write files, execute shell commands, and use git.
Always follow existing coding conventions in the project.
When you make changes, explain what you did and why.
If you encounter errors, debug them and try to fix them.
Use the filesystem tools to explore and modify the codebase.
{}",
        project_context
    )
}

pub fn task_prompt(instructions: &str, workspace: &Path, task: &str) -> String {
    let dir_name = workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!(
        "{instructions}

You are working on a codebase located at {workspace}.
Inside the devcontainer, the workspace is mapped to /workspaces/{dir_name}.

Your task:
{task}

Instructions:
1. Analyze the codebase structure and understand the relevant parts.
2. Make the necessary code changes to accomplish the task.
3. Follow existing coding conventions and patterns in the codebase.
4. After making changes, run relevant tests to verify your work.
5. Stage and commit your changes with a descriptive commit message.
6. Summarize what you did and what was changed.",
        workspace = workspace.display(),
    )
}

pub fn steer_prompt(instruction: &str) -> String {
    format!(
        "IMPORTANT COURSE CORRECTION: The human operator wants you to change direction. New instruction: {}",
        instruction
    )
}

pub fn feedback_prompt(feedback: &str) -> String {
    format!(
        "HUMAN FEEDBACK: {}\nPlease acknowledge and adjust your approach accordingly.",
        feedback
    )
}

pub fn flush_prompt<S: AsRef<str>>(queued: &[S]) -> String {
    let items: Vec<&str> = queued.iter().map(AsRef::as_ref).collect();
    format!(
        "The human operator has the following queued messages for you:\n- {}",
        items.join("\n- ")
    )
}

pub fn queued_status(count: usize, text: &str) -> String {
    format!("Message queued ({} in queue): {}", count, text)
}

pub fn flushing_status(count: usize) -> String {
    format!("Flushing {} queued messages to agent...", count)
}

/// Task text cut to a pull request title
pub fn pr_title(task: &str) -> String {
    match task.char_indices().nth(MAX_TITLE_CHARS) {
        Some((cut, _)) => format!("{}...", &task[..cut]),
        None => task.to_string(),
    }
}

pub fn completion_text(artifact: Option<&str>, summary: &str) -> String {
    match artifact {
        Some(url) => format!("Pull request created: {}\n\n{}", url, summary),
        None => format!("Could not create a PR automatically. Summary:\n\n{}", summary),
    }
}
