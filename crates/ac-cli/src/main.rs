//! agent-coder CLI
//!
//! - `run`: a session in this terminal, no daemon needed
//! - session commands (create, start, send, watch...) against `agent-coderd`

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ac_core::config::{self, AgentCoderConfig};
use ac_core::types::{BackendKind, EndpointKind, EndpointRequest, SessionCreateRequest, SessionId};
use agent_coder::commands::{self, RunOptions};
use agent_coder::ipc::DaemonClient;
use agent_coder::output::{print_error, print_success};

#[derive(Parser)]
#[command(name = "agent-coder")]
#[command(author, version, about = "Human-in-the-loop coding agent")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session in this terminal until it completes
    Run {
        /// Task for the agent
        task: String,
        /// Repository to work in
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,
        /// Branch to publish the result on as a pull request
        #[arg(short, long)]
        branch: Option<String>,
        /// Work in a separate git worktree for the branch
        #[arg(short, long)]
        worktree: bool,
        /// Agent backend (copilot, claude, codex)
        #[arg(long)]
        backend: Option<BackendKind>,
        /// Extra endpoint to attach (Telegram, Teams, Jira, GitHubPR).
        /// Teams, Jira and GitHubPR read input from this terminal.
        #[arg(short, long = "endpoint")]
        endpoints: Vec<EndpointKind>,
        /// Instruction used for status summaries on the extra endpoints
        #[arg(long)]
        instruction: Option<String>,
        /// Let the agent act without asking for approval
        #[arg(long)]
        auto_approve: bool,
        /// Do not open a pull request at the end
        #[arg(long)]
        no_pr: bool,
    },

    /// Create a session on the daemon
    Create {
        /// Task for the agent
        task: String,
        /// Workspace directory the agent operates on
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Branch to publish the result on
        #[arg(short, long)]
        branch: Option<String>,
        /// Agent backend (copilot, claude, codex)
        #[arg(long)]
        backend: Option<BackendKind>,
        /// Endpoint to attach besides the UI
        #[arg(short, long = "endpoint")]
        endpoints: Vec<EndpointKind>,
        /// Instruction used for status summaries on the attached endpoints
        #[arg(long)]
        instruction: Option<String>,
        #[arg(long)]
        auto_approve: bool,
        /// Do not open a pull request at the end
        #[arg(long)]
        no_pr: bool,
        /// Start the session right away
        #[arg(short, long)]
        start: bool,
    },

    /// Start a created session on the daemon
    Start {
        session: String,
    },

    /// Send a line of input to a running session
    Send {
        session: String,
        /// Text to send (e.g. "status", "steer use tokio", "stop")
        text: Vec<String>,
    },

    /// Show one session
    Show {
        session: String,
    },

    /// List sessions known to the daemon
    #[command(alias = "ls")]
    Sessions,

    /// Show the recorded messages of a session
    Messages {
        session: String,
        /// Only the last N messages
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Follow a session live
    Watch {
        session: String,
        /// Messages of history to print first
        #[arg(long, default_value_t = 20)]
        history: usize,
        /// Send lines typed on stdin to the session
        #[arg(short, long)]
        interactive: bool,
    },

    /// Check whether the daemon is running
    Ping,

    /// Stop the daemon
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = match AgentCoderConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("Invalid config {:?}: {}", config_path, e));
            return Err(e.into());
        }
    };

    let mut client = DaemonClient::with_address(config.ipc_address());

    match cli.command {
        Commands::Run {
            task,
            repo,
            branch,
            worktree,
            backend,
            endpoints,
            instruction,
            auto_approve,
            no_pr,
        } => {
            let options = RunOptions {
                repository: repo,
                task,
                branch,
                worktree,
                backend,
                endpoints,
                instruction,
                auto_approve,
                skip_completion: no_pr,
            };
            commands::run_command(config, options).await?;
        }

        Commands::Create {
            task,
            workspace,
            branch,
            backend,
            endpoints,
            instruction,
            auto_approve,
            no_pr,
            start,
        } => {
            let workspace = workspace.canonicalize().unwrap_or(workspace);
            let request = SessionCreateRequest {
                task,
                workspace: workspace.display().to_string(),
                branch,
                auto_approve,
                skip_completion: no_pr,
                backend: backend.unwrap_or(config.default_backend),
                endpoints: endpoints
                    .into_iter()
                    .map(|kind| EndpointRequest {
                        kind,
                        system_instruction: instruction.clone(),
                    })
                    .collect(),
            };
            let session_id = commands::create_command(&mut client, request, start).await?;
            println!("{}", session_id);
        }

        Commands::Start { session } => {
            commands::start_command(&mut client, &SessionId::new(session)).await?;
        }

        Commands::Send { session, text } => {
            let text = text.join(" ");
            if text.trim().is_empty() {
                anyhow::bail!("Nothing to send");
            }
            commands::send_command(&mut client, &SessionId::new(session), &text).await?;
        }

        Commands::Show { session } => {
            commands::show_command(&mut client, &SessionId::new(session)).await?;
        }

        Commands::Sessions => {
            commands::sessions_command(&mut client).await?;
        }

        Commands::Messages { session, limit } => {
            commands::messages_command(&mut client, &SessionId::new(session), limit).await?;
        }

        Commands::Watch {
            session,
            history,
            interactive,
        } => {
            commands::watch_command(&mut client, &SessionId::new(session), history, interactive)
                .await?;
        }

        Commands::Ping => {
            commands::ping_command(&mut client).await?;
        }

        Commands::Shutdown => {
            client.shutdown().await?;
            print_success("Daemon is shutting down");
        }
    }

    Ok(())
}
