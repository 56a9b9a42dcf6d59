//! CLI command handling.
//!
//! Provides subcommands for:
//! - Configuring a project's tunnel (`ngrok:init`)
//! - Starting, stopping and attaching to it (`ngrok:start`, `ngrok:stop`, `ngrok:attach`)
//! - Querying its public URL (`ngrok:forwarding`)
//! - Receiving host lifecycle events (`hook project:start`, `hook project:stop`)
//! - Shell completions (`completion`)

mod completion;

pub use completion::Completion;

use std::time::Duration;

use clap::{ColorChoice, Parser, Subcommand};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::controller::NgrokController;
use crate::hooks::{HookRegistry, LifecycleEvent};
use crate::tunnel::{StartOptions, StartOutcome};

#[derive(Parser, Debug)]
#[command(name = "ws-ngrok")]
#[command(about = "Expose workspace projects through ngrok tunnels")]
#[command(
    long_about = "Runs one ngrok agent container per project. Use 'ws-ngrok <subcommand> --help' for details.\nExamples:\n  ws-ngrok ngrok:init  # Enable tunneling for the current project\n  ws-ngrok ngrok:start -n demo  # Start the tunnel for 'demo'"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Project selector shared by every tunnel command.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Target {
    /// Project name (defaults to the current project)
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enable or disable ngrok and store the auth token
    #[command(
        name = "ngrok:init",
        about = "Configure ngrok for a project",
        long_about = "Asks whether to enable ngrok and for the auth token, then saves them on the project.\nExample: ws-ngrok ngrok:init --name demo"
    )]
    Init(Target),

    /// Start the tunnel container
    #[command(
        name = "ngrok:start",
        about = "Start ngrok",
        long_about = "Creates the tunnel container if needed and prints the forwarding URL.\nExamples:\n  ws-ngrok ngrok:start  # Start for the current project\n  ws-ngrok ngrok:start -r -a  # Recreate, then attach"
    )]
    Start {
        #[command(flatten)]
        target: Target,

        /// Remove the existing container first
        #[arg(short, long)]
        restart: bool,

        /// Attach to the container after starting
        #[arg(short, long)]
        attach: bool,
    },

    /// Stop and remove the tunnel container
    #[command(
        name = "ngrok:stop",
        about = "Stop ngrok",
        long_about = "Removes the tunnel container. Stopping a project without one is not an error.\nExample: ws-ngrok ngrok:stop -n demo"
    )]
    Stop(Target),

    /// Attach the terminal to the tunnel container
    #[command(
        name = "ngrok:attach",
        about = "Attach to ngrok",
        long_about = "Shows the ngrok console. Detach with ctrl-p ctrl-q.\nExample: ws-ngrok ngrok:attach"
    )]
    Attach(Target),

    /// Print the tunnel's public URL
    #[command(
        name = "ngrok:forwarding",
        about = "Show the forwarding URL",
        long_about = "Asks the running agent for its public URL.\nExample: ws-ngrok ngrok:forwarding -n demo"
    )]
    Forwarding(Target),

    /// Entry point for host lifecycle events (internal use)
    #[command(hide = true)]
    Hook {
        /// Event name: project:start or project:stop
        event: LifecycleEvent,

        #[command(flatten)]
        target: Target,
    },

    /// Generate shell completion scripts
    #[command(
        about = "Generate completions",
        long_about = "Generates shell completion scripts.\nExample: ws-ngrok completion --shell bash > ws-ngrok.bash"
    )]
    Completion(Completion),
}

/// Run a tunnel command.
pub async fn run_command(
    command: Command,
    controller: &NgrokController,
    hooks: &HookRegistry,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Init(target) => {
            let project = controller.init(target.name.as_deref()).await?;
            if project.tunnel_enabled() {
                println!("Ngrok enabled for \"{}\"", project.name);
            } else {
                println!("Ngrok disabled for \"{}\"", project.name);
            }
        }
        Command::Start {
            target,
            restart,
            attach,
        } => {
            let options = StartOptions { restart, attach };
            match controller
                .start(target.name.as_deref(), options, cancel)
                .await?
            {
                StartOutcome::Disabled => {
                    println!("Ngrok is disabled for this project; run ngrok:init to enable it");
                }
                StartOutcome::AlreadyRunning => {
                    println!("Ngrok is already running; use --restart to recreate it");
                }
                StartOutcome::Created(_) => {}
            }
        }
        Command::Stop(target) => controller.stop(target.name.as_deref()).await?,
        Command::Attach(target) => controller.attach(target.name.as_deref()).await?,
        Command::Forwarding(target) => {
            let url = controller.forwarding(target.name.as_deref()).await?;
            println!("Forwarding: {}", url);
        }
        Command::Hook { event, target } => {
            let project = controller.resolve(target.name.as_deref()).await?;
            tracing::debug!(event = %event, project = %project.name, "Host event");
            hooks.emit(event, &project).await?;
        }
        Command::Completion(completion) => completion.run()?,
    }
    Ok(())
}

/// Drive `work` to completion unless the user gives up on it.
///
/// The first interrupt trips `cancel` and gives `work` up to `grace` to wind
/// down. A second interrupt or an expired grace abandons it with `None`.
pub async fn run_interruptible<F, S>(
    work: F,
    interrupts: S,
    cancel: &CancellationToken,
    grace: Duration,
) -> Option<F::Output>
where
    F: Future,
    S: Stream<Item = ()>,
{
    tokio::pin!(work);
    tokio::pin!(interrupts);

    tokio::select! {
        biased;
        output = &mut work => return Some(output),
        Some(()) = interrupts.next() => {}
    }

    tracing::info!("Interrupted, stopping");
    cancel.cancel();

    tokio::select! {
        biased;
        output = &mut work => Some(output),
        Some(()) = interrupts.next() => None,
        () = tokio::time::sleep(grace) => {
            tracing::debug!("Command did not stop within {:?}", grace);
            None
        }
    }
}
