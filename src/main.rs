//! ws-ngrok - main entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ngrok_plugin::{
    cli::{Cli, Command, run_command, run_interruptible},
    config::Config,
    controller::NgrokController,
    docker::{DockerRuntime, Platform, check_docker},
    hooks::HookRegistry,
    project::FileProjectStore,
    prompts::TerminalPrompter,
    tunnel::TunnelManager,
};

/// How long a command gets to stop after the first ctrl-c.
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Exit status for a command abandoned on SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Completions don't need Docker or a project
    if let Command::Completion(completion) = &cli.command {
        return completion.run();
    }

    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env()?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Loaded configuration");

    let runtime = match DockerRuntime::connect().await {
        Ok(runtime) => runtime,
        Err(e) => {
            let status = check_docker().await;
            if let Some(hint) = Platform::current().hint_for(status) {
                eprintln!("{}", hint);
            }
            return Err(e.into());
        }
    };

    let projects = Arc::new(FileProjectStore::new(config.projects_dir()));
    let manager = Arc::new(TunnelManager::new(Arc::new(runtime), config.tunnel.clone()));
    let controller = NgrokController::new(projects, manager, Arc::new(TerminalPrompter));

    let cancel = CancellationToken::new();
    let mut hooks = HookRegistry::new();
    controller.register_hooks(&mut hooks, cancel.clone());

    let interrupts = futures::stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    });
    let work = run_command(cli.command, &controller, &hooks, &cancel);

    match run_interruptible(work, interrupts, &cancel, INTERRUPT_GRACE).await {
        Some(result) => result,
        None => {
            eprintln!("Interrupted");
            std::process::exit(INTERRUPTED_EXIT);
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ngrok_plugin=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
