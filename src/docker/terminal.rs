//! Interactive terminal sessions on a container.
//!
//! Puts the local terminal in raw mode, forwards stdin to the container and
//! copies its output to stdout until the container exits or the user detaches
//! with ctrl-p ctrl-q.

use std::io::Read;

use bollard::container::{AttachContainerOptions, AttachContainerResults};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::docker::client::{DockerRuntime, log_bytes};
use crate::docker::error::{Result, RuntimeError};
use crate::docker::{ContainerRuntime, TerminalSize};

const DETACH_KEYS: &str = "ctrl-p,ctrl-q";

/// Restores cooked mode on drop, including on early return.
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn enable() -> Self {
        match crossterm::terminal::enable_raw_mode() {
            Ok(()) => Self { enabled: true },
            Err(e) => {
                // Not a TTY (piped input); stream without raw mode.
                tracing::debug!("Raw mode unavailable: {}", e);
                Self { enabled: false }
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

fn local_terminal_size() -> Option<TerminalSize> {
    crossterm::terminal::size()
        .ok()
        .filter(|(columns, rows)| *columns > 0 && *rows > 0)
        .map(|(columns, rows)| TerminalSize { columns, rows })
}

/// Read stdin on a plain thread.
///
/// A pending read on tokio's stdin would hold up runtime shutdown after the
/// user detaches; a detached thread does not.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

pub(crate) async fn attach(runtime: &DockerRuntime, name: &str) -> Result<()> {
    let attach_failed = |reason: String| RuntimeError::AttachFailed {
        name: name.to_string(),
        reason,
    };

    let options = AttachContainerOptions::<String> {
        stdin: Some(true),
        stdout: Some(true),
        stderr: Some(true),
        stream: Some(true),
        logs: Some(false),
        detach_keys: Some(DETACH_KEYS.to_string()),
    };

    let AttachContainerResults {
        mut output,
        mut input,
    } = runtime
        .client()
        .attach_container(name, Some(options))
        .await
        .map_err(|e| attach_failed(e.to_string()))?;

    println!("Attached to {} (detach with ctrl-p ctrl-q)", name);
    let _raw = RawModeGuard::enable();

    // Match the container TTY to ours; this also makes the agent redraw.
    if let Some(size) = local_terminal_size()
        && let Err(e) = runtime.resize_tty(name, size).await
    {
        tracing::debug!("Could not resize {}: {}", name, e);
    }

    let mut keys = spawn_stdin_reader();
    let stdin_pump = tokio::spawn(async move {
        while let Some(chunk) = keys.recv().await {
            if let Err(e) = input.write_all(&chunk).await {
                tracing::debug!("stdin forwarding stopped: {}", e);
                break;
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    let result = async {
        while let Some(frame) = output.next().await {
            let bytes = log_bytes(frame.map_err(|e| attach_failed(e.to_string()))?);
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
        Ok::<(), RuntimeError>(())
    }
    .await;

    stdin_pump.abort();
    result
}
