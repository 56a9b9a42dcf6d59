//! bollard-backed container runtime.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    InspectContainerOptions, LogOutput, RemoveContainerOptions, ResizeContainerTtyOptions,
    StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, RestartPolicy as DockerRestartPolicy, RestartPolicyNameEnum};
use bytes::Bytes;
use futures::StreamExt;

use crate::docker::connect::connect_docker;
use crate::docker::error::{Result, RuntimeError, is_not_found};
use crate::docker::terminal;
use crate::docker::{ContainerRuntime, ContainerSpec, OutputStream, RestartPolicy, TerminalSize};

/// Container runtime talking to the local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the daemon.
    pub async fn connect() -> Result<Self> {
        let docker = connect_docker().await?;
        tracing::debug!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Wrap an existing connection.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    pub(crate) fn client(&self) -> &Docker {
        &self.docker
    }
}

fn restart_policy(policy: RestartPolicy) -> DockerRestartPolicy {
    let name = match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    };
    DockerRestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

/// Raw payload of any log frame.
pub(crate) fn log_bytes(output: LogOutput) -> Bytes {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message,
    }
}

/// Decodes frame payloads as text, carrying a character split across frames.
///
/// Anything that is not UTF-8 is decoded lossily.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let complete = self.pending.len() - incomplete_tail_len(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..complete]).into_owned();
        self.pending.drain(..complete);
        text
    }
}

/// Length of a truncated multi-byte sequence at the end of `bytes`, if any.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return 0,
        };
        return if back < width { back } else { 0 };
    }
    0
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn container_exists(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(RuntimeError::Api {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            tracing::debug!("Image '{}' exists locally", image);
            return Ok(());
        }

        tracing::info!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Pulled image: {}", image);
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let env = spec.env_pairs();

        let host_config = HostConfig {
            restart_policy: Some(restart_policy(spec.restart)),
            network_mode: spec.network.clone(),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: if env.is_empty() { None } else { Some(env) },
            cmd: if spec.cmd.is_empty() {
                None
            } else {
                Some(spec.cmd.clone())
            },
            tty: Some(spec.tty),
            open_stdin: Some(spec.tty),
            attach_stdin: Some(spec.tty),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::ContainerCreationFailed {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, "Docker: {}", warning);
        }

        tracing::debug!(container = %spec.name, id = %response.id, "Created container");
        Ok(response.id)
    }

    async fn attach_output(&self, name: &str) -> Result<OutputStream> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };

        // Dropping `input` closes our side of stdin; the agent keeps running.
        let AttachContainerResults { output, input: _ } = self
            .docker
            .attach_container(name, Some(options))
            .await
            .map_err(|e| RuntimeError::AttachFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let name = name.to_string();
        let mut decoder = Utf8Decoder::default();
        let stream = output.map(move |frame| {
            frame
                .map(|frame| decoder.decode(&log_bytes(frame)))
                .map_err(|e| RuntimeError::AttachFailed {
                name: name.clone(),
                    reason: e.to_string(),
                })
        });

        Ok(Box::pin(stream))
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::ContainerStartFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Started container: {}", name);
        Ok(())
    }

    async fn resize_tty(&self, name: &str, size: TerminalSize) -> Result<()> {
        self.docker
            .resize_container_tty(
                name,
                ResizeContainerTtyOptions {
                    width: size.columns,
                    height: size.rows,
                },
            )
            .await
            .map_err(|e| RuntimeError::Api {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => {
                tracing::info!("Removed container: {}", name);
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                tracing::debug!("Container '{}' already absent", name);
                Ok(())
            }
            Err(e) => Err(RuntimeError::Api {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn network_address(&self, name: &str, network: &str) -> Result<Option<String>> {
        let info = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    RuntimeError::ContainerNotFound {
                        name: name.to_string(),
                    }
                } else {
                    RuntimeError::Api {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let address = info
            .network_settings
            .and_then(|settings| settings.networks)
            .and_then(|mut networks| networks.remove(network))
            .and_then(|endpoint| endpoint.ip_address)
            .filter(|ip| !ip.is_empty());

        Ok(address)
    }

    async fn exec(&self, target: &str, argv: &[String], tty: bool) -> Result<String> {
        let exec_failed = |reason: String| RuntimeError::ExecFailed {
            target: target.to_string(),
            reason,
        };

        let options = CreateExecOptions {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(tty),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(target, options)
            .await
            .map_err(|e| exec_failed(e.to_string()))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| exec_failed(e.to_string()))?;

        let mut stdout = String::new();
        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(frame) = output.next().await {
                match frame.map_err(|e| exec_failed(e.to_string()))? {
                    // With a TTY the daemon does not multiplex; everything is console.
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        tracing::debug!(target_container = %target, "exec stderr: {}", String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| exec_failed(e.to_string()))?;

        match inspect.exit_code {
            Some(0) | None => Ok(stdout),
            Some(code) => Err(exec_failed(format!(
                "`{}` exited with status {}",
                argv.join(" "),
                code
            ))),
        }
    }

    async fn attach_interactive(&self, name: &str) -> Result<()> {
        if !self.container_exists(name).await? {
            return Err(RuntimeError::ContainerNotFound {
                name: name.to_string(),
            });
        }
        terminal::attach(self, name).await
    }
}
