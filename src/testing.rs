//! Test doubles for the plugin's seams.
//!
//! Provides:
//! - [`StubRuntime`]: an in-memory [`ContainerRuntime`] that records every call
//! - [`MemoryProjectStore`]: a [`ProjectStore`] backed by a map
//! - [`ScriptedPrompter`]: a [`Prompter`] that replays canned answers
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ngrok_plugin::config::TunnelConfig;
//! use ngrok_plugin::testing::StubRuntime;
//! use ngrok_plugin::tunnel::TunnelManager;
//!
//! let runtime = Arc::new(StubRuntime::new().with_output(["Forwarding https://ab12.ngrok.io"]));
//! let manager = TunnelManager::new(runtime.clone(), TunnelConfig::default());
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use crate::docker::{
    ContainerRuntime, ContainerSpec, OutputStream, Result, RuntimeError, TerminalSize,
};
use crate::error::{ProjectError, PromptError};
use crate::project::{Project, ProjectStore};
use crate::prompts::Prompter;

/// One recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Exists(String),
    Pull(String),
    Create(String),
    AttachOutput(String),
    Start(String),
    Resize(String, TerminalSize),
    Remove(String),
    NetworkAddress(String, String),
    Exec(String, Vec<String>),
    AttachInteractive(String),
}

#[derive(Default)]
struct RuntimeState {
    calls: Vec<RuntimeCall>,
    containers: HashSet<String>,
    created: Vec<ContainerSpec>,
    output: Vec<String>,
    addresses: HashMap<String, String>,
    exec_response: Option<String>,
    fail_start: bool,
    hold_open: bool,
}

/// In-memory container runtime.
///
/// Created containers are remembered by name until removed. Attaching yields
/// the scripted output chunks, then ends (or stays open, see
/// [`with_output_then_pending`](Self::with_output_then_pending)).
#[derive(Default)]
pub struct StubRuntime {
    state: Mutex<RuntimeState>,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a container with this name already exists.
    pub fn with_container(self, name: impl Into<String>) -> Self {
        self.lock().containers.insert(name.into());
        self
    }

    /// Chunks returned by `attach_output`.
    pub fn with_output<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().output = chunks.into_iter().map(Into::into).collect();
        self
    }

    /// Like [`with_output`](Self::with_output), but the stream stays open
    /// and silent after the last chunk, as a running agent's does.
    pub fn with_output_then_pending<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stub = self.with_output(chunks);
        stub.lock().hold_open = true;
        stub
    }

    /// Network address reported for a container.
    pub fn with_address(self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.lock().addresses.insert(name.into(), address.into());
        self
    }

    /// Stdout returned by `exec`.
    pub fn with_exec_response(self, body: impl Into<String>) -> Self {
        self.lock().exec_response = Some(body.into());
        self
    }

    /// Make `start_container` fail.
    pub fn failing_start(self) -> Self {
        self.lock().fail_start = true;
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Specs passed to `create_container`.
    pub fn created(&self) -> Vec<ContainerSpec> {
        self.lock().created.clone()
    }

    /// Whether a container is currently present.
    pub fn has_container(&self, name: &str) -> bool {
        self.lock().containers.contains(name)
    }

    /// Calls that change or start containers, ignoring read-only probes.
    pub fn mutating_calls(&self) -> Vec<RuntimeCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                !matches!(
                    c,
                    RuntimeCall::Exists(_) | RuntimeCall::NetworkAddress(_, _)
                )
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RuntimeState> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: RuntimeCall) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn container_exists(&self, name: &str) -> Result<bool> {
        self.record(RuntimeCall::Exists(name.to_string()));
        Ok(self.lock().containers.contains(name))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(RuntimeCall::Pull(image.to_string()));
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record(RuntimeCall::Create(spec.name.clone()));
        let mut state = self.lock();
        if !state.containers.insert(spec.name.clone()) {
            return Err(RuntimeError::ContainerCreationFailed {
                name: spec.name.clone(),
                reason: "Conflict. The container name is already in use".to_string(),
            });
        }
        state.created.push(spec.clone());
        Ok(format!("stub-{}", spec.name))
    }

    async fn attach_output(&self, name: &str) -> Result<OutputStream> {
        self.record(RuntimeCall::AttachOutput(name.to_string()));
        let state = self.lock();
        let chunks: Vec<Result<String>> = state.output.iter().cloned().map(Ok).collect();
        let chunks = futures::stream::iter(chunks);
        if state.hold_open {
            Ok(Box::pin(chunks.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(chunks))
        }
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.record(RuntimeCall::Start(name.to_string()));
        if self.lock().fail_start {
            return Err(RuntimeError::ContainerStartFailed {
                name: name.to_string(),
                reason: "port is already allocated".to_string(),
            });
        }
        Ok(())
    }

    async fn resize_tty(&self, name: &str, size: TerminalSize) -> Result<()> {
        self.record(RuntimeCall::Resize(name.to_string(), size));
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.record(RuntimeCall::Remove(name.to_string()));
        self.lock().containers.remove(name);
        Ok(())
    }

    async fn network_address(&self, name: &str, network: &str) -> Result<Option<String>> {
        self.record(RuntimeCall::NetworkAddress(
            name.to_string(),
            network.to_string(),
        ));
        let state = self.lock();
        if !state.containers.contains(name) {
            return Err(RuntimeError::ContainerNotFound {
                name: name.to_string(),
            });
        }
        Ok(state.addresses.get(name).cloned())
    }

    async fn exec(&self, target: &str, argv: &[String], _tty: bool) -> Result<String> {
        self.record(RuntimeCall::Exec(target.to_string(), argv.to_vec()));
        self.lock()
            .exec_response
            .clone()
            .ok_or_else(|| RuntimeError::ExecFailed {
                target: target.to_string(),
                reason: "no exec response scripted".to_string(),
            })
    }

    async fn attach_interactive(&self, name: &str) -> Result<()> {
        self.record(RuntimeCall::AttachInteractive(name.to_string()));
        if !self.lock().containers.contains(name) {
            return Err(RuntimeError::ContainerNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Project store held in memory.
#[derive(Default)]
pub struct MemoryProjectStore {
    projects: Mutex<HashMap<String, Project>>,
    selected: Mutex<Option<String>>,
    saves: Mutex<u32>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project and make it current.
    pub fn with_project(self, project: Project) -> Self {
        let name = project.name.clone();
        self.insert(project);
        *self.selected.lock().unwrap_or_else(|e| e.into_inner()) = Some(name);
        self
    }

    /// Add a project without selecting it.
    pub fn insert(&self, project: Project) {
        self.projects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(project.name.clone(), project);
    }

    pub fn get(&self, name: &str) -> Option<Project> {
        self.projects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Number of `save` calls.
    pub fn saves(&self) -> u32 {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn current(&self) -> std::result::Result<Project, ProjectError> {
        let selected = self
            .selected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ProjectError::NoCurrentProject)?;
        self.get(&selected).ok_or(ProjectError::NotFound(selected))
    }

    async fn cd_project(&self, name: &str) -> std::result::Result<(), ProjectError> {
        if self.get(name).is_none() {
            return Err(ProjectError::NotFound(name.to_string()));
        }
        *self.selected.lock().unwrap_or_else(|e| e.into_inner()) = Some(name.to_string());
        Ok(())
    }

    async fn save(&self, project: &Project) -> std::result::Result<(), ProjectError> {
        self.insert(project.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

/// A prompt that was shown, with the default it offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asked {
    Confirm { message: String, default: bool },
    Input { message: String, default: String },
}

/// Prompter that answers from queues.
///
/// An empty queue answers with the offered default, like pressing enter.
#[derive(Default)]
pub struct ScriptedPrompter {
    confirms: Mutex<VecDeque<bool>>,
    inputs: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<Asked>>,
    cancelled: bool,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm_with(self, answer: bool) -> Self {
        self.confirms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(answer);
        self
    }

    pub fn input_with(self, answer: impl Into<String>) -> Self {
        self.inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(answer.into());
        self
    }

    /// Every prompt answers with [`PromptError::Cancelled`].
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    /// Prompts shown so far.
    pub fn asked(&self) -> Vec<Asked> {
        self.asked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, message: &str, default: bool) -> std::result::Result<bool, PromptError> {
        self.asked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Asked::Confirm {
                message: message.to_string(),
                default,
            });
        if self.cancelled {
            return Err(PromptError::Cancelled);
        }
        Ok(self
            .confirms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(default))
    }

    async fn input(&self, message: &str, default: &str) -> std::result::Result<String, PromptError> {
        self.asked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Asked::Input {
                message: message.to_string(),
                default: default.to_string(),
            });
        if self.cancelled {
            return Err(PromptError::Cancelled);
        }
        Ok(self
            .inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| default.to_string()))
    }
}
