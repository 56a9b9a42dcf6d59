//! Host lifecycle hooks.
//!
//! The host announces project lifecycle events; plugins register hook objects
//! per event. A hook carries whatever it needs as fields, set when it is
//! registered.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::project::Project;
use crate::tunnel::TunnelError;

/// Project lifecycle events published by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    ProjectStart,
    ProjectStop,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 2] = [LifecycleEvent::ProjectStart, LifecycleEvent::ProjectStop];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::ProjectStart => "project:start",
            LifecycleEvent::ProjectStop => "project:stop",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project:start" => Ok(LifecycleEvent::ProjectStart),
            "project:stop" => Ok(LifecycleEvent::ProjectStop),
            _ => Err(format!(
                "unknown event '{}', expected 'project:start' or 'project:stop'",
                s
            )),
        }
    }
}

/// A handler for one lifecycle event.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, project: &Project) -> Result<(), TunnelError>;
}

/// Hooks keyed by event, run in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<LifecycleEvent, Vec<Arc<dyn LifecycleHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event: LifecycleEvent, hook: Arc<dyn LifecycleHook>) {
        tracing::debug!(event = %event, hook = hook.name(), "Registered lifecycle hook");
        self.hooks.entry(event).or_default().push(hook);
    }

    /// Number of hooks registered for `event`.
    pub fn len(&self, event: LifecycleEvent) -> usize {
        self.hooks.get(&event).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.values().all(Vec::is_empty)
    }

    /// Run every hook for `event`. The first failure stops the run.
    pub async fn emit(&self, event: LifecycleEvent, project: &Project) -> Result<(), TunnelError> {
        let Some(hooks) = self.hooks.get(&event) else {
            return Ok(());
        };

        for hook in hooks {
            tracing::debug!(event = %event, hook = hook.name(), project = %project.name, "Running hook");
            hook.handle(project).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl LifecycleHook for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, project: &Project) -> Result<(), TunnelError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, project.name));
            if self.fail {
                return Err(TunnelError::NotStarted {
                    project: project.name.clone(),
                });
            }
            Ok(())
        }
    }

    fn recorder(name: &str, seen: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn LifecycleHook> {
        Arc::new(Recorder {
            name: name.to_string(),
            seen: Arc::clone(seen),
            fail,
        })
    }

    #[test]
    fn event_names_round_trip() {
        for event in LifecycleEvent::ALL {
            assert_eq!(event.as_str().parse::<LifecycleEvent>().unwrap(), event);
        }
        assert!("project:restart".parse::<LifecycleEvent>().is_err());
    }

    #[tokio::test]
    async fn emit_runs_only_matching_hooks_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(LifecycleEvent::ProjectStart, recorder("a", &seen, false));
        registry.register(LifecycleEvent::ProjectStart, recorder("b", &seen, false));
        registry.register(LifecycleEvent::ProjectStop, recorder("c", &seen, false));

        registry
            .emit(LifecycleEvent::ProjectStart, &Project::new("demo"))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a:demo", "b:demo"]);
        assert_eq!(registry.len(LifecycleEvent::ProjectStop), 1);
    }

    #[tokio::test]
    async fn emit_stops_at_first_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(LifecycleEvent::ProjectStop, recorder("bad", &seen, true));
        registry.register(LifecycleEvent::ProjectStop, recorder("never", &seen, false));

        let result = registry
            .emit(LifecycleEvent::ProjectStop, &Project::new("demo"))
            .await;

        assert!(result.is_err());
        assert_eq!(*seen.lock().unwrap(), vec!["bad:demo"]);
    }

    #[tokio::test]
    async fn emit_without_hooks_is_ok() {
        let registry = HookRegistry::new();
        assert!(registry.is_empty());
        registry
            .emit(LifecycleEvent::ProjectStart, &Project::new("demo"))
            .await
            .unwrap();
    }
}
