//! Tunnel manager lifecycle against the in-memory runtime.
//!
//! Every test drives [`TunnelManager`] through [`StubRuntime`] and asserts on
//! the exact Docker calls it made.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use ngrok_plugin::config::TunnelConfig;
use ngrok_plugin::docker::{RestartPolicy, RuntimeError, TerminalSize};
use ngrok_plugin::project::{ENABLE_KEY, Project, TOKEN_KEY};
use ngrok_plugin::testing::{RuntimeCall, StubRuntime};
use ngrok_plugin::tunnel::{
    LinkOutcome, StartOptions, StartOutcome, TunnelError, TunnelManager, TunnelState,
};

const FORWARDING_LINE: &str = "Forwarding https://abcd1234.ngrok.io -> http://demo.workspace:80\n";

fn demo() -> Project {
    let mut project = Project::new("demo");
    project.set_meta(ENABLE_KEY, true);
    project.set_meta(TOKEN_KEY, "tok_demo");
    project
}

fn manager(runtime: &Arc<StubRuntime>) -> TunnelManager {
    TunnelManager::new(runtime.clone(), TunnelConfig::default())
}

fn call(f: fn(String) -> RuntimeCall, name: &str) -> RuntimeCall {
    f(name.to_string())
}

// ── Start ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_creates_demo_container() {
    let runtime = Arc::new(StubRuntime::new().with_output([FORWARDING_LINE]));
    let manager = manager(&runtime);

    let outcome = manager
        .start(&demo(), StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        StartOutcome::Created(LinkOutcome::Found("https://abcd1234.ngrok.io".to_string()))
    );

    let created = runtime.created();
    assert_eq!(created.len(), 1);
    let spec = &created[0];
    assert_eq!(spec.name, "ngrok-demo");
    assert_eq!(spec.image, "ngrok/ngrok:latest");
    assert_eq!(spec.env_pairs(), vec!["NGROK_AUTHTOKEN=tok_demo"]);
    assert_eq!(spec.cmd, vec!["http", "demo.workspace:80"]);
    assert_eq!(spec.restart, RestartPolicy::Always);
    assert!(spec.tty);
    assert_eq!(spec.network.as_deref(), Some("workspace"));

    assert_eq!(manager.state("demo").await, TunnelState::Running);
}

#[tokio::test]
async fn start_attaches_before_starting() {
    let runtime = Arc::new(StubRuntime::new().with_output([FORWARDING_LINE]));

    manager(&runtime)
        .start(&demo(), StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        runtime.mutating_calls(),
        vec![
            call(RuntimeCall::Pull, "ngrok/ngrok:latest"),
            call(RuntimeCall::Create, "ngrok-demo"),
            call(RuntimeCall::AttachOutput, "ngrok-demo"),
            call(RuntimeCall::Start, "ngrok-demo"),
            RuntimeCall::Resize(
                "ngrok-demo".to_string(),
                TerminalSize {
                    columns: 90,
                    rows: 40
                }
            ),
        ]
    );
}

#[tokio::test]
async fn start_without_link_is_degraded_success() {
    let runtime = Arc::new(
        StubRuntime::new().with_output(["msg=\"starting web service\" addr=http://localhost:4040\n"]),
    );
    let manager = manager(&runtime);

    let outcome = manager
        .start(&demo(), StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, StartOutcome::Created(LinkOutcome::StreamEnded));
    assert!(runtime.has_container("ngrok-demo"));
}

#[tokio::test]
async fn start_leaves_existing_container_alone() {
    let runtime = Arc::new(StubRuntime::new().with_container("ngrok-demo"));
    let manager = manager(&runtime);

    let outcome = manager
        .start(&demo(), StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, StartOutcome::AlreadyRunning);
    assert!(runtime.mutating_calls().is_empty());
    assert_eq!(manager.state("demo").await, TunnelState::Running);
}

#[tokio::test]
async fn restart_removes_container_first() {
    let runtime = Arc::new(
        StubRuntime::new()
            .with_container("ngrok-demo")
            .with_output([FORWARDING_LINE]),
    );

    let options = StartOptions {
        restart: true,
        attach: false,
    };
    manager(&runtime)
        .start(&demo(), options, &CancellationToken::new())
        .await
        .unwrap();

    let calls = runtime.calls();
    assert_eq!(calls[0], call(RuntimeCall::Remove, "ngrok-demo"));
    assert!(calls.contains(&call(RuntimeCall::Create, "ngrok-demo")));
}

#[tokio::test]
async fn restart_on_disabled_project_only_removes() {
    let runtime = Arc::new(StubRuntime::new().with_container("ngrok-demo"));
    let mut project = demo();
    project.set_meta(ENABLE_KEY, false);

    let options = StartOptions {
        restart: true,
        attach: true,
    };
    let outcome = manager(&runtime)
        .start(&project, options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, StartOutcome::Disabled);
    assert_eq!(runtime.calls(), vec![call(RuntimeCall::Remove, "ngrok-demo")]);
}

#[tokio::test]
async fn start_with_attach_opens_session() {
    let runtime = Arc::new(StubRuntime::new().with_output([FORWARDING_LINE]));

    let options = StartOptions {
        restart: false,
        attach: true,
    };
    manager(&runtime)
        .start(&demo(), options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        runtime.calls().last(),
        Some(&call(RuntimeCall::AttachInteractive, "ngrok-demo"))
    );
}

#[tokio::test]
async fn start_without_token_fails_before_docker_changes() {
    let runtime = Arc::new(StubRuntime::new());
    let mut project = demo();
    project.meta.remove(TOKEN_KEY);

    let err = manager(&runtime)
        .start(&project, StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TunnelError::MissingAuthToken { .. }));
    assert!(runtime.mutating_calls().is_empty());
}

#[tokio::test]
async fn failed_start_removes_created_container() {
    let runtime = Arc::new(StubRuntime::new().failing_start());
    let manager = manager(&runtime);

    let err = manager
        .start(&demo(), StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TunnelError::Runtime(RuntimeError::ContainerStartFailed { .. })
    ));
    assert!(!runtime.has_container("ngrok-demo"));
    assert_eq!(
        runtime.calls().last(),
        Some(&call(RuntimeCall::Remove, "ngrok-demo"))
    );
    assert_eq!(manager.state("demo").await, TunnelState::Absent);
}

#[tokio::test]
async fn cancelled_wait_keeps_container() {
    let runtime = Arc::new(StubRuntime::new().with_output(["no link here\n"]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = manager(&runtime)
        .start(&demo(), StartOptions::default(), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, StartOutcome::Created(LinkOutcome::Cancelled));
    assert!(runtime.has_container("ngrok-demo"));
}

#[tokio::test]
async fn link_at_end_of_quiet_output_is_found() {
    let runtime = Arc::new(
        StubRuntime::new().with_output_then_pending(["Forwarding https://abcd1234.ngrok.io"]),
    );
    let config = TunnelConfig {
        link_timeout: Some(Duration::from_secs(5)),
        ..TunnelConfig::default()
    };
    let manager = TunnelManager::new(runtime.clone(), config);

    let outcome = manager
        .start(&demo(), StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        StartOutcome::Created(LinkOutcome::Found("https://abcd1234.ngrok.io".to_string()))
    );
    assert_eq!(manager.state("demo").await, TunnelState::Running);
}

#[tokio::test]
async fn state_is_awaiting_link_while_output_is_silent() {
    let runtime = Arc::new(StubRuntime::new().with_output_then_pending(["Session Status  connecting\n"]));
    let config = TunnelConfig {
        link_timeout: Some(Duration::from_secs(5)),
        ..TunnelConfig::default()
    };
    let manager = TunnelManager::new(runtime.clone(), config);
    let cancel = CancellationToken::new();

    let observe = async {
        let seen = tokio::time::timeout(Duration::from_secs(2), async {
            while manager.state("demo").await != TunnelState::AwaitingLink {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok();
        cancel.cancel();
        seen
    };
    let project = demo();
    let (outcome, seen) = tokio::join!(
        manager.start(&project, StartOptions::default(), &cancel),
        observe
    );

    assert!(seen, "state never reached AwaitingLink");
    assert_eq!(outcome.unwrap(), StartOutcome::Created(LinkOutcome::Cancelled));
    assert_eq!(manager.state("demo").await, TunnelState::Running);
    assert!(runtime.has_container("ngrok-demo"));
}

#[tokio::test]
async fn interrupted_start_skips_attach() {
    let runtime = Arc::new(StubRuntime::new().with_output_then_pending(["starting\n"]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let options = StartOptions {
        restart: false,
        attach: true,
    };
    manager(&runtime).start(&demo(), options, &cancel).await.unwrap();

    assert!(!runtime
        .calls()
        .contains(&call(RuntimeCall::AttachInteractive, "ngrok-demo")));
}

// ── Stop ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_twice_is_noop_success() {
    let runtime = Arc::new(StubRuntime::new().with_container("ngrok-demo"));
    let manager = manager(&runtime);

    manager.stop(&demo()).await.unwrap();
    manager.stop(&demo()).await.unwrap();

    assert!(!runtime.has_container("ngrok-demo"));
    assert_eq!(manager.state("demo").await, TunnelState::Absent);
}

// ── Hooks ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn disabled_project_hooks_make_no_container_calls() {
    let runtime = Arc::new(StubRuntime::new().with_container("ngrok-demo"));
    let manager = manager(&runtime);
    let mut project = demo();
    project.set_meta(ENABLE_KEY, false);

    let started = manager
        .on_project_start(&project, &CancellationToken::new())
        .await
        .unwrap();
    let stopped = manager.on_project_stop(&project).await.unwrap();

    assert_eq!(started, StartOutcome::Disabled);
    assert!(!stopped);
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn enabled_project_hooks_start_and_stop() {
    let runtime = Arc::new(StubRuntime::new().with_output([FORWARDING_LINE]));
    let manager = manager(&runtime);

    manager
        .on_project_start(&demo(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(runtime.has_container("ngrok-demo"));

    assert!(manager.on_project_stop(&demo()).await.unwrap());
    assert!(!runtime.has_container("ngrok-demo"));
}

// ── Attach / forwarding ────────────────────────────────────────────────────

#[tokio::test]
async fn attach_requires_container() {
    let runtime = Arc::new(StubRuntime::new());

    let err = manager(&runtime).attach(&demo()).await.unwrap_err();

    assert!(matches!(err, TunnelError::NotStarted { project } if project == "demo"));
}

#[tokio::test]
async fn forwarding_without_container_is_not_started() {
    let runtime = Arc::new(StubRuntime::new());

    let err = manager(&runtime).get_forwarding(&demo()).await.unwrap_err();

    assert!(matches!(err, TunnelError::NotStarted { .. }));
    assert_eq!(err.to_string(), "Ngrok for \"demo\" not started");
}

#[tokio::test]
async fn forwarding_without_address_is_not_started() {
    let runtime = Arc::new(StubRuntime::new().with_container("ngrok-demo"));

    let err = manager(&runtime).get_forwarding(&demo()).await.unwrap_err();

    assert!(matches!(err, TunnelError::NotStarted { .. }));
}

#[tokio::test]
async fn forwarding_returns_public_url() {
    let runtime = Arc::new(
        StubRuntime::new()
            .with_container("ngrok-demo")
            .with_address("ngrok-demo", "172.18.0.7")
            .with_exec_response(
                r#"{"name":"command_line","uri":"/api/tunnels/command_line","public_url":"https://abcd1234.ngrok.io","proto":"https"}"#,
            ),
    );

    let url = manager(&runtime).get_forwarding(&demo()).await.unwrap();

    assert_eq!(url, "https://abcd1234.ngrok.io");
}

#[tokio::test]
async fn forwarding_with_garbage_body_is_invalid() {
    let runtime = Arc::new(
        StubRuntime::new()
            .with_container("ngrok-demo")
            .with_address("ngrok-demo", "172.18.0.7")
            .with_exec_response("curl: (7) Failed to connect to 172.18.0.7 port 4040"),
    );

    let err = manager(&runtime).get_forwarding(&demo()).await.unwrap_err();

    assert!(matches!(err, TunnelError::InvalidForwarding { .. }));
}
