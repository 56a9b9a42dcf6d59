//! `ngrok:init` round-trips through the file-backed project store.
//!
//! Each test uses a tempdir as the data directory, runs the controller with
//! scripted answers, then reads the stored project document back.

use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use ngrok_plugin::config::Config;
use ngrok_plugin::controller::NgrokController;
use ngrok_plugin::project::{ENABLE_KEY, FileProjectStore, Project, ProjectStore, TOKEN_KEY};
use ngrok_plugin::settings::Settings;
use ngrok_plugin::testing::{ScriptedPrompter, StubRuntime};
use ngrok_plugin::tunnel::{StartOptions, TunnelManager};

fn read_meta(data_dir: &Path, name: &str) -> serde_json::Value {
    let path = data_dir.join("projects").join(name).join("config.json");
    let raw = std::fs::read_to_string(path).expect("project file should exist");
    let doc: serde_json::Value = serde_json::from_str(&raw).expect("project file is JSON");
    doc["meta"].clone()
}

fn controller(config: &Config, store: Arc<FileProjectStore>, prompter: ScriptedPrompter) -> (NgrokController, Arc<StubRuntime>) {
    let runtime = Arc::new(
        StubRuntime::new().with_output(["Forwarding https://f00d.ngrok.io -> http://demo.workspace:80\n"]),
    );
    let manager = Arc::new(TunnelManager::new(runtime.clone(), config.tunnel.clone()));
    (
        NgrokController::new(store, manager, Arc::new(prompter)),
        runtime,
    )
}

#[tokio::test]
async fn init_persists_enable_flag_and_token() {
    let dir = tempdir().unwrap();
    let config = Config::from_settings(dir.path().to_path_buf(), &Settings::default()).unwrap();
    let store = Arc::new(FileProjectStore::new(config.projects_dir()));
    store.save(&Project::new("demo")).await.unwrap();

    let prompter = ScriptedPrompter::new()
        .confirm_with(true)
        .input_with("  tok_123  ");
    let (controller, _) = controller(&config, store, prompter);

    controller.init(Some("demo")).await.unwrap();

    let meta = read_meta(dir.path(), "demo");
    assert_eq!(meta[ENABLE_KEY], "true");
    assert_eq!(meta[TOKEN_KEY], "tok_123");
}

#[tokio::test]
async fn init_then_start_uses_stored_token() {
    let dir = tempdir().unwrap();
    let config = Config::from_settings(dir.path().to_path_buf(), &Settings::default()).unwrap();
    let store = Arc::new(FileProjectStore::new(config.projects_dir()));
    store.save(&Project::new("demo")).await.unwrap();

    let prompter = ScriptedPrompter::new()
        .confirm_with(true)
        .input_with("tok_abc");
    let (controller, runtime) = controller(&config, store, prompter);

    controller.init(Some("demo")).await.unwrap();
    controller
        .start(Some("demo"), StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let created = runtime.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].env_value(TOKEN_KEY), Some("tok_abc"));
}

#[tokio::test]
async fn settings_file_overrides_defaults() {
    let dir = tempdir().unwrap();
    std::fs::write(
        Settings::path_in(dir.path()),
        "[tunnel]\nimage = \"ngrok/ngrok:3\"\nnetwork = \"dev\"\n",
    )
    .unwrap();

    let settings = Settings::load_from(&Settings::path_in(dir.path())).unwrap();
    let config = Config::from_settings(dir.path().to_path_buf(), &settings).unwrap();
    let store = Arc::new(FileProjectStore::new(config.projects_dir()));
    let mut project = Project::new("demo");
    project.set_meta(ENABLE_KEY, true);
    project.set_meta(TOKEN_KEY, "tok");
    store.save(&project).await.unwrap();

    let (controller, runtime) = controller(&config, store, ScriptedPrompter::new());
    controller
        .start(Some("demo"), StartOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    let spec = &runtime.created()[0];
    assert_eq!(spec.image, "ngrok/ngrok:3");
    assert_eq!(spec.network.as_deref(), Some("dev"));
}
