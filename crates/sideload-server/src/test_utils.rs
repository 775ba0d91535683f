//! Test utilities for sideload-server integration tests.

use std::sync::Arc;

use axum::Router;
use sideload_core::testing::{FakeRunner, test_config, write_test_ipa};
use tempfile::TempDir;

use crate::routes;
use crate::state::AppState;

/// Bundle identifier of the default package used in tests.
pub const TEST_BUNDLE_ID: &str = "com.example.portal";

/// Handles kept alive for the duration of a test.
pub struct TestContext {
    /// Scratch directory holding the working tree and the default package.
    pub dir: TempDir,
    /// Tool runner recording every invocation.
    pub runner: Arc<FakeRunner>,
    pub state: AppState,
}

/// Creates application state rooted in a fresh temporary directory.
pub async fn setup_test_state(runner: FakeRunner) -> TestContext {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let default_package = dir.path().join("Default.ipa");
    write_test_ipa(
        &default_package,
        &[
            ("CFBundleIdentifier", TEST_BUNDLE_ID),
            ("CFBundleVersion", "1.9.0"),
            ("CFBundleDisplayName", "Portal"),
        ],
    )
    .expect("Failed to write default package");

    let config = test_config(&dir.path().join("work"), default_package);
    config
        .prepare()
        .await
        .expect("Failed to prepare working directories");

    let runner = Arc::new(runner);
    let state = AppState::with_runner(config, runner.clone());

    TestContext { dir, runner, state }
}

/// Creates the full application router for testing.
pub fn create_test_app(state: AppState) -> Router {
    routes::router(state)
}

/// Creates a test application with a recording tool runner.
pub async fn create_test_app_with_state() -> (Router, TestContext) {
    create_test_app_with_runner(FakeRunner::new()).await
}

/// Creates a test application with the given tool runner.
pub async fn create_test_app_with_runner(runner: FakeRunner) -> (Router, TestContext) {
    let ctx = setup_test_state(runner).await;
    let app = create_test_app(ctx.state.clone());
    (app, ctx)
}
