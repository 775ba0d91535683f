//! API integration tests for sideload-server.
//!
//! These tests drive the HTTP surface against a temporary working directory
//! and a recording tool runner in place of cyan and zsign.

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};
use serde_json::Value;
use sideload_core::testing::FakeRunner;
use sideload_server::routes::router_with_limit;
use sideload_server::test_utils::{
    TestContext, create_test_app_with_runner, create_test_app_with_state, setup_test_state,
};

/// Helper to create a test server.
async fn create_server() -> (TestServer, TestContext) {
    let (app, ctx) = create_test_app_with_state().await;
    let server = TestServer::new(app).expect("Failed to create test server");
    (server, ctx)
}

fn file_part(name: &str, bytes: &[u8]) -> Part {
    Part::bytes(bytes.to_vec())
        .file_name(name)
        .mime_type("application/octet-stream")
}

/// A form carrying a transient certificate and profile.
fn credentials_form() -> MultipartForm {
    MultipartForm::new()
        .add_part("p12", file_part("dev.p12", b"CERT"))
        .add_part("mobileprovision", file_part("dev.mobileprovision", b"PROFILE"))
}

fn cookie_header(user: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("sideload_uid={}", user)).unwrap()
}

/// Extracts the identity issued through `Set-Cookie`, if any.
fn issued_identity(response: &TestResponse) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .and_then(|pair| pair.strip_prefix("sideload_uid="))
        .map(str::to_string)
}

fn dir_is_empty(path: std::path::PathBuf) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

// =============================================================================
// Health & Version Tests
// =============================================================================

mod health {
    use super::*;

    #[tokio::test]
    async fn health_check_returns_ok() {
        let (server, _ctx) = create_server().await;

        let response = server.get("/api/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn version_returns_server_info() {
        let (server, _ctx) = create_server().await;

        let response = server.get("/api/version").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["name"], "sideloadd");
        assert!(body["version"].is_string());
    }
}

// =============================================================================
// Identity Tests
// =============================================================================

mod identity {
    use super::*;

    #[tokio::test]
    async fn new_visitor_gets_identity_cookie() {
        let (server, _ctx) = create_server().await;

        let response = server.get("/api/health").await;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        let user = issued_identity(&response).unwrap();
        assert_eq!(user.len(), 32);
    }

    #[tokio::test]
    async fn returning_visitor_keeps_identity() {
        let (server, _ctx) = create_server().await;
        let user = issued_identity(&server.get("/api/health").await).unwrap();

        let response = server
            .get("/api/health")
            .add_header(header::COOKIE, cookie_header(&user))
            .await;

        response.assert_status_ok();
        assert!(issued_identity(&response).is_none());
    }

    #[tokio::test]
    async fn malformed_identity_is_replaced() {
        let (server, _ctx) = create_server().await;

        let response = server
            .get("/api/health")
            .add_header(header::COOKIE, HeaderValue::from_static("sideload_uid=../../etc"))
            .await;

        let user = issued_identity(&response).unwrap();
        assert_ne!(user, "../../etc");
    }
}

// =============================================================================
// Signing Tests
// =============================================================================

mod signing {
    use super::*;

    #[tokio::test]
    async fn transient_sign_with_default_package() {
        let (server, ctx) = create_server().await;

        let response = server.post("/sign").multipart(credentials_form()).await;

        response.assert_status_ok();
        let body = response.text();
        assert!(body.contains("http-equiv=\"refresh\""));
        assert!(body.contains("https://sign.example.com/result.html?installLink=itms-services"));

        let calls = ctx.runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "zsign");

        let dirs = &ctx.state.config.work_dirs;
        assert!(!dir_is_empty(dirs.signed()));
        assert!(!dir_is_empty(dirs.manifests()));
        assert!(dir_is_empty(dirs.temp()));
        assert!(dir_is_empty(dirs.certificates()));
        assert!(dir_is_empty(dirs.profiles()));
    }

    #[tokio::test]
    async fn signed_artifacts_are_served() {
        let (server, ctx) = create_server().await;

        server
            .post("/sign")
            .multipart(credentials_form())
            .await
            .assert_status_ok();

        let manifest = std::fs::read_dir(ctx.state.config.work_dirs.manifests())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .file_name()
            .into_string()
            .unwrap();
        assert!(manifest.starts_with("Portal_"));

        let response = server.get(&format!("/plist/{}", manifest)).await;
        response.assert_status_ok();
        assert!(response.text().contains("com.example.portal"));
    }

    #[tokio::test]
    async fn missing_credentials_is_bad_request() {
        let (server, ctx) = create_server().await;

        let form = MultipartForm::new().add_part("p12", file_part("dev.p12", b"CERT"));
        let response = server.post("/sign").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "Error: P12 and MobileProvision files are required.");
        assert!(ctx.runner.calls().is_empty());
        assert!(dir_is_empty(ctx.state.config.work_dirs.temp()));
    }

    #[tokio::test]
    async fn use_saved_without_vault_is_bad_request() {
        let (server, ctx) = create_server().await;

        let form = MultipartForm::new().add_text("use_saved_certs", "on");
        let response = server.post("/sign").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().starts_with("Error: No saved certificates found."));
        assert!(ctx.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn save_then_use_saved_certificates() {
        let (server, ctx) = create_server().await;

        let form = credentials_form()
            .add_text("save_cert", "on")
            .add_text("p12_password", "secret");
        let first = server.post("/sign").multipart(form).await;
        first.assert_status_ok();
        let user = issued_identity(&first).unwrap();

        let form = MultipartForm::new().add_text("use_saved_certs", "on");
        let second = server
            .post("/sign")
            .add_header(header::COOKIE, cookie_header(&user))
            .multipart(form)
            .await;
        second.assert_status_ok();

        let calls = ctx.runner.calls();
        assert_eq!(calls.len(), 2);
        let saved_cert = ctx
            .state
            .config
            .work_dirs
            .users()
            .join(&user)
            .join("cert.p12");
        assert_eq!(calls[1].value_of("-k"), Some(saved_cert.to_str().unwrap()));
        assert_eq!(calls[1].value_of("-p"), Some("secret"));
    }

    #[tokio::test]
    async fn saved_certificates_are_per_identity() {
        let (server, _ctx) = create_server().await;

        let form = credentials_form().add_text("save_cert", "on");
        server.post("/sign").multipart(form).await.assert_status_ok();

        // A different (fresh) visitor has nothing saved.
        let form = MultipartForm::new().add_text("use_saved_certs", "on");
        let response = server.post("/sign").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn modification_options_invoke_cyan() {
        let (server, ctx) = create_server().await;

        let form = credentials_form()
            .add_text("cyan_name", "Renamed")
            .add_text("cyan_no_watch", "on")
            .add_text("cyan_compress_level", "9")
            .add_part("cyan_tweaks", file_part("tweak.dylib", b"DYLIB"))
            .add_part("cyan_icon", file_part("icon.PNG", b"PNG"));
        server.post("/sign").multipart(form).await.assert_status_ok();

        let calls = ctx.runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "cyan");
        assert_eq!(calls[0].value_of("-n"), Some("Renamed"));
        assert!(calls[0].args.contains(&"-w".to_string()));
        assert_eq!(calls[0].value_of("-c"), Some("9"));
        assert!(calls[0].value_of("-f").unwrap().ends_with(".dylib"));
        assert!(calls[0].value_of("-k").unwrap().ends_with(".png"));
        assert!(dir_is_empty(ctx.state.config.work_dirs.temp()));
    }

    #[tokio::test]
    async fn disallowed_extension_is_rejected() {
        let (server, ctx) = create_server().await;

        let form = credentials_form().add_part("ipa", file_part("app.zip", b"ZIP"));
        let response = server.post("/sign").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().starts_with("Error: Invalid file type"));
        assert!(ctx.runner.calls().is_empty());
        assert!(dir_is_empty(ctx.state.config.work_dirs.temp()));
    }

    #[tokio::test]
    async fn invalid_compress_level_is_rejected() {
        let (server, ctx) = create_server().await;

        let form = credentials_form().add_text("cyan_compress_level", "12");
        let response = server.post("/sign").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(ctx.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn tool_failure_returns_stderr() {
        let (app, ctx) =
            create_test_app_with_runner(FakeRunner::failing("zsign", "certificate expired")).await;
        let server = TestServer::new(app).expect("Failed to create test server");

        let response = server.post("/sign").multipart(credentials_form()).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.text().contains("certificate expired"));
        assert!(dir_is_empty(ctx.state.config.work_dirs.signed()));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let ctx = setup_test_state(FakeRunner::new()).await;
        let app = router_with_limit(ctx.state.clone(), 1024);
        let server = TestServer::new(app).expect("Failed to create test server");

        let form = credentials_form().add_part("ipa", file_part("big.ipa", &vec![0u8; 64 * 1024]));
        let response = server.post("/sign").multipart(form).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        assert!(ctx.runner.calls().is_empty());
    }
}
