//! Integration tests for the live content proxy
//!
//! The router is driven in-process with mocked control-plane collaborators
//! while a small axum server stands in for the content generator.

use axum::http::{header, StatusCode};
use renderer::traits::{MockGeneratorLauncher, MockSessionRegistry, MockVariableSource};
use renderer::RendererError;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;
use common::{ProxyBuilder, TestFixtures, TestHelpers};

#[tokio::test]
async fn test_missing_session_header_is_rejected() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port).build();

    let (status, body) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "400 - Session name required");
    assert_eq!(proxy.state().lock().await.last_session(), None);
}

#[tokio::test]
async fn test_empty_session_header_is_rejected() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port).build();

    let (status, _) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(""), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_header_is_used_verbatim() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let mut registry = MockSessionRegistry::new();
    registry
        .expect_fetch_session()
        .withf(|name: &str| name == " abc123")
        .returning(|_| Ok(TestFixtures::session_record()))
        .times(1);
    registry
        .expect_fetch_session()
        .withf(|name: &str| name == "abc123")
        .returning(|_| Ok(TestFixtures::session_record()))
        .times(1);

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .with_registry(registry)
        .expect_variable_fetches(2)
        .expect_writes(2)
        .expect_launches(1)
        .build();

    for session in [" abc123", "abc123"] {
        let (status, _) = TestHelpers::send(
            proxy.build_router(),
            TestHelpers::content_request("/workshop/content/", Some(session), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let state = proxy.state().lock().await;
    assert_eq!(state.switch_count(), 2);
    assert_eq!(state.last_session(), Some("abc123"));
}

#[tokio::test]
async fn test_wrong_token_makes_no_downstream_calls() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    // No expectations: any resolver, fetch, write or launch call would panic
    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .with_token(TestFixtures::TOKEN)
        .build();

    let (status, body) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), Some("wrong")),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "403 - Invalid access token");

    let (status, _) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_first_request_switches_and_forwards() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .with_token(TestFixtures::TOKEN)
        .expect_lookups(1)
        .expect_variable_fetches(1)
        .expect_writes(1)
        .expect_launches(1)
        .build();

    let response = TestHelpers::call(
        proxy.build_router(),
        TestHelpers::content_request(
            "/workshop/content/step1/?lang=en",
            Some(TestFixtures::SESSION),
            Some(TestFixtures::TOKEN),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-upstream"], "generator");
    let body = TestHelpers::body_text(response).await;
    assert_eq!(body, "GET /workshop/content/step1/?lang=en abc123");

    let state = proxy.state().lock().await;
    assert_eq!(state.last_session(), Some(TestFixtures::SESSION));
    assert_eq!(state.switch_count(), 1);
    assert!(state.supervisor.is_running());
}

#[tokio::test]
async fn test_generated_config_follows_selected_pathway() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .expect_lookups(1)
        .expect_variable_fetches(1)
        .expect_writes(1)
        .expect_launches(1)
        .build();

    let (status, _) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let config = TestHelpers::read_config(config_dir.path());
    assert_eq!(config["baseURL"], "https://abc123.lab1.example.com/workshop/content/");

    let params = &config["params"];
    assert_eq!(params["__first_page__"], "step1");
    assert_eq!(params["session_namespace"], "lab1-w01-s001");
    assert_eq!(params["__modules__"]["step1"]["next_page"], "step2");
    assert_eq!(params["__modules__"]["step1"]["prev_page"], "");
    assert_eq!(params["__modules__"]["step1"]["title"], "First Steps");
    assert_eq!(params["__modules__"]["step2"]["prev_page"], "step1");
    assert_eq!(params["__modules__"]["step2"]["next_page"], "");
    assert_eq!(params["__modules__"]["step2"]["step"], 2);
    assert!(params["__modules__"].get("overview").is_none());
}

#[tokio::test]
async fn test_repeated_session_skips_switch() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .expect_lookups(1)
        .expect_variable_fetches(1)
        .expect_writes(1)
        .expect_launches(1)
        .build();

    for path in ["/workshop/content/", "/workshop/content/step1/", "/workshop/content/step2/"] {
        let (status, body) = TestHelpers::send(
            proxy.build_router(),
            TestHelpers::content_request(path, Some(TestFixtures::SESSION), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with(&format!("GET {path}")));
    }

    assert_eq!(proxy.state().lock().await.switch_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_new_session_switch_once() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .expect_lookups(1)
        .expect_variable_fetches(1)
        .expect_writes(1)
        .expect_launches(1)
        .build();
    let router = proxy.build_router();

    let mut handles = Vec::new();
    for index in 0..8 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            TestHelpers::send(
                router,
                TestHelpers::content_request(
                    &format!("/workshop/content/page{index}/"),
                    Some(TestFixtures::SESSION),
                    None,
                ),
            )
            .await
        }));
    }

    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(proxy.state().lock().await.switch_count(), 1);
}

#[tokio::test]
async fn test_new_session_reloads_running_generator() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .expect_lookups(2)
        .expect_variable_fetches(2)
        .expect_writes(2)
        .expect_launches(1)
        .build();

    for session in [TestFixtures::SESSION, TestFixtures::OTHER_SESSION] {
        let (status, _) = TestHelpers::send(
            proxy.build_router(),
            TestHelpers::content_request("/workshop/content/", Some(session), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let state = proxy.state().lock().await;
    assert_eq!(state.last_session(), Some(TestFixtures::OTHER_SESSION));
    assert_eq!(state.switch_count(), 2);
}

#[tokio::test]
async fn test_exited_generator_is_relaunched_on_next_switch() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let mut launcher = MockGeneratorLauncher::new();
    launcher.expect_launch().returning(|_| Ok(4242)).times(2);
    launcher.expect_is_alive().returning(|| false).times(1);

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .with_launcher(launcher)
        .expect_lookups(2)
        .expect_variable_fetches(2)
        .expect_writes(2)
        .build();

    for session in [TestFixtures::SESSION, TestFixtures::OTHER_SESSION] {
        let (status, _) = TestHelpers::send(
            proxy.build_router(),
            TestHelpers::content_request("/workshop/content/", Some(session), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_session_mismatch_leaves_state_unchanged() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let mut registry = MockSessionRegistry::new();
    registry
        .expect_fetch_session()
        .returning(|_| Ok(renderer::SessionRecord::new("lab2", "main", "pw", "https://x")))
        .times(1);

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .with_registry(registry)
        .build();

    let (status, body) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "500 - Unable to validate workshop session");
    assert_eq!(proxy.state().lock().await.last_session(), None);
    assert!(!config_dir.path().join("hugo.yaml").exists());
}

#[tokio::test]
async fn test_variables_failure_is_retried_by_next_request() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut variables = MockVariableSource::new();
    variables
        .expect_fetch_variables()
        .returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RendererError::variables("session endpoint returned 503"))
            } else {
                Ok(TestFixtures::intro_variables())
            }
        })
        .times(2);

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .with_variables(variables)
        .expect_lookups(2)
        .expect_writes(1)
        .expect_launches(1)
        .build();

    let (status, body) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "500 - Unable to fetch workshop session config");
    assert_eq!(proxy.state().lock().await.last_session(), None);

    let (status, _) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_navigation_config_fails_configuration() {
    let root = TestFixtures::workshop_root();
    std::fs::write(root.path().join("workshop/config.yaml"), "pathways: [unclosed").unwrap();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .expect_lookups(1)
        .expect_variable_fetches(1)
        .build();

    let (status, body) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "500 - Unable to generate server configuration");
}

#[tokio::test]
async fn test_launch_failure_is_retried_on_next_switch() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::spawn_upstream().await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let mut launcher = MockGeneratorLauncher::new();
    launcher
        .expect_launch()
        .returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RendererError::launch("failed to spawn hugo: not found"))
            } else {
                Ok(4242)
            }
        })
        .times(2);

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .with_launcher(launcher)
        .expect_lookups(2)
        .expect_variable_fetches(2)
        .expect_writes(2)
        .build();

    let (status, body) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "500 - Unable to start content server");
    assert!(!proxy.state().lock().await.supervisor.is_running());

    let (status, _) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(proxy.state().lock().await.supervisor.is_running());
}

#[tokio::test]
async fn test_unreachable_generator_is_bad_gateway() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();
    let port = TestHelpers::unused_port().await;

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), port)
        .expect_lookups(1)
        .expect_variable_fetches(1)
        .expect_writes(1)
        .expect_launches(1)
        .build();

    let (status, body) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/content/", Some(TestFixtures::SESSION), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, "502 - Content server unavailable");
}

#[tokio::test]
async fn test_files_archive_requires_token() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), 1313)
        .with_token(TestFixtures::TOKEN)
        .with_serve_files()
        .build();

    let (status, body) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/files.tar?token=wrong", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "403 - Invalid access token");
}

#[tokio::test]
async fn test_files_archive_streams_tree_without_git() {
    use futures_util::StreamExt;

    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), 1313)
        .with_token(TestFixtures::TOKEN)
        .with_serve_files()
        .build();

    let response = TestHelpers::call(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/files.tar?token=secret", None, None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-tar");

    let bytes = TestHelpers::body_bytes(response).await;
    let mut archive = tokio_tar::Archive::new(Cursor::new(bytes));
    let mut entries = archive.entries().unwrap();

    let mut names = Vec::new();
    while let Some(entry) = entries.next().await {
        let entry = entry.unwrap();
        names.push(entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string());
    }

    assert!(names.contains(&"workshop/config.yaml".to_string()));
    assert!(names.contains(&"workshop/content/step1/index.md".to_string()));
    assert!(names.iter().all(|name| name != ".git" && !name.starts_with(".git/")));
}

#[tokio::test]
async fn test_files_archive_not_routed_unless_enabled() {
    let root = TestFixtures::workshop_root();
    let config_dir = tempfile::tempdir().unwrap();

    let proxy = ProxyBuilder::new(root.path(), config_dir.path(), 1313).build();

    let (status, _) = TestHelpers::send(
        proxy.build_router(),
        TestHelpers::content_request("/workshop/files.tar", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
