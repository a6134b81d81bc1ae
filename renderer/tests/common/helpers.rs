//! Test helpers and builder patterns for renderer tests
//!
//! `ProxyBuilder` wires a `ContentProxy` to mocks whose call counts are set
//! per test; `TestHelpers` drives the router and stands up a fake generator.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Response, StatusCode};
use axum::Router;
use renderer::traits::{MockConfigWriter, MockGeneratorLauncher, MockSessionRegistry, MockVariableSource};
use renderer::{ContentProxy, ProxySettings, RendererError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use super::fixtures::TestFixtures;

pub type TestProxy = ContentProxy<MockSessionRegistry, MockVariableSource, MockConfigWriter, MockGeneratorLauncher>;

/// Builder for proxies backed by mocks
pub struct ProxyBuilder {
    settings: ProxySettings,
    config_path: PathBuf,
    registry: MockSessionRegistry,
    variables: MockVariableSource,
    writer: MockConfigWriter,
    launcher: MockGeneratorLauncher,
}

impl ProxyBuilder {
    /// Proxy for the standard workshop with no settle delays
    ///
    /// No collaborator expects any call until told otherwise.
    pub fn new(workshop_root: &Path, config_dir: &Path, generator_port: u16) -> Self {
        let mut settings = ProxySettings::new(workshop_root, TestFixtures::WORKSHOP, TestFixtures::PORTAL);
        settings.generator.port = generator_port;
        settings.warmup = Duration::ZERO;
        settings.reload_delay = Duration::ZERO;

        let config_path = config_dir.join("hugo.yaml");
        let mut writer = MockConfigWriter::new();
        let path = config_path.clone();
        writer.expect_config_path().returning(move || path.clone()).times(0..);

        let mut launcher = MockGeneratorLauncher::new();
        launcher.expect_is_alive().returning(|| true).times(0..);
        launcher.expect_stop().returning(|| Ok(())).times(0..);

        Self {
            settings,
            config_path,
            registry: MockSessionRegistry::new(),
            variables: MockVariableSource::new(),
            writer,
            launcher,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.settings.access_token = Some(token.to_string());
        self
    }

    pub fn with_serve_files(mut self) -> Self {
        self.settings.serve_files = true;
        self
    }

    /// Registry answers with the standard record `times` times
    pub fn expect_lookups(mut self, times: usize) -> Self {
        self.registry
            .expect_fetch_session()
            .returning(|_| Ok(TestFixtures::session_record()))
            .times(times);
        self
    }

    /// Variables endpoint answers with the `intro` variables `times` times
    pub fn expect_variable_fetches(mut self, times: usize) -> Self {
        self.variables
            .expect_fetch_variables()
            .returning(|_| Ok(TestFixtures::intro_variables()))
            .times(times);
        self
    }

    /// Config writes land in the config directory `times` times
    pub fn expect_writes(mut self, times: usize) -> Self {
        let path = self.config_path.clone();
        self.writer
            .expect_write_config()
            .returning(move |config| {
                let yaml = serde_yaml::to_string(config).map_err(|e| RendererError::ConfigWriteFailed {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                std::fs::write(&path, yaml)?;
                Ok(path.clone())
            })
            .times(times);
        self
    }

    /// Generator launches succeed `times` times
    pub fn expect_launches(mut self, times: usize) -> Self {
        self.launcher.expect_launch().returning(|_| Ok(4242)).times(times);
        self
    }

    pub fn with_registry(mut self, registry: MockSessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_variables(mut self, variables: MockVariableSource) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_launcher(mut self, launcher: MockGeneratorLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn build(self) -> TestProxy {
        ContentProxy::new(
            self.settings,
            self.registry,
            self.variables,
            self.writer,
            Arc::new(self.launcher),
        )
    }
}

/// Helper functions for driving the proxy
pub struct TestHelpers;

impl TestHelpers {
    /// Start a stand-in generator that echoes method, uri and session header
    pub async fn spawn_upstream() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let app = Router::new().fallback(|request: Request| async move {
            let session = request
                .headers()
                .get("x-session-name")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            (
                [("x-upstream", "generator")],
                format!("{} {} {}", request.method(), request.uri(), session),
            )
        });

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    /// A local port with nothing listening on it
    pub async fn unused_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Request for a content path with optional session and token headers
    pub fn content_request(path: &str, session: Option<&str>, token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(path);
        if let Some(session) = session {
            builder = builder.header("X-Session-Name", session);
        }
        if let Some(token) = token {
            builder = builder.header("X-Access-Token", token);
        }
        builder.body(Body::empty()).unwrap()
    }

    pub async fn call(router: Router, request: Request) -> Response<Body> {
        router.oneshot(request).await.unwrap()
    }

    /// Send a request and collect status and body text
    pub async fn send(router: Router, request: Request) -> (StatusCode, String) {
        let response = Self::call(router, request).await;
        let status = response.status();
        (status, Self::body_text(response).await)
    }

    pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    pub async fn body_text(response: Response<Body>) -> String {
        String::from_utf8_lossy(&Self::body_bytes(response).await).into_owned()
    }

    /// Parse the generator config the proxy last wrote
    pub fn read_config(config_dir: &Path) -> serde_yaml::Value {
        let text = std::fs::read_to_string(config_dir.join("hugo.yaml")).unwrap();
        serde_yaml::from_str(&text).unwrap()
    }
}
