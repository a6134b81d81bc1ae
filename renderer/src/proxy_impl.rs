//! Live content proxy
//!
//! Fronts the content generator. Every request names the session it belongs
//! to; when that differs from the session the generator was last configured
//! for, the proxy re-resolves the session, rewrites the generator config and
//! makes sure the generator is running before forwarding. Switches are
//! serialized on one lock, forwarding is not.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::core::{load_navigation, resolve_session, LaunchPlan};
use crate::error::{RendererError, RendererResult};
use crate::services::{stream_archive, Teardown};
use crate::state::ProxyState;
use crate::traits::{ConfigWriter, GeneratorLauncher, LaunchRequest, SessionRegistry, VariableSource};
use crate::types::{GeneratorConfig, ProxySettings, SessionDescriptor, ACCESS_TOKEN_HEADER, SESSION_NAME_HEADER};
use shared::logging::{log_shutdown, log_success};
use shared::{process_debug, process_error, process_info, process_warn, ProcessId};

const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Step of a session switch, used to pick the client-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStage {
    Resolve,
    Variables,
    Configure,
    Launch,
}

impl SwitchStage {
    pub fn message(&self) -> &'static str {
        match self {
            SwitchStage::Resolve => "Unable to validate workshop session",
            SwitchStage::Variables => "Unable to fetch workshop session config",
            SwitchStage::Configure => "Unable to generate server configuration",
            SwitchStage::Launch => "Unable to start content server",
        }
    }
}

impl std::fmt::Display for SwitchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SwitchStage::Resolve => "resolve",
            SwitchStage::Variables => "variables",
            SwitchStage::Configure => "configure",
            SwitchStage::Launch => "launch",
        };
        f.write_str(name)
    }
}

/// A session switch that did not complete
#[derive(Debug)]
pub struct SwitchFailure {
    pub stage: SwitchStage,
    pub error: RendererError,
}

impl SwitchFailure {
    fn at(stage: SwitchStage) -> impl FnOnce(RendererError) -> Self {
        move |error| Self { stage, error }
    }
}

impl IntoResponse for SwitchFailure {
    fn into_response(self) -> Response {
        plain_response(StatusCode::INTERNAL_SERVER_ERROR, self.stage.message())
    }
}

/// How the proxy server came to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The HTTP server returned on its own
    Stopped,
    /// A termination signal arrived
    Signalled(&'static str),
}

impl ServeOutcome {
    /// Process exit status once teardown has run
    pub fn exit_code(&self) -> i32 {
        match self {
            ServeOutcome::Stopped => 0,
            ServeOutcome::Signalled(_) => 1,
        }
    }
}

/// Content proxy with dependency injection
pub struct ContentProxy<R, V, W, L> {
    settings: Arc<ProxySettings>,
    state: Arc<Mutex<ProxyState>>,
    registry: Arc<R>,
    variables: Arc<V>,
    writer: Arc<W>,
    launcher: Arc<L>,
    client: Client<HttpConnector, Body>,
    upstream: Arc<str>,
}

impl<R, V, W, L> Clone for ContentProxy<R, V, W, L> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            state: Arc::clone(&self.state),
            registry: Arc::clone(&self.registry),
            variables: Arc::clone(&self.variables),
            writer: Arc::clone(&self.writer),
            launcher: Arc::clone(&self.launcher),
            client: self.client.clone(),
            upstream: Arc::clone(&self.upstream),
        }
    }
}

impl<R, V, W, L> ContentProxy<R, V, W, L>
where
    R: SessionRegistry + 'static,
    V: VariableSource + 'static,
    W: ConfigWriter + 'static,
    L: GeneratorLauncher + 'static,
{
    /// Create a new proxy with dependency injection
    ///
    /// The launcher is shared so shutdown teardown can stop the generator.
    pub fn new(settings: ProxySettings, registry: R, variables: V, writer: W, launcher: Arc<L>) -> Self {
        let state = ProxyState::new(settings.launch_policy.clone());
        let upstream: Arc<str> = format!("http://{}", settings.generator_addr()).into();
        let client = Client::builder(TokioExecutor::new()).build_http();

        Self {
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(state)),
            registry: Arc::new(registry),
            variables: Arc::new(variables),
            writer: Arc::new(writer),
            launcher,
            client,
            upstream,
        }
    }

    /// Build the Axum router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/workshop/content/", any(content_handler::<R, V, W, L>))
            .route("/workshop/content/*path", any(content_handler::<R, V, W, L>));

        if self.settings.serve_files {
            router = router.route("/workshop/files.tar", get(files_handler::<R, V, W, L>));
        }

        router
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).into_inner())
            .with_state(self.clone())
    }

    /// Serve until the server stops or a shutdown signal arrives, then tear down
    ///
    /// # Returns
    /// How the server stopped, or `ServerStartup` when the listener cannot be
    /// bound; teardown runs in every case
    pub async fn run(&self, bind_address: SocketAddr, teardown: Teardown) -> RendererResult<ServeOutcome> {
        let listener = match tokio::net::TcpListener::bind(bind_address).await {
            Ok(listener) => listener,
            Err(e) => {
                teardown.run().await;
                return Err(RendererError::ServerStartup(format!("Failed to bind to {bind_address}: {e}")));
            }
        };

        process_info!(ProcessId::current(), "🌐 Content proxy listening on http://{}", bind_address);
        process_debug!(ProcessId::current(), "📁 Serving workshop {}", self.settings.workshop_dir().display());

        let outcome = tokio::select! {
            result = axum::serve(listener, self.build_router()).into_future() => {
                log_shutdown(ProcessId::current(), "HTTP server stopped");
                result
                    .map(|()| ServeOutcome::Stopped)
                    .map_err(|e| RendererError::ServerStartup(format!("Server error: {e}")))
            }
            signal = shutdown_signal() => {
                log_shutdown(ProcessId::current(), &format!("received {signal}"));
                Ok(ServeOutcome::Signalled(signal))
            }
        };

        teardown.run().await;
        outcome
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    pub fn state(&self) -> &Arc<Mutex<ProxyState>> {
        &self.state
    }

    /// Make sure the generator is configured for `session`
    ///
    /// Concurrent callers queue on the state lock in arrival order; a caller
    /// that finds the session already switched to returns immediately.
    pub async fn ensure_session(&self, session: &str) -> Result<(), SwitchFailure> {
        let mut state = self.state.lock().await;
        if !state.needs_switch(session) {
            return Ok(());
        }

        process_info!(
            ProcessId::current(),
            "🔄 Switching content from {} to {}",
            state.last_session().unwrap_or("<none>"),
            session
        );

        let result = self.switch(&mut state, session).await;
        match &result {
            Ok(()) => {
                state.switched_to(session);
                log_success(ProcessId::current(), &format!("Serving content for session {session}"));
            }
            Err(failure) => {
                process_error!(
                    ProcessId::current(),
                    session = session,
                    stage = %failure.stage,
                    "❌ Session switch failed: {}",
                    failure.error
                );
            }
        }
        result
    }

    async fn switch(&self, state: &mut ProxyState, session: &str) -> Result<(), SwitchFailure> {
        let descriptor = resolve_session(
            self.registry.as_ref(),
            session,
            &self.settings.workshop_name,
            &self.settings.portal_name,
        )
        .await
        .map_err(SwitchFailure::at(SwitchStage::Resolve))?;

        let variables = self
            .variables
            .fetch_variables(&descriptor)
            .await
            .map_err(SwitchFailure::at(SwitchStage::Variables))?;

        let navigation = load_navigation(&self.settings.workshop_dir(), &variables)
            .await
            .map_err(SwitchFailure::at(SwitchStage::Configure))?;

        let config = GeneratorConfig::new(&descriptor.url, variables, navigation);
        self.writer
            .write_config(&config)
            .await
            .map_err(SwitchFailure::at(SwitchStage::Configure))?;

        self.settle_generator(state, &descriptor)
            .await
            .map_err(SwitchFailure::at(SwitchStage::Launch))
    }

    /// Launch the generator or give it time to reload the new config
    async fn settle_generator(&self, state: &mut ProxyState, descriptor: &SessionDescriptor) -> RendererResult<()> {
        let alive = state.supervisor.is_running() && self.launcher.is_alive().await;

        match state.supervisor.plan(alive, Instant::now())? {
            LaunchPlan::Reload => {
                tokio::time::sleep(self.settings.reload_delay).await;
            }
            LaunchPlan::Launch => {
                let request = LaunchRequest::new(
                    self.settings.workshop_dir(),
                    self.writer.config_path(),
                    self.settings.generator.port,
                    &descriptor.url,
                );

                match self.launcher.launch(&request).await {
                    Ok(pid) => {
                        state.supervisor.launch_succeeded(pid);
                        tokio::time::sleep(self.settings.warmup).await;
                    }
                    Err(e) => {
                        state.supervisor.launch_failed(e.to_string(), Instant::now());
                        return Err(e);
                    }
                }
            }
        }

        Ok(())
    }

    /// Forward a request to the generator and stream its response back
    pub async fn forward(&self, mut request: Request) -> Response {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let uri = match format!("{}{}", self.upstream, path_and_query).parse::<Uri>() {
            Ok(uri) => uri,
            Err(e) => {
                process_warn!(ProcessId::current(), "⚠️ Cannot build upstream uri: {}", e);
                return plain_response(StatusCode::BAD_GATEWAY, "Content server unavailable");
            }
        };

        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;
        strip_hop_by_hop(request.headers_mut());

        match self.client.request(request).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                let error = RendererError::ForwardFailed { message: e.to_string() };
                process_warn!(ProcessId::current(), "⚠️ {}", error);
                plain_response(error.status_code(), "Content server unavailable")
            }
        }
    }
}

/// Remove headers that only apply to a single connection
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn plain_response(status: StatusCode, message: &str) -> Response {
    (status, format!("{} - {}", status.as_u16(), message)).into_response()
}

fn error_response(error: &RendererError) -> Response {
    plain_response(error.status_code(), &error.to_string())
}

async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}

// HTTP Handlers

/// Proxy a content request, switching sessions first when needed
async fn content_handler<R, V, W, L>(State(proxy): State<ContentProxy<R, V, W, L>>, request: Request) -> Response
where
    R: SessionRegistry + 'static,
    V: VariableSource + 'static,
    W: ConfigWriter + 'static,
    L: GeneratorLauncher + 'static,
{
    let headers = request.headers();

    let token = headers.get(ACCESS_TOKEN_HEADER).and_then(|value| value.to_str().ok());
    if !proxy.settings.token_matches(token) {
        return error_response(&RendererError::InvalidAccessToken);
    }

    let session = headers
        .get(SESSION_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let Some(session) = session else {
        return error_response(&RendererError::MissingSessionName);
    };

    if let Err(failure) = proxy.ensure_session(&session).await {
        return failure.into_response();
    }

    proxy.forward(request).await
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    token: Option<String>,
}

/// Stream the workshop tree as a tar archive
async fn files_handler<R, V, W, L>(
    State(proxy): State<ContentProxy<R, V, W, L>>,
    Query(query): Query<FilesQuery>,
) -> Response
where
    R: SessionRegistry + 'static,
    V: VariableSource + 'static,
    W: ConfigWriter + 'static,
    L: GeneratorLauncher + 'static,
{
    if !proxy.settings.token_matches(query.token.as_deref()) {
        return error_response(&RendererError::InvalidAccessToken);
    }

    process_debug!(ProcessId::current(), "📦 Streaming {}", proxy.settings.workshop_root.display());
    let body = Body::from_stream(stream_archive(proxy.settings.workshop_root.clone()));

    ([(header::CONTENT_TYPE, "application/x-tar")], body).into_response()
}
