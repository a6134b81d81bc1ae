//! Trait definitions with mockall annotations for testing
//!
//! Every collaborator of the proxy that performs I/O sits behind one of these
//! traits so the session-switch sequence can be driven with mocks.

use std::path::PathBuf;

use crate::error::RendererResult;
use crate::types::{GeneratorConfig, SessionDescriptor, SessionRecord, SessionVariables};

/// Arguments for starting the generator in watch/serve mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Workshop content directory the generator renders from
    pub source_dir: PathBuf,
    /// Configuration file the generator watches
    pub config_path: PathBuf,
    /// Local port the generator serves on
    pub port: u16,
    /// Port browsers use for live reload, derived from the session URL scheme
    pub live_reload_port: u16,
}

impl LaunchRequest {
    pub fn new(source_dir: PathBuf, config_path: PathBuf, port: u16, session_url: &str) -> Self {
        let live_reload_port = if session_url.starts_with("https://") { 443 } else { 80 };

        Self {
            source_dir,
            config_path,
            port,
            live_reload_port,
        }
    }
}

/// Arguments for a one-shot static build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub source_dir: PathBuf,
    pub config_path: PathBuf,
    pub destination: PathBuf,
}

/// Control-plane lookup of workshop session records
#[mockall::automock]
#[async_trait::async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Fetch the session resource by name
    ///
    /// # Returns
    /// The raw record, `SessionNotFound` when the control plane has no such
    /// session, or `SessionLookupFailed` for any other failure
    async fn fetch_session(&self, session_name: &str) -> RendererResult<SessionRecord>;
}

/// Source of per-session parameters
#[mockall::automock]
#[async_trait::async_trait]
pub trait VariableSource: Send + Sync {
    /// Fetch the flat key/value parameters published by the session
    async fn fetch_variables(&self, session: &SessionDescriptor) -> RendererResult<SessionVariables>;
}

/// Materializes generator configuration on disk
#[mockall::automock]
#[async_trait::async_trait]
pub trait ConfigWriter: Send + Sync {
    /// Replace the live configuration file atomically
    ///
    /// # Returns
    /// Path of the live configuration file
    async fn write_config(&self, config: &GeneratorConfig) -> RendererResult<PathBuf>;

    /// Path of the live configuration file, whether or not it exists yet
    fn config_path(&self) -> PathBuf;
}

/// Runs the external content generator
#[mockall::automock]
#[async_trait::async_trait]
pub trait GeneratorLauncher: Send + Sync {
    /// Spawn the generator in serve/watch mode
    ///
    /// # Returns
    /// OS process id of the spawned generator
    async fn launch(&self, request: &LaunchRequest) -> RendererResult<u32>;

    /// Whether the launched generator is still running
    async fn is_alive(&self) -> bool;

    /// Run the generator once to produce static output
    async fn build_static(&self, request: &BuildRequest) -> RendererResult<()>;

    /// Terminate the launched generator, if any
    async fn stop(&self) -> RendererResult<()>;
}

/// Expands a workshop definition with user-supplied data values
#[mockall::automock]
#[async_trait::async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn expand(&self, raw: &[u8], data_values: &[(String, String)]) -> RendererResult<Vec<u8>>;
}
