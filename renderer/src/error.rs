//! Renderer-specific error types

use axum::http::StatusCode;
use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Session name required")]
    MissingSessionName,

    #[error("No workshop session can be found: {session}")]
    SessionNotFound { session: String },

    #[error("Workshop session {session} not linked to target {field}: expected {expected}, found {actual}")]
    SessionMismatch {
        session: String,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Cannot determine {missing} for workshop session {session}")]
    SessionIncomplete { session: String, missing: &'static str },

    #[error("Workshop session lookup failed for {session}: {message}")]
    SessionLookupFailed { session: String, message: String },

    #[error("Failed to fetch session variables: {message}")]
    VariableFetchFailed { message: String },

    #[error("Unable to unpack workshop config {path}: {message}")]
    NavigationConfigInvalid { path: String, message: String },

    #[error("Unable to write generator config {path}: {message}")]
    ConfigWriteFailed { path: String, message: String },

    #[error("Failed to launch content generator: {message}")]
    GeneratorLaunchFailed { message: String },

    #[error("Content generator build failed: {message}")]
    GeneratorBuildFailed { message: String },

    #[error("Content server unavailable: {message}")]
    ForwardFailed { message: String },

    #[error("Archive streaming failed: {message}")]
    ArchiveFailed { message: String },

    #[error("Template processing failed: {message}")]
    TemplateFailed { message: String },

    #[error("Invalid workshop definition: {message}")]
    WorkshopDefinitionInvalid { message: String },

    #[error("Static export failed: {message}")]
    ExportFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Server startup error: {0}")]
    ServerStartup(String),

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl RendererError {
    pub fn config(message: impl Into<String>) -> Self {
        RendererError::ConfigError { message: message.into() }
    }

    pub fn variables(message: impl Into<String>) -> Self {
        RendererError::VariableFetchFailed { message: message.into() }
    }

    pub fn launch(message: impl Into<String>) -> Self {
        RendererError::GeneratorLaunchFailed { message: message.into() }
    }

    pub fn archive(message: impl Into<String>) -> Self {
        RendererError::ArchiveFailed { message: message.into() }
    }

    pub fn export(message: impl Into<String>) -> Self {
        RendererError::ExportFailed { message: message.into() }
    }

    pub fn lookup(session: &str, message: impl Into<String>) -> Self {
        RendererError::SessionLookupFailed {
            session: session.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status returned to a client when this error ends a request
    pub fn status_code(&self) -> StatusCode {
        match self {
            RendererError::InvalidAccessToken => StatusCode::FORBIDDEN,
            RendererError::MissingSessionName => StatusCode::BAD_REQUEST,
            RendererError::ForwardFailed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type RendererResult<T> = Result<T, RendererError>;
