//! Workshop content renderer
//!
//! A live content proxy that re-parameterizes a content generator for every
//! visiting workshop session, and a one-shot static export of the same
//! content.

pub mod core;
pub mod error;
pub mod export;
pub mod proxy_impl;
pub mod services;
pub mod state;
pub mod traits;
pub mod types;

// Re-export main types
pub use error::{RendererError, RendererResult};
pub use export::{ExportOptions, ExportReport, StaticExporter};
pub use proxy_impl::{ContentProxy, ServeOutcome, SwitchFailure, SwitchStage};
pub use state::ProxyState;
pub use types::*;

// Re-export trait definitions
pub use traits::{BuildRequest, ConfigWriter, GeneratorLauncher, LaunchRequest, SessionRegistry, TemplateEngine, VariableSource};

// Re-export service implementations
pub use services::{
    CommandTemplateEngine, ConnectionArgs, KubernetesSessionRegistry, RealConfigWriter, RealGeneratorLauncher, RealVariableSource,
    RegistrySettings, Teardown, WorkingDirectory,
};
