//! Service implementations
//!
//! Real implementations of the service traits. These do the actual network,
//! filesystem and process work.

pub mod archive;
pub mod config_writer;
pub mod generator;
pub mod kubeconfig;
pub mod session_registry;
pub mod template;
pub mod variable_fetcher;
pub mod workspace;

#[cfg(test)]
pub mod tests;

pub use archive::{stream_archive, write_archive};
pub use config_writer::{RealConfigWriter, CONFIG_FILE_NAME};
pub use generator::RealGeneratorLauncher;
pub use kubeconfig::Kubeconfig;
pub use session_registry::{ConnectionArgs, Credential, KubernetesSessionRegistry, PemSource, RegistrySettings};
pub use template::CommandTemplateEngine;
pub use variable_fetcher::RealVariableSource;
pub use workspace::{CleanupHook, Teardown, WorkingDirectory};
