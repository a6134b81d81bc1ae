//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Global process identity, set once by the binary entry point
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Identity of the running process, attached to every log event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// Long-running live content proxy
    Proxy,
    /// One-shot static export
    Export,
}

impl ProcessId {
    /// Initialize the global process ID for the live proxy
    pub fn init_proxy() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Proxy)
    }

    /// Initialize the global process ID for a static export run
    pub fn init_export() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Export)
    }

    /// Get the global process ID, falling back to the default when no
    /// entry point has initialized it (library use and tests)
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get_or_init(ProcessId::default)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Proxy => write!(f, "proxy"),
            ProcessId::Export => write!(f, "export"),
        }
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        ProcessId::Proxy
    }
}
