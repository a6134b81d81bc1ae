//! Shared types for the workshop renderer
//!
//! Holds the process identity, logging setup and the error type used by
//! every crate in the workspace.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
