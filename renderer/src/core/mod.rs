//! Core business logic modules
//!
//! Navigation resolution, session validation and the generator supervisor
//! state machine. Nothing here talks to the network or spawns processes.

pub mod navigation;
pub mod session;
pub mod supervisor;

pub use navigation::{build_navigation, load_navigation, parse_workshop_config};
pub use session::{resolve_session, validate_session};
pub use supervisor::{LaunchPlan, Supervisor, SupervisorState};
