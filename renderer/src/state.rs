//! Proxy state management
//!
//! Everything that must only change inside the serialized session switch:
//! the name of the last session served, the generator supervisor and a count
//! of completed switches.

use crate::core::Supervisor;
use crate::types::LaunchPolicy;

#[derive(Debug)]
pub struct ProxyState {
    last_session: Option<String>,
    pub supervisor: Supervisor,
    switches: u64,
}

impl ProxyState {
    pub fn new(policy: LaunchPolicy) -> Self {
        Self {
            last_session: None,
            supervisor: Supervisor::new(policy),
            switches: 0,
        }
    }

    /// Whether `session` differs from the one the generator is configured for
    pub fn needs_switch(&self, session: &str) -> bool {
        self.last_session.as_deref() != Some(session)
    }

    /// Record a completed switch
    pub fn switched_to(&mut self, session: &str) {
        self.last_session = Some(session.to_string());
        self.switches += 1;
    }

    pub fn last_session(&self) -> Option<&str> {
        self.last_session.as_deref()
    }

    pub fn switch_count(&self) -> u64 {
        self.switches
    }
}

impl Default for ProxyState {
    fn default() -> Self {
        Self::new(LaunchPolicy::default())
    }
}
