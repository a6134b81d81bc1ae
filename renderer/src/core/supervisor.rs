//! Generator supervisor state machine
//!
//! Tracks whether the content generator has been started and decides, on
//! every session switch, whether the switch must launch it or only wait for
//! it to pick up the rewritten configuration. Only ever driven from inside
//! the proxy's serialized switch section.

use std::time::{Duration, Instant};

use crate::error::{RendererError, RendererResult};
use crate::types::LaunchPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Starting,
    Running { pid: u32 },
    Failed { attempts: u32, reason: String },
}

/// What a session switch has to do with the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPlan {
    /// Spawn the generator and wait for it to warm up
    Launch,
    /// Generator is running; wait for its watcher to reload
    Reload,
}

#[derive(Debug)]
pub struct Supervisor {
    state: SupervisorState,
    policy: LaunchPolicy,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl Supervisor {
    pub fn new(policy: LaunchPolicy) -> Self {
        Self {
            state: SupervisorState::NotStarted,
            policy,
            consecutive_failures: 0,
            last_failure: None,
        }
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SupervisorState::Running { .. })
    }

    /// Decide what the current switch does with the generator
    ///
    /// # Parameters
    /// * `alive` - Whether the launched child is still running
    /// * `now` - Current time, compared against the retry backoff
    ///
    /// # Returns
    /// The plan, or `GeneratorLaunchFailed` when the launch policy forbids
    /// another attempt right now
    pub fn plan(&mut self, alive: bool, now: Instant) -> RendererResult<LaunchPlan> {
        if let SupervisorState::Running { pid } = self.state {
            if alive {
                return Ok(LaunchPlan::Reload);
            }
            self.state = SupervisorState::Failed {
                attempts: self.consecutive_failures,
                reason: format!("generator process {pid} exited"),
            };
        }

        if let Some(max) = self.policy.max_attempts {
            if self.consecutive_failures >= max {
                return Err(RendererError::launch(format!(
                    "launch attempts exhausted after {} failures",
                    self.consecutive_failures
                )));
            }
        }

        if let Some(remaining) = self.backoff_remaining(now) {
            return Err(RendererError::launch(format!(
                "retry backoff active for another {}ms",
                remaining.as_millis()
            )));
        }

        self.state = SupervisorState::Starting;
        Ok(LaunchPlan::Launch)
    }

    /// Record a successful spawn
    pub fn launch_succeeded(&mut self, pid: u32) {
        self.state = SupervisorState::Running { pid };
        self.consecutive_failures = 0;
        self.last_failure = None;
    }

    /// Record a failed spawn
    pub fn launch_failed(&mut self, reason: impl Into<String>, now: Instant) {
        self.consecutive_failures += 1;
        self.last_failure = Some(now);
        self.state = SupervisorState::Failed {
            attempts: self.consecutive_failures,
            reason: reason.into(),
        };
    }

    fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        let failed_at = self.last_failure?;
        let ready_at = failed_at + self.policy.backoff;
        if now < ready_at {
            Some(ready_at - now)
        } else {
            None
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(LaunchPolicy::default())
    }
}
