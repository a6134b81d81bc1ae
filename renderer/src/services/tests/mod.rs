//! Service-specific tests
//!
//! Each service has its own test file; HTTP collaborators are stood up with
//! wiremock and filesystem work happens in temporary directories.


// Common test utilities for services
#[cfg(test)]
pub mod common {
    use crate::types::SessionDescriptor;

    /// Descriptor pointing at a mock session endpoint
    pub fn descriptor(url: &str, password: &str) -> SessionDescriptor {
        SessionDescriptor {
            name: "abc123".to_string(),
            workshop: "lab1".to_string(),
            portal: "main".to_string(),
            password: password.to_string(),
            url: url.to_string(),
        }
    }
}
