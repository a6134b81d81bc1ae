//! Workshop session resolution

use crate::error::{RendererError, RendererResult};
use crate::traits::SessionRegistry;
use crate::types::{SessionDescriptor, SessionRecord};

/// Check a fetched record against the proxy's workshop and portal
///
/// # Parameters
/// * `name` - Session name the record was fetched for
/// * `record` - Record as returned by the control plane
/// * `workshop` - Workshop this proxy serves
/// * `portal` - Portal this proxy belongs to
pub fn validate_session(name: &str, record: SessionRecord, workshop: &str, portal: &str) -> RendererResult<SessionDescriptor> {
    let spec = record.spec;

    if spec.workshop.name != workshop {
        return Err(RendererError::SessionMismatch {
            session: name.to_string(),
            field: "workshop",
            expected: workshop.to_string(),
            actual: spec.workshop.name,
        });
    }

    if spec.portal.name != portal {
        return Err(RendererError::SessionMismatch {
            session: name.to_string(),
            field: "portal",
            expected: portal.to_string(),
            actual: spec.portal.name,
        });
    }

    let password = spec.session.config.password;
    if password.is_empty() {
        return Err(RendererError::SessionIncomplete {
            session: name.to_string(),
            missing: "password",
        });
    }

    let url = record.status.educates.url;
    if url.is_empty() {
        return Err(RendererError::SessionIncomplete {
            session: name.to_string(),
            missing: "url",
        });
    }

    Ok(SessionDescriptor {
        name: name.to_string(),
        workshop: spec.workshop.name,
        portal: spec.portal.name,
        password,
        url,
    })
}

/// Fetch and validate a session in one step
pub async fn resolve_session<R>(registry: &R, name: &str, workshop: &str, portal: &str) -> RendererResult<SessionDescriptor>
where
    R: SessionRegistry + ?Sized,
{
    let record = registry.fetch_session(name).await?;
    validate_session(name, record, workshop, portal)
}
