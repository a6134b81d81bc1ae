//! Session variables client

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::{RendererError, RendererResult};
use crate::traits::VariableSource;
use crate::types::{SessionDescriptor, SessionVariables};
use shared::{process_debug, ProcessId};

/// Fetches `{session url}/config/variables` over HTTP
#[derive(Debug, Clone, Default)]
pub struct RealVariableSource {
    client: Client,
}

impl RealVariableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Endpoint for a session, with the password as the `token` query value
    pub fn variables_url(session: &SessionDescriptor) -> RendererResult<Url> {
        let base = format!("{}/config/variables", session.url.trim_end_matches('/'));
        Url::parse_with_params(&base, &[("token", session.password.as_str())])
            .map_err(|e| RendererError::variables(format!("invalid session url {}: {e}", session.url)))
    }
}

#[async_trait]
impl VariableSource for RealVariableSource {
    async fn fetch_variables(&self, session: &SessionDescriptor) -> RendererResult<SessionVariables> {
        let url = Self::variables_url(session)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RendererError::variables(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RendererError::variables(format!("session endpoint returned {status}")));
        }

        let variables = response
            .json::<SessionVariables>()
            .await
            .map_err(|e| RendererError::variables(format!("unexpected response body: {e}")))?;

        process_debug!(
            ProcessId::current(),
            "📥 Fetched {} variables for session {}",
            variables.len(),
            session.name
        );
        Ok(variables)
    }
}
