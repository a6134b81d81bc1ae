//! Control-plane session lookup
//!
//! Reads `WorkshopSession` resources straight from the cluster API server.
//! Connection details come from explicit flags, a kubeconfig context, or the
//! service account mounted into the pod, in that order.

use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, StatusCode};
use std::path::{Path, PathBuf};

use crate::error::{RendererError, RendererResult};
use crate::services::kubeconfig::{default_kubeconfig_path, Kubeconfig};
use crate::traits::SessionRegistry;
use crate::types::SessionRecord;
use shared::{process_debug, ProcessId};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const SESSIONS_PATH: &str = "apis/training.educates.dev/v1beta1/workshopsessions";

/// PEM material held inline or in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PemSource {
    File(PathBuf),
    Inline(Vec<u8>),
}

impl PemSource {
    async fn read(&self, what: &str) -> RendererResult<Vec<u8>> {
        match self {
            PemSource::Inline(bytes) => Ok(bytes.clone()),
            PemSource::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| RendererError::config(format!("cannot read {what} {}: {e}", path.display()))),
        }
    }
}

/// How requests to the API server authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Anonymous,
    Token(String),
    TokenFile(PathBuf),
    ClientCertificate { certificate: PemSource, key: PemSource },
}

/// Command-line view of the cluster connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionArgs {
    pub api_server: Option<String>,
    pub token_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

/// Where and how to reach the cluster API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub api_server: String,
    pub credential: Credential,
    pub ca: Option<PemSource>,
    pub insecure_skip_tls_verify: bool,
}

impl RegistrySettings {
    /// Work out the connection from flags and the environment
    ///
    /// An explicit API server wins. Otherwise a kubeconfig is used: the one
    /// given, else `KUBECONFIG`, else `~/.kube/config`. Without any kubeconfig
    /// the in-cluster service account is used.
    pub async fn resolve(args: ConnectionArgs) -> RendererResult<Self> {
        if let Some(api_server) = args.api_server {
            return Ok(Self::explicit(api_server, args.token_file, args.ca_file));
        }

        let kubeconfig = args.kubeconfig.or_else(|| {
            default_kubeconfig_path(std::env::var_os("KUBECONFIG"), std::env::var_os("HOME").map(PathBuf::from))
        });

        if let Some(path) = kubeconfig {
            let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            return Kubeconfig::load(&path).await?.connection(args.context.as_deref(), &base_dir);
        }

        if let Some(context) = args.context {
            return Err(RendererError::config(format!("context {context} given but no kubeconfig found")));
        }

        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| RendererError::config("no kubeconfig found and KUBERNETES_SERVICE_HOST unset"))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        Ok(Self::explicit(in_cluster_server(&host, &port), args.token_file, args.ca_file))
    }

    /// Settings for a given server, defaulting credentials to the service account
    pub fn explicit(api_server: String, token_file: Option<PathBuf>, ca_file: Option<PathBuf>) -> Self {
        let account_dir = Path::new(SERVICE_ACCOUNT_DIR);
        let ca_file = ca_file.or_else(|| {
            let default = account_dir.join("ca.crt");
            default.exists().then_some(default)
        });

        Self {
            api_server,
            credential: Credential::TokenFile(token_file.unwrap_or_else(|| account_dir.join("token"))),
            ca: ca_file.map(PemSource::File),
            insecure_skip_tls_verify: false,
        }
    }
}

fn in_cluster_server(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

/// Session registry backed by the Kubernetes REST API
#[derive(Debug, Clone)]
pub struct KubernetesSessionRegistry {
    client: Client,
    api_server: String,
    token: Option<String>,
}

impl KubernetesSessionRegistry {
    /// Registry sending `token` as a bearer credential; an empty token sends none
    pub fn new(client: Client, api_server: impl Into<String>, token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            client,
            api_server: api_server.into(),
            token: (!token.is_empty()).then_some(token),
        }
    }

    /// Build a registry from settings, reading credentials and CA bundle
    pub async fn from_settings(settings: &RegistrySettings) -> RendererResult<Self> {
        let mut builder = Client::builder();

        if let Some(ca) = &settings.ca {
            let pem = ca.read("CA bundle").await?;
            let certificate =
                Certificate::from_pem(&pem).map_err(|e| RendererError::config(format!("invalid CA bundle: {e}")))?;
            builder = builder.add_root_certificate(certificate);
        }
        if settings.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let token = match &settings.credential {
            Credential::Anonymous => String::new(),
            Credential::Token(token) => token.clone(),
            Credential::TokenFile(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| RendererError::config(format!("cannot read token {}: {e}", path.display())))?,
            Credential::ClientCertificate { certificate, key } => {
                let certificate = certificate.read("client certificate").await?;
                let key = key.read("client key").await?;
                let identity = Identity::from_pkcs8_pem(&certificate, &key).map_err(|e| {
                    RendererError::config(format!("invalid client certificate or key (PKCS#8 PEM expected): {e}"))
                })?;
                builder = builder.identity(identity);
                String::new()
            }
        };

        let client = builder
            .build()
            .map_err(|e| RendererError::config(format!("cannot build API client: {e}")))?;

        Ok(Self::new(client, settings.api_server.clone(), token.trim()))
    }

    pub fn session_url(&self, session_name: &str) -> String {
        format!("{}/{SESSIONS_PATH}/{session_name}", self.api_server.trim_end_matches('/'))
    }
}

#[async_trait]
impl SessionRegistry for KubernetesSessionRegistry {
    async fn fetch_session(&self, session_name: &str) -> RendererResult<SessionRecord> {
        let request = self.client.get(self.session_url(session_name));
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| RendererError::lookup(session_name, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RendererError::SessionNotFound {
                session: session_name.to_string(),
            }),
            status if status.is_success() => {
                let record = response
                    .json::<SessionRecord>()
                    .await
                    .map_err(|e| RendererError::lookup(session_name, format!("undecodable record: {e}")))?;
                process_debug!(ProcessId::current(), "🔎 Fetched workshop session {}", session_name);
                Ok(record)
            }
            status => Err(RendererError::lookup(session_name, format!("API server returned {status}"))),
        }
    }
}
