//! Kubeconfig reading
//!
//! Resolves one context of a kubeconfig file into the API server address,
//! trust anchors and client credential the session registry connects with.
//! Relative file references resolve against the kubeconfig's directory.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{RendererError, RendererResult};
use crate::services::session_registry::{Credential, PemSource, RegistrySettings};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Kubeconfig {
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    pub current_context: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,
    pub certificate_authority: Option<PathBuf>,
    pub certificate_authority_data: Option<String>,
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserEntry {
    pub token: Option<String>,
    #[serde(rename = "tokenFile")]
    pub token_file: Option<PathBuf>,
    pub client_certificate: Option<PathBuf>,
    pub client_certificate_data: Option<String>,
    pub client_key: Option<PathBuf>,
    pub client_key_data: Option<String>,
    pub exec: Option<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

impl Kubeconfig {
    pub fn parse(text: &str, source: &Path) -> RendererResult<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| RendererError::config(format!("invalid kubeconfig {}: {e}", source.display())))
    }

    pub async fn load(path: &Path) -> RendererResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RendererError::config(format!("cannot read kubeconfig {}: {e}", path.display())))?;
        Self::parse(&text, path)
    }

    /// Connection settings for `context`, or the current context when `None`
    ///
    /// # Parameters
    /// * `context` - Context name to select instead of `current-context`
    /// * `base_dir` - Directory relative file references resolve against
    pub fn connection(&self, context: Option<&str>, base_dir: &Path) -> RendererResult<RegistrySettings> {
        let name = context.unwrap_or(&self.current_context);
        if name.is_empty() {
            return Err(RendererError::config("kubeconfig has no current context and none was given"));
        }

        let context = self
            .contexts
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.context)
            .ok_or_else(|| RendererError::config(format!("context {name} not found in kubeconfig")))?;

        let cluster = self
            .clusters
            .iter()
            .find(|entry| entry.name == context.cluster)
            .map(|entry| &entry.cluster)
            .ok_or_else(|| RendererError::config(format!("cluster {} not found in kubeconfig", context.cluster)))?;

        if cluster.server.is_empty() {
            return Err(RendererError::config(format!("cluster {} has no server", context.cluster)));
        }

        let credential = match self.users.iter().find(|entry| entry.name == context.user) {
            Some(entry) => user_credential(&entry.user, &context.user, base_dir)?,
            None => Credential::Anonymous,
        };

        let ca = pem_source(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base_dir,
            "certificate-authority-data",
        )?;

        Ok(RegistrySettings {
            api_server: cluster.server.clone(),
            credential,
            ca,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }
}

fn user_credential(user: &UserEntry, name: &str, base_dir: &Path) -> RendererResult<Credential> {
    if let Some(token) = user.token.as_deref().filter(|token| !token.is_empty()) {
        return Ok(Credential::Token(token.to_string()));
    }
    if let Some(token_file) = &user.token_file {
        return Ok(Credential::TokenFile(base_dir.join(token_file)));
    }

    let certificate = pem_source(
        user.client_certificate_data.as_deref(),
        user.client_certificate.as_deref(),
        base_dir,
        "client-certificate-data",
    )?;
    let key = pem_source(user.client_key_data.as_deref(), user.client_key.as_deref(), base_dir, "client-key-data")?;

    match (certificate, key) {
        (Some(certificate), Some(key)) => Ok(Credential::ClientCertificate { certificate, key }),
        (None, None) if user.exec.is_some() => Err(RendererError::config(format!(
            "user {name} uses an exec credential plugin, which is not supported"
        ))),
        (None, None) => Ok(Credential::Anonymous),
        _ => Err(RendererError::config(format!(
            "user {name} needs both a client certificate and a client key"
        ))),
    }
}

fn pem_source(data: Option<&str>, file: Option<&Path>, base_dir: &Path, field: &str) -> RendererResult<Option<PemSource>> {
    if let Some(data) = data.filter(|data| !data.is_empty()) {
        let decoded = BASE64
            .decode(data.trim())
            .map_err(|e| RendererError::config(format!("invalid {field} in kubeconfig: {e}")))?;
        return Ok(Some(PemSource::Inline(decoded)));
    }
    Ok(file.map(|file| PemSource::File(base_dir.join(file))))
}

/// Kubeconfig to use when none is named explicitly
///
/// The first entry of `KUBECONFIG` wins, then `~/.kube/config` if it exists.
pub fn default_kubeconfig_path(kubeconfig_env: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    let from_env = kubeconfig_env
        .as_deref()
        .and_then(|value| std::env::split_paths(value).find(|path| !path.as_os_str().is_empty()));
    if from_env.is_some() {
        return from_env;
    }

    home.map(|home| home.join(".kube").join("config")).filter(|path| path.exists())
}
