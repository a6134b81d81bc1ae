//! Renderer domain types
//!
//! Session records as delivered by the control plane, the navigation model read
//! from the workshop, and the generator configuration written for the content
//! subprocess.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Header carrying the visiting session name
pub const SESSION_NAME_HEADER: &str = "x-session-name";

/// Header carrying the static access token
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Parameter holding the identifier of the first page of the active pathway
pub const FIRST_PAGE_PARAM: &str = "__first_page__";

/// Parameter holding the active module map
pub const MODULES_PARAM: &str = "__modules__";

/// Variable that selects a pathway for the session
pub const PATHWAY_NAME_VARIABLE: &str = "pathway_name";

/// Per-session parameters, ordered so generated configuration is stable
pub type SessionVariables = BTreeMap<String, String>;

/// Workshop session resource as served by the control plane
///
/// Only the fields needed for routing are decoded; anything absent decodes
/// as an empty string so validation can report exactly what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecord {
    pub spec: SessionRecordSpec,
    pub status: SessionRecordStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecordSpec {
    pub workshop: NamedRef,
    pub portal: NamedRef,
    pub session: SessionSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub config: SessionConfigSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfigSection {
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecordStatus {
    pub educates: EducatesStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducatesStatus {
    pub url: String,
}

impl SessionRecord {
    /// Build a record from its routing fields
    pub fn new(workshop: &str, portal: &str, password: &str, url: &str) -> Self {
        Self {
            spec: SessionRecordSpec {
                workshop: NamedRef { name: workshop.to_string() },
                portal: NamedRef { name: portal.to_string() },
                session: SessionSection {
                    config: SessionConfigSection {
                        password: password.to_string(),
                    },
                },
            },
            status: SessionRecordStatus {
                educates: EducatesStatus { url: url.to_string() },
            },
        }
    }
}

/// Validated workshop session, produced only by the session resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub name: String,
    pub workshop: String,
    pub portal: String,
    pub password: String,
    pub url: String,
}

/// User-authored workshop configuration (`workshop/config.yaml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkshopConfig {
    pub pathways: PathwaysConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathwaysConfig {
    pub default: String,
    pub paths: BTreeMap<String, PathwayConfig>,
    pub modules: BTreeMap<String, ModuleConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathwayConfig {
    pub title: String,
    pub description: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub title: String,
    pub description: String,
}

/// One step of the active pathway with its neighbours
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveModule {
    pub title: String,
    pub path: String,
    pub prev_page: String,
    pub next_page: String,
    pub step: usize,
}

/// Navigation resolved for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    pub pathway: Option<String>,
    pub first_page: String,
    pub modules: BTreeMap<String, ActiveModule>,
}

/// Parameter block of the generator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    #[serde(flatten)]
    pub values: BTreeMap<String, String>,
    #[serde(rename = "__modules__", default)]
    pub modules: BTreeMap<String, ActiveModule>,
}

/// Configuration document consumed by the content generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub params: GeneratorParams,
}

impl GeneratorConfig {
    /// Combine session parameters and navigation into a generator document
    pub fn new(session_url: &str, mut values: SessionVariables, navigation: Navigation) -> Self {
        values.insert(FIRST_PAGE_PARAM.to_string(), navigation.first_page);
        values.remove(MODULES_PARAM);

        Self {
            base_url: format!("{}/workshop/content/", session_url.trim_end_matches('/')),
            params: GeneratorParams {
                values,
                modules: navigation.modules,
            },
        }
    }
}

/// Retry policy for generator launches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchPolicy {
    /// Consecutive failed launches allowed before giving up; `None` is unlimited
    pub max_attempts: Option<u32>,
    /// Minimum time between a failed launch and the next attempt
    pub backoff: Duration,
}

/// How to run the content generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub binary: String,
    pub port: u16,
    pub themes_dir: Option<PathBuf>,
    pub theme: String,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            binary: "hugo".to_string(),
            port: 1313,
            themes_dir: None,
            theme: "educates".to_string(),
        }
    }
}

/// Runtime configuration of the live content proxy
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub workshop_root: PathBuf,
    pub workshop_name: String,
    pub portal_name: String,
    pub access_token: Option<String>,
    pub generator: GeneratorSettings,
    pub warmup: Duration,
    pub reload_delay: Duration,
    pub launch_policy: LaunchPolicy,
    pub serve_files: bool,
}

impl ProxySettings {
    pub fn new(workshop_root: impl Into<PathBuf>, workshop_name: &str, portal_name: &str) -> Self {
        Self {
            workshop_root: workshop_root.into(),
            workshop_name: workshop_name.to_string(),
            portal_name: portal_name.to_string(),
            access_token: None,
            generator: GeneratorSettings::default(),
            warmup: Duration::from_secs(4),
            reload_delay: Duration::from_secs(2),
            launch_policy: LaunchPolicy::default(),
            serve_files: false,
        }
    }

    /// Directory holding the workshop content and its `config.yaml`
    pub fn workshop_dir(&self) -> PathBuf {
        workshop_dir(&self.workshop_root)
    }

    /// Local address the generator serves on
    pub fn generator_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.generator.port))
    }

    /// Check a presented token against the configured one
    pub fn token_matches(&self, presented: Option<&str>) -> bool {
        match self.access_token.as_deref() {
            None | Some("") => true,
            Some(expected) => presented == Some(expected),
        }
    }
}

/// Content directory below a workshop root
pub fn workshop_dir(root: &Path) -> PathBuf {
    root.join("workshop")
}
