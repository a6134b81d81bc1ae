//! Test fixtures and data for renderer tests

use renderer::{SessionRecord, SessionVariables};
use std::path::Path;
use tempfile::TempDir;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const SESSION: &'static str = "abc123";
    pub const OTHER_SESSION: &'static str = "def456";
    pub const WORKSHOP: &'static str = "lab1";
    pub const PORTAL: &'static str = "main";
    pub const PASSWORD: &'static str = "session-password";
    pub const SESSION_URL: &'static str = "https://abc123.lab1.example.com";
    pub const TOKEN: &'static str = "secret";

    pub const NAVIGATION_CONFIG: &'static str = r#"
pathways:
  default: basic
  paths:
    basic:
      title: Basic
      steps:
        - overview
    intro:
      title: Introduction
      steps:
        - step1
        - step2
  modules:
    step1:
      title: First Steps
    step2:
      title: Next Steps
"#;

    /// Record linking the standard session to the standard workshop/portal
    pub fn session_record() -> SessionRecord {
        SessionRecord::new(Self::WORKSHOP, Self::PORTAL, Self::PASSWORD, Self::SESSION_URL)
    }

    /// Variables selecting the `intro` pathway
    pub fn intro_variables() -> SessionVariables {
        let mut variables = SessionVariables::new();
        variables.insert("pathway_name".to_string(), "intro".to_string());
        variables.insert("session_namespace".to_string(), "lab1-w01-s001".to_string());
        variables
    }

    /// Workshop root with `workshop/config.yaml` and some content
    pub fn workshop_root() -> TempDir {
        let root = tempfile::tempdir().unwrap();
        Self::populate(root.path());
        root
    }

    fn populate(root: &Path) {
        std::fs::create_dir_all(root.join("workshop/content/step1")).unwrap();
        std::fs::create_dir_all(root.join(".git/refs")).unwrap();
        std::fs::write(root.join("workshop/config.yaml"), Self::NAVIGATION_CONFIG).unwrap();
        std::fs::write(root.join("workshop/content/step1/index.md"), "# First Steps").unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    }
}
