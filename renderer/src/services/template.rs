//! Workshop definition templating through an external program

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{RendererError, RendererResult};
use crate::traits::TemplateEngine;

/// Pipes the definition through `<program> -f - --data-value k=v ...`
#[derive(Debug, Clone)]
pub struct CommandTemplateEngine {
    program: String,
}

impl CommandTemplateEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub fn args(data_values: &[(String, String)]) -> Vec<String> {
        let mut args = vec!["-f".to_string(), "-".to_string()];
        for (key, value) in data_values {
            args.push("--data-value".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }
}

impl Default for CommandTemplateEngine {
    fn default() -> Self {
        Self::new("ytt")
    }
}

#[async_trait]
impl TemplateEngine for CommandTemplateEngine {
    async fn expand(&self, raw: &[u8], data_values: &[(String, String)]) -> RendererResult<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(Self::args(data_values))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RendererError::TemplateFailed {
                message: format!("failed to run {}: {e}", self.program),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(raw).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RendererError::TemplateFailed {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
