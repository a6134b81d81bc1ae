//! Generator configuration writer
//!
//! The generator watches `hugo.yaml` and reloads whenever it changes, so the
//! file is replaced by rename and never observed half written.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{RendererError, RendererResult};
use crate::traits::ConfigWriter;
use crate::types::GeneratorConfig;
use shared::{process_debug, ProcessId};

pub const CONFIG_FILE_NAME: &str = "hugo.yaml";

/// Writes the generator configuration into a working directory
#[derive(Debug, Clone)]
pub struct RealConfigWriter {
    target_dir: PathBuf,
}

impl RealConfigWriter {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        self.target_dir.join(format!("{CONFIG_FILE_NAME}.tmp"))
    }

    async fn write_and_swap(&self, contents: &[u8], temp: &Path, live: &Path) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(temp).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(temp, live).await
    }
}

#[async_trait]
impl ConfigWriter for RealConfigWriter {
    async fn write_config(&self, config: &GeneratorConfig) -> RendererResult<PathBuf> {
        let live = self.config_path();
        let temp = self.temp_path();

        let contents = serde_yaml::to_string(config).map_err(|e| RendererError::ConfigWriteFailed {
            path: live.display().to_string(),
            message: e.to_string(),
        })?;

        if let Err(e) = self.write_and_swap(contents.as_bytes(), &temp, &live).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(RendererError::ConfigWriteFailed {
                path: live.display().to_string(),
                message: e.to_string(),
            });
        }

        process_debug!(ProcessId::current(), "📝 Wrote generator config {}", live.display());
        Ok(live)
    }

    fn config_path(&self) -> PathBuf {
        self.target_dir.join(CONFIG_FILE_NAME)
    }
}
