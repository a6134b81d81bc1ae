//! Static export of a workshop
//!
//! Renders the workshop once, without any session, and packs the generated
//! site into a ZIP file.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::core::load_navigation;
use crate::error::{RendererError, RendererResult};
use crate::services::{RealConfigWriter, WorkingDirectory};
use crate::traits::{BuildRequest, ConfigWriter, GeneratorLauncher, TemplateEngine};
use crate::types::{workshop_dir, GeneratorConfig, SessionVariables};
use shared::logging::log_progress;
use shared::{process_debug, ProcessId};

const WORKSHOP_API_VERSION: &str = "training.educates.dev/v1beta1";
const WORKSHOP_KIND: &str = "Workshop";
const ASSETS_PATH: &str = "/static";

/// Settings for one static export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub workshop_root: PathBuf,
    /// Workshop definition, relative to the root unless absolute
    pub workshop_file: PathBuf,
    pub image_repository: String,
    pub workshop_version: String,
    pub data_values: Vec<(String, String)>,
    pub output_file: PathBuf,
}

impl ExportOptions {
    pub fn new(workshop_root: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            workshop_root: workshop_root.into(),
            workshop_file: PathBuf::from("resources/workshop.yaml"),
            image_repository: "localhost:5001".to_string(),
            workshop_version: "latest".to_string(),
            data_values: Vec::new(),
            output_file: output_file.into(),
        }
    }

    pub fn definition_path(&self) -> PathBuf {
        if self.workshop_file.is_absolute() {
            self.workshop_file.clone()
        } else {
            self.workshop_root.join(&self.workshop_file)
        }
    }
}

/// Parse a `key=value` data value
pub fn parse_data_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

/// A validated `Workshop` resource
#[derive(Debug, Clone, PartialEq)]
pub struct WorkshopDefinition {
    document: Value,
}

impl WorkshopDefinition {
    /// Parse and check the resource type
    pub fn parse(text: &str) -> RendererResult<Self> {
        let document: Value = serde_yaml::from_str(text).map_err(|e| RendererError::WorkshopDefinitionInvalid {
            message: format!("couldn't parse workshop definition: {e}"),
        })?;

        let api_version = document.get("apiVersion").and_then(Value::as_str);
        let kind = document.get("kind").and_then(Value::as_str);

        if api_version != Some(WORKSHOP_API_VERSION) || kind != Some(WORKSHOP_KIND) {
            return Err(RendererError::WorkshopDefinitionInvalid {
                message: "invalid type for workshop definition".to_string(),
            });
        }

        Ok(Self { document })
    }

    /// Pin the version when one is being published and drop publish details
    pub fn normalize(&mut self, version: &str) {
        let Some(spec) = self.document.get_mut("spec").and_then(Value::as_mapping_mut) else {
            return;
        };

        if version != "latest" && !spec.contains_key("version") {
            spec.insert(Value::from("version"), Value::from(version));
        }
        spec.remove("publish");
    }

    pub fn title(&self) -> &str {
        self.spec_str("title")
    }

    pub fn description(&self) -> &str {
        self.spec_str("description")
    }

    pub fn version(&self) -> Option<&str> {
        self.spec().and_then(|spec| spec.get("version")).and_then(Value::as_str)
    }

    pub fn has_publish(&self) -> bool {
        self.spec().is_some_and(|spec| spec.contains_key("publish"))
    }

    fn spec(&self) -> Option<&Mapping> {
        self.document.get("spec").and_then(Value::as_mapping)
    }

    fn spec_str(&self, key: &str) -> &str {
        self.spec()
            .and_then(|spec| spec.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Outcome of an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub output_file: PathBuf,
    pub title: String,
    pub files: usize,
}

/// Renders a workshop to a ZIP of static HTML
pub struct StaticExporter<T, L> {
    templates: T,
    launcher: L,
}

impl<T, L> StaticExporter<T, L>
where
    T: TemplateEngine,
    L: GeneratorLauncher,
{
    pub fn new(templates: T, launcher: L) -> Self {
        Self { templates, launcher }
    }

    /// Run the whole export in a fresh working directory
    pub async fn export(&self, options: &ExportOptions) -> RendererResult<ExportReport> {
        let mut workdir = WorkingDirectory::create()?;
        let result = self.export_into(options, workdir.path()).await;

        if let Err(e) = workdir.remove() {
            process_debug!(ProcessId::current(), "⚠️ Failed to remove working directory: {}", e);
        }
        result
    }

    async fn export_into(&self, options: &ExportOptions, workdir: &Path) -> RendererResult<ExportReport> {
        let definition_path = options.definition_path();
        let raw = tokio::fs::read(&definition_path).await.map_err(|e| {
            RendererError::export(format!("cannot open workshop definition {}: {e}", definition_path.display()))
        })?;

        log_progress(ProcessId::current(), "Expanding", &definition_path.display().to_string());
        let expanded = self.templates.expand(&raw, &options.data_values).await?;

        let text = String::from_utf8_lossy(&expanded)
            .replace("$(image_repository)", &options.image_repository)
            .replace("$(workshop_version)", &options.workshop_version);

        let mut definition = WorkshopDefinition::parse(&text)?;
        definition.normalize(&options.workshop_version);

        let mut params = SessionVariables::new();
        params.insert("workshop_title".to_string(), definition.title().to_string());
        params.insert("workshop_description".to_string(), definition.description().to_string());
        params.insert("assets_path".to_string(), ASSETS_PATH.to_string());

        let source_dir = workshop_dir(&options.workshop_root);
        let navigation = load_navigation(&source_dir, &params).await?;

        let writer = RealConfigWriter::new(workdir);
        let config_path = writer
            .write_config(&GeneratorConfig::new("", params, navigation))
            .await?;

        let public_dir = workdir.join("public");
        log_progress(ProcessId::current(), "Building", &definition.title().to_string());
        self.launcher
            .build_static(&BuildRequest {
                source_dir,
                config_path,
                destination: public_dir.clone(),
            })
            .await?;

        let output_file = options.output_file.clone();
        let target = output_file.clone();
        let files = tokio::task::spawn_blocking(move || zip_directory(&public_dir, &target))
            .await
            .map_err(|e| RendererError::export(format!("zip task failed: {e}")))??;

        Ok(ExportReport {
            output_file,
            title: definition.title().to_string(),
            files,
        })
    }
}

/// Zip every file below `source`, named relative to it
///
/// # Returns
/// Number of files written
pub fn zip_directory(source: &Path, output_file: &Path) -> RendererResult<usize> {
    let file = File::create(output_file)
        .map_err(|e| RendererError::export(format!("unable to create ZIP file {}: {e}", output_file.display())))?;

    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut files = Vec::new();
    collect_files(source, Path::new(""), &mut files)?;
    files.sort();

    for relative in &files {
        let name = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options)
            .map_err(|e| RendererError::export(format!("unable to add {}: {e}", relative.display())))?;
        let mut input = File::open(source.join(relative))?;
        io::copy(&mut input, &mut zip)?;
    }

    zip.finish()
        .map_err(|e| RendererError::export(format!("unable to close ZIP file: {e}")))?;
    Ok(files.len())
}

fn collect_files(root: &Path, relative: &Path, files: &mut Vec<PathBuf>) -> RendererResult<()> {
    for entry in std::fs::read_dir(root.join(relative))? {
        let entry = entry?;
        let path = relative.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}
