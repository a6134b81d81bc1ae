//! Pathway navigation
//!
//! Turns the workshop's `config.yaml` and the session's variables into the
//! ordered set of modules the generator links together.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{RendererError, RendererResult};
use crate::types::{ActiveModule, Navigation, PathwayConfig, SessionVariables, WorkshopConfig, PATHWAY_NAME_VARIABLE};

/// Parse the workshop navigation config
///
/// Empty or whitespace-only documents decode to the default config.
pub fn parse_workshop_config(text: &str, path: &Path) -> RendererResult<WorkshopConfig> {
    if text.trim().is_empty() {
        return Ok(WorkshopConfig::default());
    }

    serde_yaml::from_str::<Option<WorkshopConfig>>(text)
        .map(Option::unwrap_or_default)
        .map_err(|e| RendererError::NavigationConfigInvalid {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Read `config.yaml` from the workshop directory and resolve navigation
///
/// # Parameters
/// * `workshop_dir` - Directory holding the workshop content
/// * `variables` - Session variables, possibly naming a pathway
///
/// # Returns
/// Navigation for the selected pathway, or an empty navigation when the file
/// is absent or declares no usable pathway
pub async fn load_navigation(workshop_dir: &Path, variables: &SessionVariables) -> RendererResult<Navigation> {
    let path = workshop_dir.join("config.yaml");

    let config = match tokio::fs::read_to_string(&path).await {
        Ok(text) => parse_workshop_config(&text, &path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => WorkshopConfig::default(),
        Err(e) => {
            return Err(RendererError::NavigationConfigInvalid {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        }
    };

    Ok(build_navigation(&config, variables))
}

/// Select the active pathway and link its steps
pub fn build_navigation(config: &WorkshopConfig, variables: &SessionVariables) -> Navigation {
    let Some((name, pathway)) = select_pathway(config, variables) else {
        return Navigation::default();
    };

    let steps = &pathway.steps;
    let mut modules = BTreeMap::new();

    for (index, step) in steps.iter().enumerate() {
        let title = config
            .pathways
            .modules
            .get(step)
            .map(|module| module.title.clone())
            .unwrap_or_default();

        let prev_page = if index > 0 { steps[index - 1].clone() } else { String::new() };
        let next_page = steps.get(index + 1).cloned().unwrap_or_default();

        // Later duplicates overwrite earlier ones
        modules.insert(
            step.clone(),
            ActiveModule {
                title,
                path: step.clone(),
                prev_page,
                next_page,
                step: index + 1,
            },
        );
    }

    Navigation {
        pathway: Some(name.to_string()),
        first_page: steps.first().cloned().unwrap_or_default(),
        modules,
    }
}

fn select_pathway<'a>(config: &'a WorkshopConfig, variables: &SessionVariables) -> Option<(&'a str, &'a PathwayConfig)> {
    let usable = |name: &str| {
        config
            .pathways
            .paths
            .get_key_value(name)
            .filter(|(_, pathway)| !pathway.steps.is_empty())
            .map(|(key, pathway)| (key.as_str(), pathway))
    };

    variables
        .get(PATHWAY_NAME_VARIABLE)
        .and_then(|name| usable(name.as_str()))
        .or_else(|| usable(config.pathways.default.as_str()))
}
