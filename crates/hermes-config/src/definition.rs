//! Flow definition documents.
//!
//! API and organization definitions are JSON or YAML files, chosen by
//! extension. A loaded pair compiles into a [`Deployment`].

use hermes_flow::{ApiDefinition, Deployment, OrganizationDefinition};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::ConfigError;

/// Reads an API definition.
///
/// # Example
///
/// ```no_run
/// let api = hermes_config::load_api_definition("api.yaml")?;
/// println!("{} declares {} flows", api.id, api.flows.len());
/// # Ok::<(), hermes_config::ConfigError>(())
/// ```
///
/// # Errors
///
/// Fails if the file is missing, unreadable, malformed or has an extension
/// other than `.json`, `.yaml` or `.yml`.
pub fn load_api_definition<P: AsRef<Path>>(path: P) -> Result<ApiDefinition, ConfigError> {
    load_document(path.as_ref())
}

/// Reads an organization definition.
///
/// # Errors
///
/// Fails like [`load_api_definition`].
pub fn load_organization_definition<P: AsRef<Path>>(
    path: P,
) -> Result<OrganizationDefinition, ConfigError> {
    load_document(path.as_ref())
}

/// Reads and compiles the definitions of one deployment.
///
/// # Errors
///
/// Fails if either file cannot be loaded or the API definition is refused,
/// for instance when a plan id is declared twice.
pub fn load_deployment(
    api_path: &Path,
    organization_path: Option<&Path>,
) -> Result<Deployment, ConfigError> {
    let api = load_api_definition(api_path)?;
    let organization = organization_path
        .map(load_organization_definition)
        .transpose()?;

    let deployment = Deployment::new(api, organization)
        .map_err(|e| ConfigError::invalid_definition(api_path, e.to_string()))?;
    tracing::info!(
        api = %deployment.api_id(),
        path = %api_path.display(),
        flows = deployment.api_flows().len(),
        "flow definition loaded"
    );
    Ok(deployment)
}

fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::file_not_found(path));
    }
    let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match extension.as_deref() {
        Some("json") => Ok(serde_json::from_str(&content)?),
        Some("yaml" | "yml") => Ok(serde_yaml::from_str(&content)?),
        _ => Err(ConfigError::validation_error(format!(
            "unsupported definition format: {}",
            path.display()
        ))),
    }
}
