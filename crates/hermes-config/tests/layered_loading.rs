//! Loading configuration and definitions from real files.

use hermes_config::{load_deployment, ConfigError, ConfigLoader, HermesConfig};
use hermes_flow::FlowMode;
use std::fs;
use tempfile::TempDir;

#[test]
fn toml_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hermes.toml");
    fs::write(
        &path,
        r#"
        [flows]
        mode = "best_match"
        plan_match_required = true

        [telemetry.metrics]
        enabled = false
        "#,
    )
    .unwrap();

    let config = ConfigLoader::new().with_file(&path).unwrap().load().unwrap();

    assert_eq!(config.flows.mode, FlowMode::BestMatch);
    assert!(config.flows.plan_match_required);
    assert!(!config.telemetry.metrics.enabled);
    assert_eq!(config.deployment.debounce_ms, 500);
}

#[test]
fn json_file_with_unknown_section_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hermes.json");
    fs::write(&path, r#"{"gateway": {}, "cache": {"size": 10}}"#).unwrap();

    let result = ConfigLoader::new().with_file(&path);

    assert!(matches!(result, Err(ConfigError::JsonError(_))));
}

#[test]
fn file_values_are_validated_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hermes.toml");
    fs::write(&path, "[deployment]\ndebounce_ms = 0").unwrap();

    let loader = ConfigLoader::new().with_file(&path).unwrap();
    let unvalidated: HermesConfig = ConfigLoader::new().with_file(&path).unwrap().load_unvalidated();

    assert!(loader.load().is_err());
    assert_eq!(unvalidated.deployment.debounce_ms, 0);
}

#[test]
fn configured_definitions_compile_into_a_deployment() {
    let dir = TempDir::new().unwrap();
    let api = dir.path().join("api.yaml");
    fs::write(
        &api,
        r#"
id: petstore
flows:
  - name: pets
    selectors:
      - type: PATH
        path: /pets/:id
        operator: PREFIX
    request:
      - policy: api-key
plans:
  - id: free
    flows:
      - name: throttle
        request:
          - policy: rate-limit
            configuration: { limit: 5 }
"#,
    )
    .unwrap();
    let config_path = dir.path().join("hermes.toml");
    fs::write(
        &config_path,
        format!("[deployment]\ndefinitions_path = {:?}\n", api.display().to_string()),
    )
    .unwrap();

    let config = ConfigLoader::new().with_file(&config_path).unwrap().load().unwrap();
    let definitions = config.deployment.definitions_path.as_deref().unwrap();
    let deployment = load_deployment(definitions, None).unwrap();

    assert_eq!(deployment.api_id(), "petstore");
    assert_eq!(deployment.api_flows()[0].request[0].policy, "api-key");
    assert_eq!(deployment.plan_flows("free")[0].name, "throttle");
}
