//! File-based tests for multi-format configuration loading

#[cfg(test)]
mod integration_tests {
    use crate::config::*;
    use serde::Deserialize;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Registry {
        models: Vec<Model>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Model {
        model_id: String,
        provider: String,
        endpoint: Option<String>,
        api_key: Option<String>,
    }

    fn create_test_file(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
        let path = dir.path().join(filename);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_yaml_and_toml_load_the_same_registry() {
        let temp_dir = TempDir::new().unwrap();

        let yaml = r#"
models:
  - model_id: granite
    provider: watsonx
    endpoint: https://watsonx.example/v1/generate
  - model_id: local
    provider: local
"#;
        let toml = r#"
[[models]]
model_id = "granite"
provider = "watsonx"
endpoint = "https://watsonx.example/v1/generate"

[[models]]
model_id = "local"
provider = "local"
"#;
        let yaml_path = create_test_file(&temp_dir, "registry.yml", yaml);
        let toml_path = create_test_file(&temp_dir, "registry.toml", toml);

        let from_yaml: Registry = load_config(yaml_path.to_str().unwrap()).unwrap();
        let from_toml: Registry = load_config(toml_path.to_str().unwrap()).unwrap();

        assert_eq!(from_yaml, from_toml);
        assert_eq!(from_yaml.models.len(), 2);
        assert_eq!(from_yaml.models[1].endpoint, None);
    }

    #[test]
    fn test_env_substitution_in_file() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: test-local variable name, not read concurrently elsewhere.
        unsafe { std::env::set_var("VERITAS_TEST_WATSONX_KEY", "sk-test-123") };

        let yaml = r#"
models:
  - model_id: granite
    provider: watsonx
    api_key: ${VERITAS_TEST_WATSONX_KEY}
"#;
        let path = create_test_file(&temp_dir, "registry.yaml", yaml);
        let registry: Registry = load_config(path.to_str().unwrap()).unwrap();

        assert_eq!(registry.models[0].api_key.as_deref(), Some("sk-test-123"));
        unsafe { std::env::remove_var("VERITAS_TEST_WATSONX_KEY") };
    }

    #[test]
    fn test_load_merged_overrides_scalars() {
        #[derive(Debug, Deserialize)]
        struct Scorer {
            threshold: f64,
            name: String,
        }

        let temp_dir = TempDir::new().unwrap();
        let base = create_test_file(&temp_dir, "base.toml", "threshold = 0.7\nname = \"base\"\n");
        let local = create_test_file(&temp_dir, "local.json", r#"{ "threshold": 0.85 }"#);

        let merged: Scorer =
            load_merged(&[base.to_str().unwrap(), local.to_str().unwrap()]).unwrap();
        assert_eq!(merged.threshold, 0.85);
        assert_eq!(merged.name, "base");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config::<Registry>("/definitely/not/here/veritas.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_file(&temp_dir, "broken.json", "{ not json");
        let err = load_config::<Registry>(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
