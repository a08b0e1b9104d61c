use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;
use toolz_config::{LlmSpec, ToolzConfigLoader};

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

#[test]
#[serial]
fn test_config_load() {
    let tmp = TempDir::new().unwrap();

    let file_yaml = r#"
version: "0.1"
proxies:
  - name: primary
    base: "https://relay.example/get?url="
  - name: backup
    base: "https://backup.example/"
    headers:
      x-requested-with: XMLHttpRequest
hydration:
  interval_ms: 250
  max_attempts: 8
llm:
  provider: gemini
  api_key: "${TOOLZ_TEST_GEMINI_KEY}"
  model: "gemini-1.5-pro"
  "#;
    let p = write_yaml(&tmp, "toolz.yaml", file_yaml);

    let config = temp_env::with_var("TOOLZ_TEST_GEMINI_KEY", Some("from-env"), || {
        ToolzConfigLoader::new()
            .with_file(&p)
            .load()
            .expect("load system config")
    });

    assert_eq!(config.version.as_deref(), Some("0.1"));
    assert_eq!(config.proxies.len(), 2);
    assert_eq!(config.proxies[1].name, "backup");
    assert_eq!(
        config.proxies[1]
            .headers
            .get("x-requested-with")
            .map(String::as_str),
        Some("XMLHttpRequest")
    );
    assert_eq!(config.hydration.interval_ms, 250);
    assert_eq!(config.hydration.max_attempts, 8);
    assert_eq!(config.hydration.min_text_len, 10);
    match config.llm {
        Some(LlmSpec::Gemini {
            api_key,
            model,
            endpoint,
        }) => {
            assert_eq!(api_key, "from-env");
            assert_eq!(model, "gemini-1.5-pro");
            assert_eq!(endpoint, toolz_config::DEFAULT_GEMINI_ENDPOINT);
        }
        None => panic!("expected llm section"),
    }
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "toolz.yaml", "hydration:\n  max_attempts: 8\n");

    let config = temp_env::with_var("TOOLZ__HYDRATION__MAX_ATTEMPTS", Some("3"), || {
        ToolzConfigLoader::new().with_file(&p).load().expect("load")
    });

    assert_eq!(config.hydration.max_attempts, 3);
}

#[test]
#[serial]
fn missing_optional_file_yields_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = ToolzConfigLoader::new()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .load()
        .expect("defaults");

    assert_eq!(config.proxies.len(), 3);
    assert!(config.hydration.enabled);
    assert_eq!(config.webdriver.url, "http://localhost:9515");
    assert!(config.llm.is_none());
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let result = ToolzConfigLoader::new()
        .with_file(tmp.path().join("absent.yaml"))
        .load();
    assert!(result.is_err());
}

#[test]
#[serial]
fn empty_proxy_list_fails_validation() {
    let result = ToolzConfigLoader::new()
        .with_yaml_str("proxies: []")
        .load();
    assert!(result.is_err());
}
