use std::io::Write;

use aiflow_core::config::AppConfig;
use aiflow_core::error::AiflowError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_steps = 12
embed_trace = false

[tools]
global_api_key = "gk-test"
timeout_secs = 5

[log]
enabled = true
dir = "/tmp/aiflow-logs"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, 12);
    assert!(!config.engine.embed_trace);
    assert_eq!(config.tools.api_key(), Some("gk-test"));
    assert_eq!(config.tools.timeout_secs, 5);
    assert!(config.log.enabled);
    assert_eq!(config.log_dir().to_str(), Some("/tmp/aiflow-logs"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("AIFLOW_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[tools]
global_api_key = "${AIFLOW_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.tools.api_key(), Some("expanded-key-value"));

    std::env::remove_var("AIFLOW_TEST_API_KEY");
}

#[test]
fn test_unset_env_var_is_not_used_as_key() {
    let toml_content = r#"
[tools]
global_api_key = "${AIFLOW_TEST_SURELY_UNSET_VAR}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.tools.api_key(), None);
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\n").expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, 50);
    assert!(config.engine.embed_trace);
    assert_eq!(config.tools.timeout_secs, 30);
    assert_eq!(config.tools.api_key(), None);
    assert!(!config.log.enabled);
    assert_eq!(config.log.dir, "logs");
}

#[test]
fn test_missing_file_and_bad_toml() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let missing = dir.path().join("aiflow.toml");

    assert!(matches!(
        AppConfig::load(&missing),
        Err(AiflowError::ConfigNotFound(_))
    ));
    let defaults = AppConfig::load_or_default(&missing).expect("defaults");
    assert_eq!(defaults.engine.max_steps, 50);

    std::fs::write(&missing, "[engine\nmax_steps = ").expect("write toml");
    assert!(matches!(
        AppConfig::load(&missing),
        Err(AiflowError::Config(_))
    ));
}
