//! Integration tests for configuration resolution and graceful degradation
//!
//! Tests that manipulate PVAC_CONFIG are marked with #[serial] so they run
//! sequentially, not in parallel.

use pvac_common::config::{
    load_config, resolve_config_path, write_toml_config, LoggingConfig, ProviderConfig,
    TomlConfig, CONFIG_ENV_VAR,
};
use pvac_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_takes_priority_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let cli = PathBuf::from("/tmp/from-cli.toml");
    let (path, explicit) = resolve_config_path(Some(cli.as_path())).unwrap();

    assert_eq!(path, cli);
    assert!(explicit);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let (path, explicit) = resolve_config_path(None).unwrap();
    assert_eq!(path, PathBuf::from("/tmp/from-env.toml"));
    assert!(explicit);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let err = load_config(Some(missing.as_path())).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_write_then_load_roundtrip() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let config = TomlConfig {
        output_dir: PathBuf::from("/data/out"),
        concurrency: 8,
        cache_enabled: false,
        provider: "gemini".to_string(),
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: Some(PathBuf::from("/var/log/pvac.log")),
        },
        openai: ProviderConfig::default(),
        gemini: ProviderConfig {
            api_key: Some("test-key".to_string()),
            model: Some("gemini-2.5-pro".to_string()),
        },
    };

    write_toml_config(&config, &path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("toml.tmp").exists());

    let loaded = load_config(Some(path.as_path())).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_toml_fills_defaults() {
    let config = TomlConfig::from_toml_str(
        r#"
        provider = "openai"

        [openai]
        model = "gpt-4o"
        "#,
    )
    .unwrap();

    assert_eq!(config.provider, "openai");
    assert_eq!(config.openai.model.as_deref(), Some("gpt-4o"));
    assert!(config.openai.api_key.is_none());
    assert_eq!(config.concurrency, 5);
    assert_eq!(config.logging.level, "info");
}
