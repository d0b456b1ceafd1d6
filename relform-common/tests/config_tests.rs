//! Tests for configuration resolution
//!
//! Tests that manipulate RELFORM_CONFIG or RELFORM_DATA_DIR are marked with
//! #[serial] so they never run in parallel with each other.

use relform_common::config::{
    Config, ConfigSource, DataLayout, CONFIG_ENV_VAR, DATA_DIR_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_config_path_takes_priority_over_env() {
    let dir = TempDir::new().unwrap();
    let cli = dir.path().join("cli.toml");
    let from_env = dir.path().join("env.toml");
    fs::write(&cli, "bind = \"0.0.0.0:8001\"").unwrap();
    fs::write(&from_env, "bind = \"0.0.0.0:8002\"").unwrap();
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let (config, source) = Config::load(Some(&cli)).unwrap();
    assert_eq!(config.bind, "0.0.0.0:8001");
    assert_eq!(source, ConfigSource::CommandLine(cli.clone()));

    let (config, source) = Config::load(None).unwrap();
    assert_eq!(config.bind, "0.0.0.0:8002");
    assert_eq!(source, ConfigSource::Environment(from_env.clone()));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_config_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
}

#[test]
#[serial]
fn test_data_dir_override_order() {
    env::remove_var(DATA_DIR_ENV_VAR);
    let mut config = Config::from_toml_str("data_dir = \"/from/toml\"").unwrap();
    config.resolve_data_dir(None);
    assert_eq!(config.data_dir, PathBuf::from("/from/toml"));

    env::set_var(DATA_DIR_ENV_VAR, "/from/env");
    config.resolve_data_dir(None);
    assert_eq!(config.data_dir, PathBuf::from("/from/env"));

    config.resolve_data_dir(Some(PathBuf::from("/from/cli")));
    assert_eq!(config.data_dir, PathBuf::from("/from/cli"));

    env::remove_var(DATA_DIR_ENV_VAR);
}

#[test]
fn test_layout_creates_directories() {
    let dir = TempDir::new().unwrap();
    let layout = DataLayout::new(dir.path().join("data"));
    layout.ensure_directories().unwrap();

    assert!(layout.images.is_dir());
    assert!(layout.tmp.is_dir());
    assert!(!layout.ledger.exists());
    assert!(!layout.sequence.exists());
    assert_eq!(layout.lock, dir.path().join("data").join("lock"));
}
