//! Configuration resolution tests
//!
//! These mutate process environment variables, so they run serially.

use serial_test::serial;
use spendcast_common::config::{TomlConfig, CONFIG_ENV_VAR, ROOT_ENV_VAR};
use std::env;
use std::path::{Path, PathBuf};

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(ROOT_ENV_VAR);
}

#[test]
#[serial]
fn test_root_priority_cli_then_env_then_toml() {
    clear_env();
    let config = TomlConfig::from_toml_str("root_folder = \"/from/toml\"\n").unwrap();

    assert_eq!(config.resolve_root_folder(None), PathBuf::from("/from/toml"));

    env::set_var(ROOT_ENV_VAR, "/from/env");
    assert_eq!(config.resolve_root_folder(None), PathBuf::from("/from/env"));

    assert_eq!(
        config.resolve_root_folder(Some(Path::new("/from/cli"))),
        PathBuf::from("/from/cli")
    );

    clear_env();
}

#[test]
#[serial]
fn test_blank_root_env_is_ignored() {
    clear_env();
    env::set_var(ROOT_ENV_VAR, "  ");
    let config = TomlConfig::from_toml_str("root_folder = \"/from/toml\"\n").unwrap();

    assert_eq!(config.resolve_root_folder(None), PathBuf::from("/from/toml"));
    clear_env();
}

#[test]
#[serial]
fn test_config_file_from_env() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spendcast.toml");
    std::fs::write(
        &path,
        "[source]\nbatch_size = 25\n\n[server]\nport = 8080\n\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let config = TomlConfig::load(None).unwrap();
    assert_eq!(config.source.batch_size, 25);
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.logging.level, "debug");

    clear_env();
}

#[test]
#[serial]
fn test_cli_config_overrides_env_and_must_exist() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join("env.toml");
    let cli_path = dir.path().join("cli.toml");
    std::fs::write(&env_path, "[source]\nbatch_size = 3\n").unwrap();
    std::fs::write(&cli_path, "[source]\nbatch_size = 7\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    assert_eq!(TomlConfig::load(Some(&cli_path)).unwrap().source.batch_size, 7);

    let missing = dir.path().join("missing.toml");
    assert!(TomlConfig::load(Some(&missing)).is_err());

    clear_env();
}
