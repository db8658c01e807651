use super::load_existing_config as load_existing_config_impl;
use super::*;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "not = [valid").expect("write config");

    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config, Config::new(temp_dir.path()));
}

#[test]
fn normalize_optional_trims_and_drops_blank() {
    assert_eq!(normalize_optional("   "), None);
    assert_eq!(normalize_optional(" HF_TOKEN "), Some("HF_TOKEN".to_string()));
}
