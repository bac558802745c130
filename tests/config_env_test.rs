use docsim::config::Settings;
use std::env;
use tempfile::TempDir;

#[test]
fn test_toml_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("docsim.toml");
    std::fs::write(
        &path,
        "[search]\nstage0_top_k = 42\n\n[cleanup]\nmax_attempts = 9\n",
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.search.stage0_top_k, 42);
    assert_eq!(settings.cleanup.max_attempts, 9);
    // Untouched keys keep their defaults.
    assert_eq!(settings.search.stage1_top_k, 250);
}

#[test]
fn test_env_overrides_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("docsim.toml");
    std::fs::write(&path, "[search]\nstage1_top_k = 100\n").unwrap();

    unsafe {
        env::set_var("DOCSIM_SEARCH__STAGE1_TOP_K", "7");
        env::set_var("DOCSIM_VECTOR_INDEX__COLLECTION", "chunks_v2");
    }

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.search.stage1_top_k, 7);
    assert_eq!(settings.vector_index.collection, "chunks_v2");

    unsafe {
        env::remove_var("DOCSIM_SEARCH__STAGE1_TOP_K");
        env::remove_var("DOCSIM_VECTOR_INDEX__COLLECTION");
    }
}

#[test]
fn test_init_writes_default_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("docsim.toml");

    Settings::init_config_file(&path, false).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[search]"));
    assert!(content.contains("[cleanup]"));

    // A second init without force refuses to overwrite.
    assert!(Settings::init_config_file(&path, false).is_err());
    assert!(Settings::init_config_file(&path, true).is_ok());
}
