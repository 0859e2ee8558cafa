use livepdf::Settings;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_env_override_with_nested_keys() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("livepdf.toml");
    std::fs::write(&config_path, "[watch]\ndebounce_ms = 100\npoll_interval_ms = 900\n").unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("LIVEPDF_WATCH__DEBOUNCE_MS", "250");
        env::set_var("LIVEPDF_CACHE__ARTIFACT_MAX_AGE_DAYS", "7");
        env::set_var("LIVEPDF_RENDERER__PROGRAM", "libreoffice");
        env::set_var("LIVEPDF_CACHE__DIR", "/tmp/livepdf-env-test");
    }

    let settings = Settings::load_from(&config_path);

    unsafe {
        env::remove_var("LIVEPDF_WATCH__DEBOUNCE_MS");
        env::remove_var("LIVEPDF_CACHE__ARTIFACT_MAX_AGE_DAYS");
        env::remove_var("LIVEPDF_RENDERER__PROGRAM");
        env::remove_var("LIVEPDF_CACHE__DIR");
    }

    let settings = settings.unwrap();
    // Env beats the file
    assert_eq!(settings.watch.debounce_ms, 250);
    // File beats defaults
    assert_eq!(settings.watch.poll_interval_ms, 900);
    assert_eq!(settings.cache.artifact_max_age_days, 7);
    assert_eq!(settings.renderer.program, "libreoffice");
    assert_eq!(settings.cache.dir, PathBuf::from("/tmp/livepdf-env-test"));
    assert_eq!(
        settings.cache.state_dir(),
        PathBuf::from("/tmp/livepdf-env-test/state")
    );
}
