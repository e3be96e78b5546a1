use std::fs;
use std::time::Duration;

use kodiconfig::Config;

#[test]
fn test_load_config_from_directory_merges_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.yaml"),
        "kodi:\n  url: http://kodi.local:8080\n  username: kodi\npoller:\n  interval_ms: 1500\n",
    )
    .unwrap();

    let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(config.get_kodi_url(), "http://kodi.local:8080");
    assert_eq!(config.get_kodi_username(), "kodi");
    assert_eq!(config.get_poll_interval(), Duration::from_millis(1500));
    assert_eq!(config.get_grace_period(), Duration::from_millis(10000));

    // defaults are written back next to the user values
    let saved = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
    assert!(saved.contains("grace_period_ms"));
}

#[test]
fn test_load_config_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("nested").join(".kodiinfo");

    let config = Config::load_config(nested.to_str().unwrap()).unwrap();
    assert!(nested.join("config.yaml").exists());
    assert_eq!(config.get_http_port(), 5005);
}
