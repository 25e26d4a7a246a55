//! Config store round-trip and atomic-replace tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use phpdev_core::{paths, Config, ConfigStore, ServerConfig, StoreError};
use rstest::rstest;

fn custom_config() -> Config {
    Config {
        php_versions: vec!["8.4.1".into(), "7.4.33".into()],
        default_php_version: Some("7.4.33".into()),
        download_base_url: "https://mirror.example.com/php".into(),
        projects_dir: Some(PathBuf::from("/srv/projects")),
        server: ServerConfig {
            default_port: 9000,
            default_host: "0.0.0.0".into(),
            auto_reload: false,
            document_root: Some(PathBuf::from("htdocs")),
        },
    }
}

#[test]
fn set_then_get_returns_equal_value() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = ConfigStore::open_at(home.path()).expect("open");
    store.set(custom_config()).expect("set");
    assert_eq!(store.get(), custom_config());
}

#[test]
fn set_persists_across_reopen() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    ConfigStore::open_at(home.path())
        .expect("open")
        .set(custom_config())
        .expect("set");

    let reopened = ConfigStore::open_at(home.path()).expect("reopen");
    assert_eq!(reopened.get(), custom_config());
    assert!(paths::config_path(home.path()).exists());
}

#[test]
fn corrupt_config_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = paths::config_path(home.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "php_versions: {not: [a list").unwrap();

    let err = ConfigStore::open_at(home.path()).unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[rstest]
#[case::empty_url(|c: &mut Config| c.download_base_url.clear())]
#[case::zero_port(|c: &mut Config| c.server.default_port = 0)]
#[case::empty_host(|c: &mut Config| c.server.default_host = "  ".into())]
#[case::bad_default(|c: &mut Config| c.default_php_version = Some("latest".into()))]
fn invalid_configs_are_rejected(#[case] mutate: fn(&mut Config)) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = ConfigStore::open_at(home.path()).expect("open");
    let mut config = Config::default();
    mutate(&mut config);
    let err = store.set(config).unwrap_err();
    assert_eq!(err.kind(), phpdev_core::ErrorKind::InvalidInput);
    assert!(!paths::config_path(home.path()).exists());
}

#[test]
fn concurrent_readers_see_whole_values() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let store = Arc::new(ConfigStore::open_at(home.path()).expect("open"));
    let old = Config::default();
    let new = custom_config();

    let writer = {
        let store = store.clone();
        let new = new.clone();
        let old = old.clone();
        thread::spawn(move || {
            for i in 0..50 {
                let next = if i % 2 == 0 { new.clone() } else { old.clone() };
                store.set(next).expect("set");
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let old = old.clone();
            let new = new.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let seen = store.get();
                    assert!(seen == old || seen == new, "observed a torn config");
                }
            })
        })
        .collect();

    writer.join().expect("writer");
    for r in readers {
        r.join().expect("reader");
    }
}
