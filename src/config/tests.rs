use super::load::{default_config_path, resolve_config_path};
use super::schema::*;
use std::sync::{Mutex, OnceLock};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
}

struct EnvGuard {
    key: &'static str,
    old: Option<std::ffi::OsString>,
}

impl EnvGuard {
    fn set(key: &'static str, val: &str) -> Self {
        let old = std::env::var_os(key);
        unsafe {
            std::env::set_var(key, val);
        }
        Self { key, old }
    }

    fn remove(key: &'static str) -> Self {
        let old = std::env::var_os(key);
        unsafe {
            std::env::remove_var(key);
        }
        Self { key, old }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match self.old.take() {
            Some(v) => unsafe {
                std::env::set_var(self.key, v);
            },
            None => unsafe {
                std::env::remove_var(self.key);
            },
        }
    }
}

#[test]
fn config_path_env_var_wins_over_xdg_location() {
    let _lock = env_lock();
    let _g1 = EnvGuard::set("XDG_CONFIG_HOME", "/tmp/xdg-config-home");
    let _g2 = EnvGuard::remove("TRACKSTATE_CONFIG_PATH");
    assert_eq!(resolve_config_path(), default_config_path());
    let default_path = default_config_path().unwrap();
    assert!(default_path.ends_with("trackstate/config.toml"));

    let _g3 = EnvGuard::set("TRACKSTATE_CONFIG_PATH", "/tmp/trackstate-test-config.toml");
    assert_eq!(
        resolve_config_path().unwrap(),
        std::path::PathBuf::from("/tmp/trackstate-test-config.toml")
    );
}

#[test]
fn env_extension_list_is_split_and_validated() {
    let _lock = env_lock();
    let dir = tempfile::tempdir().unwrap();
    let _g1 = EnvGuard::set(
        "TRACKSTATE_CONFIG_PATH",
        dir.path().join("absent.toml").to_str().unwrap(),
    );
    let _g2 = EnvGuard::set("TRACKSTATE__LIBRARY__EXTENSIONS", "flac,aiff");

    let s = Settings::load().unwrap();
    assert_eq!(
        s.library.extensions,
        vec!["flac".to_string(), "aiff".to_string()]
    );
    assert!(s.validate().is_ok());
}

#[test]
fn loaded_settings_without_extensions_fail_validation() {
    let _lock = env_lock();
    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("config.toml");
    std::fs::write(
        &cfg_path,
        r#"
[library]
extensions = []
"#,
    )
    .unwrap();
    let _g1 = EnvGuard::set("TRACKSTATE_CONFIG_PATH", cfg_path.to_str().unwrap());
    let _g2 = EnvGuard::remove("TRACKSTATE__LIBRARY__EXTENSIONS");

    let s = Settings::load().unwrap();
    assert!(s.library.extensions.is_empty());
    assert_eq!(
        s.validate().unwrap_err(),
        "library.extensions must name at least one extension"
    );
}

#[test]
fn settings_load_from_config_file() {
    let _lock = env_lock();

    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("config.toml");
    std::fs::write(
        &cfg_path,
        r#"
[library]
extensions = ["mp3"]
recursive = false
include_hidden = true
follow_links = false
max_depth = 3

[metadata]
export_embedded_tags = false
export_on_exit = true
"#,
    )
    .unwrap();

    let _g1 = EnvGuard::set("TRACKSTATE_CONFIG_PATH", cfg_path.to_str().unwrap());
    let _g2 = EnvGuard::remove("TRACKSTATE__METADATA__EXPORT_ON_EXIT");

    let s = Settings::load().unwrap();
    assert_eq!(s.library.extensions, vec!["mp3".to_string()]);
    assert!(!s.library.recursive);
    assert!(s.library.include_hidden);
    assert!(!s.library.follow_links);
    assert_eq!(s.library.max_depth, Some(3));
    assert!(!s.metadata.export_embedded_tags);
    assert!(s.metadata.export_on_exit);
    assert!(!s.metadata.reimport_synchronized);
    assert!(s.validate().is_ok());
}

#[test]
fn settings_env_overrides_config_file() {
    let _lock = env_lock();

    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("config.toml");
    std::fs::write(
        &cfg_path,
        r#"
[metadata]
export_on_exit = false
"#,
    )
    .unwrap();

    let _g1 = EnvGuard::set("TRACKSTATE_CONFIG_PATH", cfg_path.to_str().unwrap());
    let _g2 = EnvGuard::set("TRACKSTATE__METADATA__EXPORT_ON_EXIT", "true");

    let s = Settings::load().unwrap();
    assert!(s.metadata.export_on_exit);
}

#[test]
fn missing_config_file_yields_defaults() {
    let _lock = env_lock();
    let dir = tempfile::tempdir().unwrap();
    let _g1 = EnvGuard::set(
        "TRACKSTATE_CONFIG_PATH",
        dir.path().join("absent.toml").to_str().unwrap(),
    );

    let s = Settings::load().unwrap();
    assert_eq!(s, Settings::default());
}

#[test]
fn validate_rejects_empty_extension_list() {
    let mut s = Settings::default();
    s.library.extensions = vec![" ".to_string()];
    assert!(s.validate().is_err());

    s.library.extensions = vec!["flac".to_string()];
    s.library.max_depth = Some(0);
    assert!(s.validate().is_err());
}

#[test]
fn settings_serialize_to_toml() {
    let text = toml::to_string_pretty(&Settings::default()).unwrap();
    assert!(text.contains("[library]"));
    assert!(text.contains("export_embedded_tags = true"));
}
