//! # KodiInfo configuration
//!
//! Configuration management for the KodiInfo now-playing service:
//! - an embedded default YAML document
//! - merged with a user `config.yaml` when one exists
//! - environment variable overrides (`KODIINFO_CONFIG__SECTION__KEY=value`)
//! - the legacy `KODI_HOST`, `KODI_USERNAME` and `KODI_PASSWORD` variables
//! - typed getters falling back to defaults
//!
//! ## Usage
//!
//! ```no_run
//! use kodiconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let interval = config.get_poll_interval();
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("kodiinfo.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> = Arc::new(match Config::load_config("") {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load configuration, using embedded defaults");
            Config::embedded()
        }
    });
}

const ENV_CONFIG_DIR: &str = "KODIINFO_CONFIG";
const ENV_PREFIX: &str = "KODIINFO_CONFIG__";

const LEGACY_ENV_HOST: &str = "KODI_HOST";
const LEGACY_ENV_USERNAME: &str = "KODI_USERNAME";
const LEGACY_ENV_PASSWORD: &str = "KODI_PASSWORD";

const DEFAULT_HTTP_PORT: u16 = 5005;
const DEFAULT_KODI_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_KODI_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_GRACE_PERIOD_MS: u64 = 10_000;
const DEFAULT_EXTRA_FANART_DIR: &str = "extrafanart";
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Getter/setter pair for usize values with a default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> usize {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().map(|v| v as usize).unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(size)))
        }
    };
}

/// Getter/setter pair for bool values with a default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Getter/setter pair for millisecond durations with a default
macro_rules! impl_duration_config {
    ($getter:ident, $setter:ident, $path:expr, $default_ms:expr) => {
        pub fn $getter(&self) -> Duration {
            let ms = match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().unwrap_or($default_ms),
                Ok(Value::String(s)) => s.trim().parse::<u64>().unwrap_or_else(|_| {
                    warn!(value = %s, "Invalid duration in configuration, using default");
                    $default_ms
                }),
                _ => $default_ms,
            };
            Duration::from_millis(ms.max(1))
        }

        pub fn $setter(&self, value: Duration) -> Result<()> {
            let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
            self.set_value($path, Value::Number(Number::from(ms)))
        }
    };
}

/// Getter/setter pair for string values with a default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) => s,
                Ok(Value::Number(n)) => n.to_string(),
                _ => $default.to_string(),
            }
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration manager for KodiInfo
///
/// Values live in a YAML tree guarded by a mutex. Keys are case-insensitive:
/// every key is lowercased on load and on lookup.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: Option<String>,
    data: Mutex<Value>,
}

impl Config {
    /// Configuration built only from the embedded defaults, never persisted.
    pub fn embedded() -> Self {
        let value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap_or(Value::Mapping(Mapping::new()));
        Self {
            config_dir: String::new(),
            path: None,
            data: Mutex::new(Self::lower_keys_value(value)),
        }
    }

    /// Builds a configuration from a YAML document merged over the defaults.
    ///
    /// Nothing is read from or written to disk and no environment override is
    /// applied.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let external: Value = serde_yaml::from_str(yaml)?;
        merge_yaml(&mut value, &Self::lower_keys_value(external));
        Ok(Self {
            config_dir: String::new(),
            path: None,
            data: Mutex::new(Self::lower_keys_value(value)),
        })
    }

    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(".kodiinfo").exists() {
            return ".kodiinfo".to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(".kodiinfo");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".kodiinfo".to_string()
    }

    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        fs::read_dir(path)?;
        Ok(())
    }

    /// Loads the configuration from `directory` (or the usual search path when empty).
    ///
    /// The merged file is written back before environment overrides are
    /// applied, so credentials passed through the environment never land on disk.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&config_dir))?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut default_value, &Self::lower_keys_value(external));
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
            }
        }

        let config = Config {
            config_dir,
            path: Some(path),
            data: Mutex::new(Self::lower_keys_value(default_value)),
        };
        config.save()?;

        {
            let mut data = config.lock()?;
            Self::apply_overrides(&mut data, env::vars());
        }

        Ok(config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|e| anyhow!("Configuration lock poisoned: {}", e))
    }

    /// Directory the configuration was loaded from (empty for in-memory configs).
    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Writes the current tree to `config.yaml`; a no-op for in-memory configs.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = {
            let data = self.lock()?;
            serde_yaml::to_string(&*data)?
        };
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Sets a value at `path` (e.g. `&["host", "http_port"]`) and saves.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.lock()?;
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets the value at `path`, or an error if it does not exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock()?;
        let mut current = &*data;
        for (i, key) in path.iter().enumerate() {
            match current {
                Value::Mapping(map) => match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                },
                _ => return Err(anyhow!("Path {} is not a mapping", path[..i].join("."))),
            }
        }
        Ok(current.clone())
    }

    fn apply_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
                let key_path = rest.split("__").collect::<Vec<_>>();
                let _ = Self::set_value_internal(config, &key_path, Self::convert_env_value(&value));
                continue;
            }

            let legacy_path: &[&str] = match key.as_str() {
                LEGACY_ENV_HOST => &["kodi", "url"],
                LEGACY_ENV_USERNAME => &["kodi", "username"],
                LEGACY_ENV_PASSWORD => &["kodi", "password"],
                _ => continue,
            };
            let _ = Self::set_value_internal(config, legacy_path, Value::String(value));
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            other => other,
        }
    }

    /// HTTP port of the downstream server.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    warn!("HTTP port {} out of range, using default {}", n, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => s.trim().parse::<u16>().unwrap_or_else(|_| {
                warn!("Invalid HTTP port '{}', using default {}", s, DEFAULT_HTTP_PORT);
                DEFAULT_HTTP_PORT
            }),
            _ => DEFAULT_HTTP_PORT,
        }
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    impl_string_config!(get_kodi_url, set_kodi_url, &["kodi", "url"], DEFAULT_KODI_URL);

    impl_string_config!(get_kodi_username, set_kodi_username, &["kodi", "username"], "");

    impl_string_config!(get_kodi_password, set_kodi_password, &["kodi", "password"], "");

    impl_duration_config!(
        get_kodi_timeout,
        set_kodi_timeout,
        &["kodi", "timeout_ms"],
        DEFAULT_KODI_TIMEOUT_MS
    );

    impl_duration_config!(
        get_poll_interval,
        set_poll_interval,
        &["poller", "interval_ms"],
        DEFAULT_POLL_INTERVAL_MS
    );

    impl_duration_config!(
        get_grace_period,
        set_grace_period,
        &["poller", "grace_period_ms"],
        DEFAULT_GRACE_PERIOD_MS
    );

    impl_string_config!(
        get_extra_fanart_dir,
        set_extra_fanart_dir,
        &["poller", "extra_fanart_dir"],
        DEFAULT_EXTRA_FANART_DIR
    );

    impl_usize_config!(
        get_log_cache_size,
        set_log_cache_size,
        &["host", "logger", "buffer_capacity"],
        DEFAULT_LOG_BUFFER_CAPACITY
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );
}

/// Returns the process-wide configuration, loaded on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Recursively merges `external` into `default`; scalars and sequences are replaced,
/// null leaves the default untouched.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (_, Value::Null) => {}
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = Config::embedded();
        assert_eq!(config.get_http_port(), 5005);
        assert_eq!(config.get_kodi_url(), "http://127.0.0.1:8080");
        assert_eq!(config.get_kodi_username(), "");
        assert_eq!(config.get_poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.get_grace_period(), Duration::from_millis(10000));
        assert_eq!(config.get_extra_fanart_dir(), "extrafanart");
        assert_eq!(config.get_log_min_level(), "INFO");
        assert!(config.get_log_enable_console());
    }

    #[test]
    fn test_yaml_merge_keeps_unspecified_defaults() {
        let config = Config::from_yaml_str("KODI:\n  URL: http://10.0.0.2:555\n").unwrap();
        assert_eq!(config.get_kodi_url(), "http://10.0.0.2:555");
        assert_eq!(config.get_kodi_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_env_overrides() {
        let mut value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        Config::apply_overrides(
            &mut value,
            vec![
                ("KODIINFO_CONFIG__POLLER__INTERVAL_MS".to_string(), "750".to_string()),
                ("KODI_HOST".to_string(), "http://192.168.1.10:555".to_string()),
                ("KODI_PASSWORD".to_string(), "1234".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ],
        );
        let config = Config {
            config_dir: String::new(),
            path: None,
            data: Mutex::new(value),
        };
        assert_eq!(config.get_poll_interval(), Duration::from_millis(750));
        assert_eq!(config.get_kodi_url(), "http://192.168.1.10:555");
        // numeric-looking passwords stay strings on the legacy path
        assert_eq!(config.get_kodi_password(), "1234");
    }

    #[test]
    fn test_invalid_port_falls_back() {
        let config = Config::from_yaml_str("host:\n  http_port: 700000\n").unwrap();
        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);
        let config = Config::from_yaml_str("host:\n  http_port: \"8081\"\n").unwrap();
        assert_eq!(config.get_http_port(), 8081);
    }

    #[test]
    fn test_set_value_in_memory() {
        let config = Config::embedded();
        config.set_poll_interval(Duration::from_secs(3)).unwrap();
        assert_eq!(config.get_poll_interval(), Duration::from_secs(3));
        assert!(config.get_value(&["nope", "missing"]).is_err());
    }
}
