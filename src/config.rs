use crate::logging::RemoteLogConfig;
use crate::storage::StoreKind;
use std::{env, path::PathBuf, time::Duration};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/state.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub store: StoreKind,
    pub remote_log: Option<RemoteLogConfig>,
    /// Problems found while reading the environment. Logged by the caller
    /// once tracing is up.
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any variable source; unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let data_path = lookup("APP_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));

        let mut warnings = Vec::new();
        let store = match lookup("APP_STORE") {
            Some(value) => value.parse().unwrap_or_else(|err: String| {
                warnings.push(format!("{err}, falling back to file store"));
                StoreKind::File
            }),
            None => StoreKind::File,
        };

        let remote_log = lookup("LOG_ENDPOINT")
            .filter(|url| !url.trim().is_empty())
            .map(|url| {
                let defaults = RemoteLogConfig::new(url);
                RemoteLogConfig {
                    batch_size: parse_or(&lookup, "LOG_BATCH_SIZE", defaults.batch_size),
                    max_queue: parse_or(&lookup, "LOG_MAX_QUEUE", defaults.max_queue),
                    flush_interval: lookup("LOG_FLUSH_MS")
                        .and_then(|value| value.parse::<u64>().ok())
                        .map(Duration::from_millis)
                        .unwrap_or(defaults.flush_interval),
                    ..defaults
                }
            });

        Self {
            port,
            data_path,
            store,
            remote_log,
            warnings,
        }
    }
}

fn parse_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_path, PathBuf::from("data/state.json"));
        assert_eq!(config.store, StoreKind::File);
        assert!(config.remote_log.is_none());
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("PORT", "9191"),
            ("APP_DATA_PATH", "/tmp/quit.json"),
            ("APP_STORE", "memory"),
            ("LOG_ENDPOINT", "http://127.0.0.1:9/logs"),
            ("LOG_BATCH_SIZE", "3"),
            ("LOG_FLUSH_MS", "250"),
        ]);
        assert_eq!(config.port, 9191);
        assert_eq!(config.data_path, PathBuf::from("/tmp/quit.json"));
        assert_eq!(config.store, StoreKind::Memory);

        let remote = config.remote_log.expect("remote log config");
        assert_eq!(remote.url, "http://127.0.0.1:9/logs");
        assert_eq!(remote.batch_size, 3);
        assert_eq!(remote.max_queue, 100);
        assert_eq!(remote.flush_interval, Duration::from_millis(250));
    }

    #[test]
    fn bad_values_fall_back() {
        let config = config(&[
            ("PORT", "eighty"),
            ("APP_STORE", "cloud"),
            ("LOG_ENDPOINT", " "),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.store, StoreKind::File);
        assert!(config.remote_log.is_none());
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("cloud"));
    }
}
