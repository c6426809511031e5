use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::bridge::{
    BridgeConfig, DEFAULT_PAYLOAD_PARAM, DEFAULT_TIMEOUT_MS, RESERVED_PARAMS, normalize_endpoint,
};

pub const ENV_ENDPOINT_URL: &str = "DEMANDAS_ENDPOINT_URL";
pub const ENV_TIMEOUT_MS: &str = "DEMANDAS_TIMEOUT_MS";
pub const ENV_UPLOAD_TIMEOUT_MS: &str = "DEMANDAS_UPLOAD_TIMEOUT_MS";
pub const ENV_PAYLOAD_PARAM: &str = "DEMANDAS_PAYLOAD_PARAM";
pub const ENV_STORE_PATH: &str = "DEMANDAS_STORE_PATH";

pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_STORE_PATH: &str = ".demandas/store.json";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("DEMANDAS_ENDPOINT_URL is required")]
    MissingEndpoint,
    #[error("invalid DEMANDAS_ENDPOINT_URL: {0}")]
    InvalidEndpoint(String),
    #[error("invalid DEMANDAS_TIMEOUT_MS: {0}")]
    InvalidTimeout(String),
    #[error("invalid DEMANDAS_UPLOAD_TIMEOUT_MS: {0}")]
    InvalidUploadTimeout(String),
    #[error("invalid DEMANDAS_PAYLOAD_PARAM: {0}")]
    InvalidPayloadParam(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint_url: String,
    pub timeout_ms: u64,
    pub upload_timeout_ms: u64,
    pub payload_param: String,
    pub store_path: PathBuf,
}

impl ClientConfig {
    pub fn new(endpoint_url: &str) -> Result<Self, ConfigError> {
        let endpoint_url = normalize_endpoint(endpoint_url)
            .map_err(|error| ConfigError::InvalidEndpoint(error.to_string()))?;
        Ok(Self {
            endpoint_url,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            payload_param: DEFAULT_PAYLOAD_PARAM.to_string(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint_url = env_non_empty(ENV_ENDPOINT_URL).ok_or(ConfigError::MissingEndpoint)?;
        let mut config = Self::new(&endpoint_url)?;

        if let Some(raw) = env_non_empty(ENV_TIMEOUT_MS) {
            config.timeout_ms = parse_millis(&raw).map_err(ConfigError::InvalidTimeout)?;
        }
        if let Some(raw) = env_non_empty(ENV_UPLOAD_TIMEOUT_MS) {
            config.upload_timeout_ms =
                parse_millis(&raw).map_err(ConfigError::InvalidUploadTimeout)?;
        }
        if let Some(param) = env_non_empty(ENV_PAYLOAD_PARAM) {
            if RESERVED_PARAMS.contains(&param.as_str()) {
                return Err(ConfigError::InvalidPayloadParam(format!(
                    "`{param}` is reserved"
                )));
            }
            config.payload_param = param;
        }
        if let Some(path) = env_non_empty(ENV_STORE_PATH) {
            config.store_path = PathBuf::from(path);
        }
        Ok(config)
    }

    #[must_use]
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            endpoint_url: self.endpoint_url.clone(),
            timeout_ms: self.timeout_ms,
            payload_param: self.payload_param.clone(),
        }
    }

    #[must_use]
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_millis(raw: &str) -> Result<u64, String> {
    let value = raw.parse::<u64>().map_err(|error| error.to_string())?;
    if value == 0 {
        return Err("must be greater than zero".to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const ALL_KEYS: [&str; 5] = [
        ENV_ENDPOINT_URL,
        ENV_TIMEOUT_MS,
        ENV_UPLOAD_TIMEOUT_MS,
        ENV_PAYLOAD_PARAM,
        ENV_STORE_PATH,
    ];

    fn with_env<T>(vars: &[(&str, &str)], test: impl FnOnce() -> T) -> T {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = ALL_KEYS
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect::<Vec<_>>();
        for key in ALL_KEYS {
            unsafe { std::env::remove_var(key) };
        }
        for (key, value) in vars {
            unsafe { std::env::set_var(key, value) };
        }

        let result = test();

        for (key, value) in previous {
            match value {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
        result
    }

    #[test]
    fn endpoint_is_required() {
        with_env(&[], || {
            assert_eq!(ClientConfig::from_env(), Err(ConfigError::MissingEndpoint));
        });
    }

    #[test]
    fn defaults_apply_when_only_the_endpoint_is_set() {
        with_env(
            &[(ENV_ENDPOINT_URL, "https://script.example.com/macros/s/abc/exec/")],
            || {
                let config = ClientConfig::from_env().expect("config");
                assert_eq!(config.endpoint_url, "https://script.example.com/macros/s/abc/exec");
                assert_eq!(config.timeout_ms, 15_000);
                assert_eq!(config.upload_timeout(), Duration::from_secs(60));
                assert_eq!(config.payload_param, "dados");
                assert_eq!(config.store_path, PathBuf::from(".demandas/store.json"));
            },
        );
    }

    #[test]
    fn overrides_are_parsed() {
        with_env(
            &[
                (ENV_ENDPOINT_URL, "http://127.0.0.1:9000/exec"),
                (ENV_TIMEOUT_MS, "8000"),
                (ENV_PAYLOAD_PARAM, "data"),
                (ENV_STORE_PATH, "/tmp/demandas.json"),
            ],
            || {
                let config = ClientConfig::from_env().expect("config");
                assert_eq!(config.bridge_config().timeout_ms, 8_000);
                assert_eq!(config.bridge_config().payload_param, "data");
                assert_eq!(config.store_path, PathBuf::from("/tmp/demandas.json"));
            },
        );
    }

    #[test]
    fn invalid_values_name_the_variable() {
        with_env(
            &[
                (ENV_ENDPOINT_URL, "https://script.example.com/exec"),
                (ENV_TIMEOUT_MS, "soon"),
            ],
            || {
                assert!(matches!(
                    ClientConfig::from_env(),
                    Err(ConfigError::InvalidTimeout(_))
                ));
            },
        );
        with_env(&[(ENV_ENDPOINT_URL, "script.example.com")], || {
            assert!(matches!(
                ClientConfig::from_env(),
                Err(ConfigError::InvalidEndpoint(_))
            ));
        });
        with_env(
            &[
                (ENV_ENDPOINT_URL, "https://script.example.com/exec"),
                (ENV_PAYLOAD_PARAM, "callback"),
            ],
            || {
                assert!(matches!(
                    ClientConfig::from_env(),
                    Err(ConfigError::InvalidPayloadParam(_))
                ));
            },
        );
    }
}
