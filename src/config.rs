use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

pub const DEFAULT_UPLOAD_API_KEY: &str = "your-secret-key-here";

#[derive(Debug, Error)]
#[error("{name} must be {expected}, got {value:?}")]
pub struct ConfigError {
    name: &'static str,
    expected: &'static str,
    value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub upload_api_key: String,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub upload_dir: PathBuf,
    pub input_size: u32,
    pub input_op: String,
    pub output_op: String,
    pub simulated_latency: Duration,
    pub fallback_to_simulation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            body_limit_bytes: 32 * 1024 * 1024,
            upload_api_key: DEFAULT_UPLOAD_API_KEY.to_string(),
            model_path: PathBuf::from("models/sign_language_model.pb"),
            model_url: None,
            upload_dir: PathBuf::from("uploads"),
            input_size: 224,
            input_op: "x".to_string(),
            output_op: "Identity".to_string(),
            simulated_latency: Duration::from_millis(1000),
            fallback_to_simulation: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset variables keep
    /// their defaults; set-but-unparseable ones are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse(&lookup, "PORT", "a valid number between 0 and 65535")? {
            config.port = port;
        }
        if let Some(mb) = parse::<usize, _>(&lookup, "BODY_LIMIT_MB", "a valid integer")? {
            config.body_limit_bytes = mb * 1024 * 1024;
        }
        if let Some(key) = non_empty(&lookup, "UPLOAD_API_KEY") {
            config.upload_api_key = key;
        }
        if let Some(path) = non_empty(&lookup, "MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        config.model_url = non_empty(&lookup, "MODEL_URL");
        if let Some(dir) = non_empty(&lookup, "UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(size) = parse::<u32, _>(&lookup, "MODEL_INPUT_SIZE", "a positive integer")? {
            if size == 0 {
                return Err(ConfigError {
                    name: "MODEL_INPUT_SIZE",
                    expected: "a positive integer",
                    value: size.to_string(),
                });
            }
            config.input_size = size;
        }
        if let Some(op) = non_empty(&lookup, "MODEL_INPUT_OP") {
            config.input_op = op;
        }
        if let Some(op) = non_empty(&lookup, "MODEL_OUTPUT_OP") {
            config.output_op = op;
        }
        if let Some(ms) = parse(&lookup, "SIMULATED_LATENCY_MS", "a number of milliseconds")? {
            config.simulated_latency = Duration::from_millis(ms);
        }
        if let Some(fallback) = parse(&lookup, "FALLBACK_TO_SIMULATION", "true or false")? {
            config.fallback_to_simulation = fallback;
        }

        Ok(config)
    }

    pub fn uses_default_api_key(&self) -> bool {
        self.upload_api_key == DEFAULT_UPLOAD_API_KEY
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse<T, F>(lookup: &F, name: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError {
                name,
                expected,
                value,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.input_size, 224);
        assert!(config.uses_default_api_key());
        assert!(config.model_url.is_none());
        assert!(config.fallback_to_simulation);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("BODY_LIMIT_MB", "2"),
            ("UPLOAD_API_KEY", "s3cret"),
            ("MODEL_URL", "https://example.com/model.pb"),
            ("SIMULATED_LATENCY_MS", "0"),
            ("FALLBACK_TO_SIMULATION", "false"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.body_limit_bytes, 2 * 1024 * 1024);
        assert_eq!(config.upload_api_key, "s3cret");
        assert!(!config.uses_default_api_key());
        assert_eq!(config.model_url.as_deref(), Some("https://example.com/model.pb"));
        assert_eq!(config.simulated_latency, Duration::ZERO);
        assert!(!config.fallback_to_simulation);
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config = Config::from_lookup(lookup(&[("MODEL_URL", "  "), ("PORT", "")])).unwrap();
        assert!(config.model_url.is_none());
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("PORT", "70000")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        assert!(Config::from_lookup(lookup(&[("MODEL_INPUT_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("FALLBACK_TO_SIMULATION", "maybe")])).is_err());
    }
}
