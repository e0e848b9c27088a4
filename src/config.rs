//! Run settings resolved from flags, environment variables and a config file.
//!
//! Precedence, highest first: explicit overrides (command-line flags), then
//! environment variables, then the JSON config file, then built-in defaults.
//! The API key is only ever taken from overrides or the environment; the
//! config file has no field for it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{EngineConfig, RetryPolicy};
use crate::error::ConfigurationError;
use crate::provider::{ApiKey, ProviderClient, ProviderClientBuilder, ProviderError, ProviderKind};

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "DTAG_CONFIG";
pub const PROVIDER_ENV: &str = "DTAG_PROVIDER";
pub const MODEL_ENV: &str = "DTAG_MODEL";
/// Checked before the provider-specific key variables.
pub const API_KEY_ENV: &str = "DTAG_API_KEY";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors that can occur while loading or resolving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Contents of `config.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub inter_row_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Loads the config file at `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file exists but cannot be read and
    /// `ConfigError::Parse` if it is not valid JSON of the expected shape.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Returns the platform config file location.
///
/// The path is `{config_dir}/dtag/config.json` where `config_dir` is:
/// - Linux: `~/.config`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dtag").join("config.json"))
}

/// Picks the config file: `explicit`, then `DTAG_CONFIG`, then the default.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env_var(CONFIG_ENV).map(PathBuf::from))
        .or_else(default_config_path)
}

/// Values supplied explicitly, typically from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub inter_row_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

/// Where the API key came from, for display without revealing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Flag,
    Env(&'static str),
    Unset,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<ApiKey>,
    pub key_source: KeySource,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub request_timeout: Duration,
    pub engine: EngineConfig,
}

impl Settings {
    /// Resolves settings from overrides, the environment and `file`.
    ///
    /// The file's `model` is only used when the file does not name a
    /// different provider than the one resolved.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::UnknownProvider` for an unrecognized
    /// provider id from any source.
    pub fn resolve(overrides: &Overrides, file: &FileConfig) -> Result<Self, ConfigError> {
        let file_provider = file
            .provider
            .as_deref()
            .map(ProviderKind::from_str)
            .transpose()?;

        let provider = match non_blank(overrides.provider.clone()).or_else(|| env_var(PROVIDER_ENV)) {
            Some(id) => ProviderKind::from_str(&id)?,
            None => file_provider.unwrap_or(ProviderKind::Google),
        };

        let file_model = non_blank(file.model.clone())
            .filter(|_| file_provider.is_none_or(|kind| kind == provider));
        let model = non_blank(overrides.model.clone())
            .or_else(|| env_var(MODEL_ENV))
            .or(file_model)
            .unwrap_or_else(|| provider.default_model().to_string());

        let (api_key, key_source) = resolve_api_key(overrides.api_key.clone(), provider);

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            inter_row_delay: overrides
                .inter_row_delay_ms
                .or(file.inter_row_delay_ms)
                .map_or(defaults.inter_row_delay, Duration::from_millis),
            retry: RetryPolicy {
                max_retries: overrides
                    .max_retries
                    .or(file.max_retries)
                    .unwrap_or(defaults.retry.max_retries),
                base_delay: file
                    .retry_base_delay_ms
                    .map_or(defaults.retry.base_delay, Duration::from_millis),
            },
        };

        let request_timeout = Duration::from_secs(
            overrides
                .request_timeout_secs
                .or(file.request_timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );

        Ok(Self {
            provider,
            model,
            api_key,
            key_source,
            base_url: non_blank(overrides.base_url.clone()).or_else(|| non_blank(file.base_url.clone())),
            temperature: overrides.temperature.or(file.temperature),
            max_tokens: overrides.max_tokens.or(file.max_tokens),
            request_timeout,
            engine,
        })
    }

    /// Builds the provider client these settings describe.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MissingApiKey` when no key was found, and
    /// any error `ProviderClientBuilder::build` can return.
    pub fn build_client(&self) -> Result<ProviderClient, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or(ConfigurationError::MissingApiKey)?;

        let mut builder = ProviderClientBuilder::new()
            .provider(self.provider)
            .api_key(key.expose())
            .model(&self.model)
            .timeout(self.request_timeout);
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(temperature) = self.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        builder.build()
    }
}

fn resolve_api_key(flag: Option<String>, provider: ProviderKind) -> (Option<ApiKey>, KeySource) {
    if let Some(key) = non_blank(flag) {
        return (Some(ApiKey::new(key)), KeySource::Flag);
    }

    std::iter::once(API_KEY_ENV)
        .chain(provider.api_key_env_vars().iter().copied())
        .find_map(|name| env_var(name).map(|key| (Some(ApiKey::new(key)), KeySource::Env(name))))
        .unwrap_or((None, KeySource::Unset))
}

/// Reads an environment variable, treating blank values as unset.
fn env_var(name: &str) -> Option<String> {
    non_blank(std::env::var(name).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: [&str; 8] = [
        CONFIG_ENV,
        PROVIDER_ENV,
        MODEL_ENV,
        API_KEY_ENV,
        "GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "OPENAI_API_KEY",
        "OPENROUTER_API_KEY",
    ];

    fn clear_env() {
        for name in ALL_VARS {
            unsafe {
                std::env::remove_var(name);
            }
        }
    }

    fn set_env(name: &str, value: &str) {
        unsafe {
            std::env::set_var(name, value);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_any_source() {
        clear_env();

        let settings = Settings::resolve(&Overrides::default(), &FileConfig::default()).unwrap();

        assert_eq!(settings.provider, ProviderKind::Google);
        assert_eq!(settings.model, "gemini-2.5-flash");
        assert_eq!(settings.key_source, KeySource::Unset);
        assert!(settings.api_key.is_none());
        assert_eq!(settings.engine, EngineConfig::default());
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn flag_beats_env_beats_file() {
        clear_env();
        set_env(PROVIDER_ENV, "openai");
        set_env(MODEL_ENV, "gpt-env");
        let file = FileConfig {
            provider: Some("openrouter".to_string()),
            model: Some("file-model".to_string()),
            ..FileConfig::default()
        };

        let settings = Settings::resolve(&Overrides::default(), &file).unwrap();
        assert_eq!(settings.provider, ProviderKind::OpenAi);
        assert_eq!(settings.model, "gpt-env");

        let overrides = Overrides {
            provider: Some("google".to_string()),
            model: Some("gemini-flag".to_string()),
            ..Overrides::default()
        };
        let settings = Settings::resolve(&overrides, &file).unwrap();
        assert_eq!(settings.provider, ProviderKind::Google);
        assert_eq!(settings.model, "gemini-flag");

        clear_env();
    }

    #[test]
    #[serial]
    fn file_model_is_ignored_for_a_different_provider() {
        clear_env();
        let file = FileConfig {
            provider: Some("openrouter".to_string()),
            model: Some("anthropic/claude-3.5-haiku".to_string()),
            ..FileConfig::default()
        };

        let same = Settings::resolve(&Overrides::default(), &file).unwrap();
        assert_eq!(same.model, "anthropic/claude-3.5-haiku");

        let overrides = Overrides {
            provider: Some("openai".to_string()),
            ..Overrides::default()
        };
        let other = Settings::resolve(&overrides, &file).unwrap();
        assert_eq!(other.model, "gpt-4o-mini");
    }

    #[test]
    #[serial]
    fn api_key_prefers_flag_then_generic_then_provider_var() {
        clear_env();
        set_env("OPENAI_API_KEY", "sk-provider");
        let overrides = Overrides {
            provider: Some("openai".to_string()),
            ..Overrides::default()
        };

        let settings = Settings::resolve(&overrides, &FileConfig::default()).unwrap();
        assert_eq!(settings.key_source, KeySource::Env("OPENAI_API_KEY"));
        assert_eq!(settings.api_key.as_ref().map(ApiKey::expose), Some("sk-provider"));

        set_env(API_KEY_ENV, "sk-generic");
        let settings = Settings::resolve(&overrides, &FileConfig::default()).unwrap();
        assert_eq!(settings.key_source, KeySource::Env(API_KEY_ENV));

        let with_flag = Overrides {
            api_key: Some("sk-flag".to_string()),
            ..overrides
        };
        let settings = Settings::resolve(&with_flag, &FileConfig::default()).unwrap();
        assert_eq!(settings.key_source, KeySource::Flag);
        assert_eq!(settings.api_key.as_ref().map(ApiKey::expose), Some("sk-flag"));

        clear_env();
    }

    #[test]
    #[serial]
    fn key_for_another_provider_is_not_used() {
        clear_env();
        set_env("OPENAI_API_KEY", "sk-openai");

        let settings = Settings::resolve(&Overrides::default(), &FileConfig::default()).unwrap();
        assert_eq!(settings.key_source, KeySource::Unset);

        let err = settings.build_client().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::MissingApiKey)
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn unknown_provider_is_rejected() {
        clear_env();
        let overrides = Overrides {
            provider: Some("mistral".to_string()),
            ..Overrides::default()
        };

        let err = Settings::resolve(&overrides, &FileConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Configuration(ConfigurationError::UnknownProvider(_))
        ));
    }

    #[test]
    #[serial]
    fn engine_settings_come_from_overrides_and_file() {
        clear_env();
        let file = FileConfig {
            inter_row_delay_ms: Some(250),
            max_retries: Some(5),
            retry_base_delay_ms: Some(100),
            request_timeout_secs: Some(30),
            ..FileConfig::default()
        };
        let overrides = Overrides {
            max_retries: Some(1),
            ..Overrides::default()
        };

        let settings = Settings::resolve(&overrides, &file).unwrap();

        assert_eq!(settings.engine.inter_row_delay, Duration::from_millis(250));
        assert_eq!(settings.engine.retry.max_retries, 1);
        assert_eq!(settings.engine.retry.base_delay, Duration::from_millis(100));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn generation_settings_come_from_overrides_and_file() {
        clear_env();
        let file = FileConfig {
            temperature: Some(0.1),
            max_tokens: Some(100),
            ..FileConfig::default()
        };
        let overrides = Overrides {
            api_key: Some("k".to_string()),
            max_tokens: Some(50),
            ..Overrides::default()
        };

        let settings = Settings::resolve(&overrides, &file).unwrap();

        assert_eq!(settings.temperature, Some(0.1));
        assert_eq!(settings.max_tokens, Some(50));
        let debug = format!("{:?}", settings.build_client().unwrap());
        assert!(debug.contains("max_tokens: Some(50)"));
        assert!(!debug.contains("\"k\""));
    }

    #[test]
    #[serial]
    fn config_path_prefers_explicit_then_env() {
        clear_env();
        let explicit = Path::new("/tmp/explicit.json");
        assert_eq!(config_path(Some(explicit)), Some(explicit.to_path_buf()));

        set_env(CONFIG_ENV, "/tmp/from-env.json");
        assert_eq!(config_path(None), Some(PathBuf::from("/tmp/from-env.json")));

        clear_env();
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn file_is_parsed_and_unknown_fields_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"provider": "gemini", "max_retries": 2, "theme": "dark"}"#)
            .unwrap();

        let config = FileConfig::load(&path).unwrap();

        assert_eq!(config.provider.as_deref(), Some("gemini"));
        assert_eq!(config.max_retries, Some(2));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.json"));
    }
}
