/// Provider HTTP client implementation.
///
/// This module provides `ProviderClient` for making synchronous classification
/// requests to the configured backend, along with the builder that validates
/// its configuration and the `ClassifierClient` trait the engine talks to.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::error::ConfigurationError;

use super::error::{ProviderError, error_message};
use super::{ProviderKind, chat, google};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for classification backends.
///
/// This trait enables mocking in unit tests and lets the engine stay unaware
/// of which provider a job was configured with.
pub trait ClassifierClient: Send + Sync {
    /// Sends a fully rendered prompt and returns the model's raw text reply.
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` for transport failures, non-success
    /// statuses, and unparsable success bodies.
    fn classify(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Short label used in logs and run reports.
    fn describe(&self) -> String {
        "custom client".to_string()
    }
}

/// Optional sampling settings, sent only when set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct Generation {
    pub(super) temperature: Option<f32>,
    pub(super) max_tokens: Option<u32>,
}

/// An API credential that never prints itself.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key for use in request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Builder for constructing `ProviderClient` instances.
///
/// # Examples
///
/// ```
/// use dtag::provider::{ProviderClientBuilder, ProviderKind};
///
/// let client = ProviderClientBuilder::new()
///     .provider(ProviderKind::OpenAi)
///     .api_key("sk-test")
///     .model("gpt-4o-mini")
///     .build()
///     .expect("Failed to create client");
///
/// assert_eq!(client.base_url(), "https://api.openai.com");
/// ```
#[derive(Debug, Default)]
pub struct ProviderClientBuilder {
    provider: Option<ProviderKind>,
    api_key: Option<ApiKey>,
    model: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ProviderClientBuilder {
    /// Creates a new `ProviderClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the backend. Defaults to Google.
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    /// Sets the model identifier sent with every request.
    ///
    /// # Arguments
    ///
    /// * `model` - The model name (e.g., "gemini-2.5-flash" or "gpt-4o-mini")
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Overrides the provider's public API root (e.g. to reach a proxy).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-request timeout. Defaults to 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Caps the length of each reply (`maxOutputTokens` for Google,
    /// `max_tokens` for chat completions).
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Builds the `ProviderClient` with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` when the key or model is
    /// missing or blank, or the base URL does not parse or cannot carry a
    /// request path. Returns
    /// `ProviderError::Network` if the HTTP client cannot be created.
    pub fn build(self) -> Result<ProviderClient, ProviderError> {
        let provider = self.provider.unwrap_or(ProviderKind::Google);

        let api_key = self
            .api_key
            .filter(|key| !key.is_blank())
            .ok_or(ConfigurationError::MissingApiKey)?;

        let model = self
            .model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .ok_or(ConfigurationError::MissingModel)?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| provider.default_base_url().to_string());
        reqwest::Url::parse(&base_url)
            .map_err(|e| ConfigurationError::InvalidUrl(format!("{base_url}: {e}")))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let endpoint = match provider {
            ProviderKind::Google => google::endpoint(&base_url, &model)?,
            ProviderKind::OpenAi => chat::endpoint(&base_url, chat::OPENAI_PATH)?,
            ProviderKind::OpenRouter => chat::endpoint(&base_url, chat::OPENROUTER_PATH)?,
        };

        let http = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(ProviderClient {
            http,
            provider,
            api_key,
            model,
            base_url,
            endpoint,
            generation: Generation {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
        })
    }
}

/// Synchronous HTTP client for one provider, model and credential.
///
/// Constructed once per job with `ProviderClientBuilder`; the backend is
/// fixed at construction and dispatched with a `match`.
pub struct ProviderClient {
    http: Client,
    provider: ProviderKind,
    api_key: ApiKey,
    model: String,
    base_url: String,
    endpoint: Url,
    generation: Generation,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint.as_str())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ProviderClient {
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the API root requests are sent to, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the full URL every request is posted to.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn send(&self, prompt: &str) -> Result<String, ProviderError> {
        let key = self.api_key.expose();
        let request = match self.provider {
            ProviderKind::Google => {
                google::prepare(&self.http, &self.endpoint, key, prompt, self.generation)
            }
            ProviderKind::OpenAi => chat::prepare(
                &self.http,
                &self.endpoint,
                &self.model,
                key,
                prompt,
                self.generation,
                &[],
            ),
            ProviderKind::OpenRouter => chat::prepare(
                &self.http,
                &self.endpoint,
                &self.model,
                key,
                prompt,
                self.generation,
                &chat::OPENROUTER_HEADERS,
            ),
        };

        let response = request.send().map_err(ProviderError::from_transport)?;
        let status = response.status();
        let body = response.text().map_err(ProviderError::from_transport)?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: self.provider,
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(ProviderError::Serialization)?;

        let text = match self.provider {
            ProviderKind::Google => google::extract_text(&json),
            ProviderKind::OpenAi | ProviderKind::OpenRouter => chat::extract_text(&json),
        };

        match text {
            Some(text) => {
                debug!(provider = %self.provider, reply = %text, "Provider reply");
                Ok(text)
            }
            None => {
                warn!(
                    provider = %self.provider,
                    model = %self.model,
                    "Provider response had no text; treating as no tags"
                );
                Ok(String::new())
            }
        }
    }
}

impl ClassifierClient for ProviderClient {
    fn classify(&self, prompt: &str) -> Result<String, ProviderError> {
        self.send(prompt)
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.provider, self.model)
    }
}

/// Sends one prompt to the named provider with a throwaway client.
///
/// Convenience for single calls; runs over a dataset should build one
/// `ProviderClient` and reuse it.
///
/// # Arguments
///
/// * `provider_id` - `google`, `openai` or `openrouter` (case-insensitive)
/// * `api_key` - The credential for that provider
/// * `model` - The model identifier
/// * `prompt` - The complete prompt text
///
/// # Errors
///
/// Returns `ProviderError::Configuration` for an unknown provider or a
/// missing key or model, and any error `ProviderClient` can produce.
pub fn classify(
    provider_id: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
) -> Result<String, ProviderError> {
    let provider = ProviderKind::from_str(provider_id)?;
    ProviderClientBuilder::new()
        .provider(provider)
        .api_key(api_key)
        .model(model)
        .build()?
        .classify(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ProviderClientBuilder {
        ProviderClientBuilder::new().api_key("secret-key").model("m")
    }

    #[test]
    fn builder_defaults_to_google() {
        let client = builder().build().unwrap();

        assert_eq!(client.provider(), ProviderKind::Google);
        assert_eq!(client.base_url(), "https://generativelanguage.googleapis.com");
        assert_eq!(client.model(), "m");
    }

    #[test]
    fn missing_or_blank_key_is_rejected() {
        let err = ProviderClientBuilder::new().model("m").build().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::MissingApiKey)
        ));

        let err = builder().api_key("   ").build().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::MissingApiKey)
        ));
    }

    #[test]
    fn missing_or_blank_model_is_rejected() {
        let err = ProviderClientBuilder::new()
            .api_key("k")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::MissingModel)
        ));

        let err = builder().model("").build().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::MissingModel)
        ));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = builder().base_url("not a url").build().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = builder()
            .provider(ProviderKind::OpenRouter)
            .base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn endpoint_is_resolved_per_provider() {
        let google = builder().model("tuned/gemini").build().unwrap();
        assert_eq!(
            google.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/tuned%2Fgemini:generateContent"
        );

        let openrouter = builder()
            .provider(ProviderKind::OpenRouter)
            .model("openai/gpt-4o-mini")
            .build()
            .unwrap();
        assert_eq!(openrouter.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn base_url_that_cannot_carry_a_path_is_rejected() {
        let err = builder().base_url("mailto:ops@example.com").build().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn debug_output_never_contains_the_key() {
        let client = builder().build().unwrap();
        let debug = format!("{client:?}");

        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("ProviderClient"));

        let key = ApiKey::new("secret-key");
        assert_eq!(format!("{key:?}"), "ApiKey(****)");
        assert_eq!(key.to_string(), "****");
        assert_eq!(key.expose(), "secret-key");
    }

    #[test]
    fn describe_names_provider_and_model() {
        let client = builder()
            .provider(ProviderKind::OpenAi)
            .model("gpt-4o-mini")
            .build()
            .unwrap();
        assert_eq!(client.describe(), "OpenAI (gpt-4o-mini)");
    }

    #[test]
    fn classify_rejects_unknown_provider_before_any_request() {
        let err = classify("anthropic", "k", "m", "prompt").unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::UnknownProvider(_))
        ));
    }

    #[test]
    fn classify_rejects_missing_key_before_any_request() {
        let err = classify("openai", "", "gpt-4o-mini", "prompt").unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::MissingApiKey)
        ));
    }
}
