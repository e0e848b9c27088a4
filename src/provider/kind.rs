use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// The supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Generative Language API (Gemini models)
    Google,
    /// OpenAI chat completions
    OpenAi,
    /// OpenRouter, an OpenAI-compatible model router
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Google, Self::OpenAi, Self::OpenRouter];

    /// Returns the identifier used on the command line and in config files.
    pub fn id(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
        }
    }

    /// Returns the public API root, without a trailing slash.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Google => "https://generativelanguage.googleapis.com",
            Self::OpenAi => "https://api.openai.com",
            Self::OpenRouter => "https://openrouter.ai",
        }
    }

    /// Returns the model used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Google => "gemini-2.5-flash",
            Self::OpenAi => "gpt-4o-mini",
            Self::OpenRouter => "openai/gpt-4o-mini",
        }
    }

    /// Returns the provider-specific environment variables that may hold an API key.
    pub fn api_key_env_vars(self) -> &'static [&'static str] {
        match self {
            Self::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::OpenRouter => &["OPENROUTER_API_KEY"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Google => "Google AI",
            Self::OpenAi => "OpenAI",
            Self::OpenRouter => "OpenRouter",
        };
        f.write_str(name)
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigurationError;

    /// Parses a provider id case-insensitively; `gemini` is accepted for Google.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(ConfigurationError::UnknownProvider(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_case_insensitively() {
        assert_eq!("google".parse::<ProviderKind>(), Ok(ProviderKind::Google));
        assert_eq!(" Gemini ".parse::<ProviderKind>(), Ok(ProviderKind::Google));
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!("OPENROUTER".parse::<ProviderKind>(), Ok(ProviderKind::OpenRouter));
    }

    #[test]
    fn unknown_id_is_a_configuration_error() {
        assert_eq!(
            "anthropic".parse::<ProviderKind>(),
            Err(ConfigurationError::UnknownProvider("anthropic".to_string()))
        );
    }

    #[test]
    fn id_round_trips_through_from_str() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.id().parse::<ProviderKind>(), Ok(kind));
        }
    }

    #[test]
    fn serde_uses_lowercase_ids() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::OpenRouter).unwrap(),
            "\"openrouter\""
        );
        let kind: ProviderKind = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
    }

    #[test]
    fn base_urls_have_no_trailing_slash() {
        for kind in ProviderKind::ALL {
            assert!(!kind.default_base_url().ends_with('/'));
            assert!(!kind.default_model().is_empty());
        }
    }
}
