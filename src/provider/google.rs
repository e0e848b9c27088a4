//! Google Generative Language API (`generateContent`).

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};

use crate::error::ConfigurationError;

use super::client::Generation;

/// Builds the `generateContent` request; the key travels in `x-goog-api-key`.
pub(super) fn prepare(
    http: &Client,
    endpoint: &Url,
    api_key: &str,
    prompt: &str,
    generation: Generation,
) -> RequestBuilder {
    http.post(endpoint.clone())
        .header("x-goog-api-key", api_key)
        .json(&request_body(prompt, generation))
}

/// Appends `/v1beta/models/{model}:generateContent` to `base_url`.
///
/// The model id becomes a single path segment, so `/`, `?` and spaces in it
/// are percent-encoded rather than changing the request path.
pub(super) fn endpoint(base_url: &str, model: &str) -> Result<Url, ConfigurationError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ConfigurationError::InvalidUrl(format!("{base_url}: {e}")))?;
    let method = format!("{model}:generateContent");
    url.path_segments_mut()
        .map_err(|()| ConfigurationError::InvalidUrl(format!("{base_url}: cannot be a base URL")))?
        .pop_if_empty()
        .extend(["v1beta", "models", method.as_str()]);
    Ok(url)
}

fn request_body(prompt: &str, generation: Generation) -> Value {
    let mut body = json!({
        "contents": [{
            "parts": [{ "text": prompt }]
        }]
    });

    let mut config = serde_json::Map::new();
    if let Some(temperature) = generation.temperature {
        config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(max_tokens) = generation.max_tokens {
        config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if !config.is_empty() {
        body["generationConfig"] = Value::Object(config);
    }
    body
}

/// Returns the text of the first candidate, joining its non-thought parts.
pub(super) fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)?;

    let texts: Vec<&str> = parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}
