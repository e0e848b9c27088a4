//! OpenAI-compatible chat completions, shared by OpenAI and OpenRouter.

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};

use crate::error::ConfigurationError;

use super::client::Generation;

pub(super) const OPENAI_PATH: &str = "/v1/chat/completions";
pub(super) const OPENROUTER_PATH: &str = "/api/v1/chat/completions";

/// Attribution headers OpenRouter uses to identify the calling application.
pub(super) const OPENROUTER_HEADERS: [(&str, &str); 2] = [
    ("HTTP-Referer", "https://github.com/dtag/dtag"),
    ("X-Title", "dtag"),
];

/// Joins `base_url` (no trailing slash) and a completions path.
pub(super) fn endpoint(base_url: &str, path: &str) -> Result<Url, ConfigurationError> {
    let url = format!("{base_url}{path}");
    Url::parse(&url).map_err(|e| ConfigurationError::InvalidUrl(format!("{url}: {e}")))
}

/// Builds a single-message chat completion request with bearer auth.
pub(super) fn prepare(
    http: &Client,
    endpoint: &Url,
    model: &str,
    api_key: &str,
    prompt: &str,
    generation: Generation,
    extra_headers: &[(&str, &str)],
) -> RequestBuilder {
    let mut request = http
        .post(endpoint.clone())
        .bearer_auth(api_key)
        .json(&request_body(model, prompt, generation));
    for (name, value) in extra_headers {
        request = request.header(*name, *value);
    }
    request
}

fn request_body(model: &str, prompt: &str, generation: Generation) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }]
    });
    if let Some(temperature) = generation.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = generation.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

/// Returns `choices[0].message.content`.
pub(super) fn extract_text(response: &Value) -> Option<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}
