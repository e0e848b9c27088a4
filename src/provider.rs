//! Provider adapter: one "classify this prompt" call over several LLM backends.
//!
//! The backend is chosen once, when a [`ProviderClient`] is built, from the
//! closed [`ProviderKind`] set. The adapter issues exactly one HTTP request per
//! call and never retries; retry policy belongs to the engine.
mod chat;
mod client;
mod error;
mod google;
mod kind;

pub use client::{ApiKey, ClassifierClient, ProviderClient, ProviderClientBuilder, classify};
pub use error::ProviderError;
pub use kind::ProviderKind;
