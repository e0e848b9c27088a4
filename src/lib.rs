pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod models;
pub mod prompt;
pub mod provider;
pub mod report;
pub mod taxonomy;

pub use engine::{ClassificationJob, ClassificationJobBuilder, JobControl, JobState, RunOutcome};
pub use error::ConfigurationError;
pub use matcher::match_tags;
pub use models::{FlatTag, Row, Tag, TagId};
pub use prompt::build_prompt;
pub use provider::{ClassifierClient, ProviderClient, ProviderClientBuilder, ProviderError, ProviderKind};
