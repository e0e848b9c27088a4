//! The classification run loop.
//!
//! A [`ClassificationJob`] walks a dataset strictly in order, one provider
//! call at a time, and turns every input row into an annotated output row.
//! Rows with an empty comment are tagged without a provider call. Rate-limit
//! failures are retried with exponential backoff; if they persist, the run
//! ends in [`JobState::Fatal`] and every remaining row is marked with an
//! error. Any other failure only affects its own row.
//!
//! The caller drives the job through a [`JobControl`] handle and observes it
//! through an optional channel of [`Progress`] events.

mod assembler;
mod control;
mod retry;

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::ConfigurationError;
use crate::matcher::match_tags;
use crate::models::{Row, Tag};
use crate::prompt::PromptBuilder;
use crate::provider::ClassifierClient;
use crate::taxonomy::{column_collisions, duplicate_names, flatten, names_with_commas};

pub use assembler::{AI_ERROR_COLUMN, AI_TAGS_COLUMN, QUOTA_STOP_MESSAGE, assemble_row};
pub use control::JobControl;
pub use retry::RetryPolicy;

use control::WakeOn;
use retry::{Attempt, call_with_backoff, format_seconds};

const STATUS_COMPLETE: &str = "Processing complete!";
const STATUS_STOPPED: &str = "Processing stopped by user";
const STATUS_FATAL: &str = "Processing stopped due to API error";
const STATUS_PAUSED: &str = "Paused";

/// Lifecycle of a classification job.
///
/// `Running` and `Paused` are the only reversible pair; `Completed`,
/// `Stopped` and `Fatal` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
    Fatal,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Fatal)
    }

    /// Returns `true` if the state machine allows moving to `next`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Stopped)
                | (Running, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Stopped)
                | (Running, Fatal)
                | (Paused, Running)
                | (Paused, Stopped)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// A snapshot published on every row boundary and state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub rows_done: usize,
    pub total_rows: usize,
    pub status: String,
    pub state: JobState,
}

impl Progress {
    /// Completed share of the dataset in `0.0..=1.0`; an empty dataset is done.
    pub fn fraction(&self) -> f64 {
        if self.total_rows == 0 {
            1.0
        } else {
            self.rows_done as f64 / self.total_rows as f64
        }
    }
}

/// Pacing knobs for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pause after each row that reached the provider, except the last.
    pub inter_row_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inter_row_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

/// The final result of a run. Always produced, whatever the terminal state.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: JobState,
    /// Annotated rows in input order.
    ///
    /// Complete for `Completed` and `Fatal`; for `Stopped`, only the rows
    /// finished before the stop.
    pub rows: Vec<Row>,
    /// Top-level tag names, in the order their columns were added.
    pub tag_columns: Vec<String>,
    pub total_rows: usize,
    /// Rows that went through classification, excluding rows synthesized
    /// after a fatal error.
    pub rows_processed: usize,
    pub message: String,
}

impl RunOutcome {
    /// Number of output rows carrying an `AI_Error`.
    pub fn rows_failed(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.contains(AI_ERROR_COLUMN))
            .count()
    }

    /// Number of output rows with at least one matched tag.
    pub fn rows_tagged(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.get(AI_TAGS_COLUMN).is_some_and(|tags| !tags.trim().is_empty()))
            .count()
    }

    /// Number of output rows whose column for `tag` is `"1"`.
    pub fn tag_count(&self, tag: &str) -> usize {
        self.rows
            .iter()
            .filter(|row| row.get(tag) == Some("1"))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.state == JobState::Completed
    }
}

/// Builder for constructing `ClassificationJob` instances.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dtag::{ClassifierClient, ProviderError, Row, Tag};
/// use dtag::engine::{ClassificationJobBuilder, EngineConfig, JobState};
///
/// struct AlwaysPositive;
///
/// impl ClassifierClient for AlwaysPositive {
///     fn classify(&self, _prompt: &str) -> Result<String, ProviderError> {
///         Ok("Positive".to_string())
///     }
/// }
///
/// let rows: Vec<Row> = vec![[("comment", "Great service!")].into_iter().collect()];
/// let job = ClassificationJobBuilder::new()
///     .rows(rows)
///     .target_column("comment")
///     .tags(vec![Tag::new("Positive"), Tag::new("Negative")])
///     .client(Arc::new(AlwaysPositive))
///     .config(EngineConfig { inter_row_delay: Default::default(), ..Default::default() })
///     .build()
///     .expect("valid job");
///
/// let outcome = job.run();
/// assert_eq!(outcome.state, JobState::Completed);
/// assert_eq!(outcome.rows[0].get("Positive"), Some("1"));
/// ```
#[derive(Default)]
pub struct ClassificationJobBuilder {
    rows: Vec<Row>,
    target_column: Option<String>,
    tags: Vec<Tag>,
    client: Option<Arc<dyn ClassifierClient>>,
    config: EngineConfig,
    progress: Option<Sender<Progress>>,
}

impl ClassificationJobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// Names the column whose text is classified.
    pub fn target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    pub fn tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn client(mut self, client: Arc<dyn ClassifierClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sends progress events to `sender`. Send failures are ignored.
    pub fn progress(mut self, sender: Sender<Progress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Validates the inputs and prepares the job.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` when there are no usable tags, two
    /// tags share a name (case-insensitively), a name contains a comma, the
    /// client or target column is missing, the first row has no such column,
    /// or a top-level tag is named like `AI_Tags`, `AI_Error` or a column of
    /// the first row.
    pub fn build(self) -> Result<ClassificationJob, ConfigurationError> {
        let flat = flatten(&self.tags);
        if flat.is_empty() {
            return Err(ConfigurationError::NoTags);
        }
        if let Some(name) = duplicate_names(&flat).first() {
            return Err(ConfigurationError::DuplicateTagName(name.to_string()));
        }
        if let Some(name) = names_with_commas(&flat).first() {
            return Err(ConfigurationError::TagNameContainsComma(name.to_string()));
        }

        let client = self.client.ok_or(ConfigurationError::MissingClient)?;

        let target_column = self
            .target_column
            .filter(|column| !column.trim().is_empty())
            .ok_or(ConfigurationError::MissingTargetColumn)?;
        if let Some(first) = self.rows.first()
            && !first.contains(&target_column)
        {
            return Err(ConfigurationError::ColumnNotFound(target_column));
        }

        let input_columns: Vec<&str> = self
            .rows
            .first()
            .map(|first| first.columns().collect())
            .unwrap_or_default();
        if let Some(name) = column_collisions(&flat, &input_columns).first() {
            return Err(ConfigurationError::TagNameCollidesWithColumn(name.to_string()));
        }

        let known_names = flat.iter().map(|tag| tag.name().to_string()).collect();
        let tag_columns = flat
            .iter()
            .filter(|tag| tag.is_top_level())
            .map(|tag| tag.name().to_string())
            .collect();
        let prompt = PromptBuilder::new(&flat);

        Ok(ClassificationJob {
            rows: self.rows,
            target_column,
            prompt,
            known_names,
            tag_columns,
            client,
            config: self.config,
            progress: self.progress,
            control: JobControl::new(),
            state: JobState::Idle,
        })
    }
}

/// One pass over a dataset. Created with `ClassificationJobBuilder`.
pub struct ClassificationJob {
    rows: Vec<Row>,
    target_column: String,
    prompt: PromptBuilder,
    known_names: Vec<String>,
    tag_columns: Vec<String>,
    client: Arc<dyn ClassifierClient>,
    config: EngineConfig,
    progress: Option<Sender<Progress>>,
    control: JobControl,
    state: JobState,
}

impl ClassificationJob {
    /// Returns a handle for pausing, resuming or stopping this job.
    ///
    /// Take it before calling [`run`](Self::run), typically before moving the
    /// job onto a worker thread.
    pub fn control(&self) -> JobControl {
        self.control.clone()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    /// Top-level tag names that become 0/1 output columns.
    pub fn tag_columns(&self) -> &[String] {
        &self.tag_columns
    }

    /// Runs the job to a terminal state and returns its output.
    ///
    /// Blocks the calling thread for the duration of the run.
    pub fn run(mut self) -> RunOutcome {
        let rows = std::mem::take(&mut self.rows);
        let total = rows.len();
        let mut output: Vec<Row> = Vec::with_capacity(total);

        info!(
            total_rows = total,
            target_column = %self.target_column,
            tags = self.known_names.len(),
            client = %self.client.describe(),
            "Starting classification job"
        );
        self.transition(
            JobState::Running,
            0,
            total,
            format!("Starting classification of {total} rows..."),
        );

        for (index, row) in rows.iter().enumerate() {
            let number = index + 1;

            if self.control.is_stop_requested() {
                return self.finish_stopped(output, total);
            }
            if self.control.is_paused() {
                self.transition(JobState::Paused, index, total, STATUS_PAUSED.to_string());
                if self.control.wait_while_paused() {
                    return self.finish_stopped(output, total);
                }
                self.transition(JobState::Running, index, total, "Resumed".to_string());
            }

            let comment = row.get(&self.target_column).unwrap_or_default();
            if comment.trim().is_empty() {
                debug!(row = number, "Empty comment; skipping provider call");
                output.push(assemble_row(row, &[], &self.tag_columns, None));
                self.emit(number, total, format!("Processed row {number} of {total}"));
                continue;
            }

            self.emit(index, total, format!("Processing row {number} of {total}..."));
            let prompt = self.prompt.build(comment);
            debug!(row = number, prompt = %prompt, "Sending prompt");

            let attempt = call_with_backoff(
                &self.config.retry,
                &self.control,
                || self.client.classify(&prompt),
                |retry, delay, e| {
                    warn!(row = number, retry, delay = ?delay, error = %e, "Rate limited; backing off");
                    self.emit(
                        index,
                        total,
                        format!(
                            "Rate limited. Retrying row {number} in {}s...",
                            format_seconds(delay)
                        ),
                    );
                },
            );

            match attempt {
                Attempt::Interrupted => {
                    info!(row = number, "Stop requested during backoff; row abandoned");
                    return self.finish_stopped(output, total);
                }
                Attempt::Finished(Ok(reply)) => {
                    let matched = match_tags(&reply, &self.known_names);
                    debug!(row = number, reply = %reply, matched = ?matched, "Row classified");
                    output.push(assemble_row(row, &matched, &self.tag_columns, None));
                }
                Attempt::Finished(Err(e)) if e.is_rate_limited() => {
                    error!(row = number, error = %e, "Rate limit persisted after retries; stopping run");
                    let message = format!("API Error: {e}. Processing stopped at row {number}.");
                    for remaining in &rows[index..] {
                        output.push(assemble_row(
                            remaining,
                            &[],
                            &self.tag_columns,
                            Some(QUOTA_STOP_MESSAGE),
                        ));
                    }
                    return self.finish(JobState::Fatal, output, index, total, STATUS_FATAL, message);
                }
                Attempt::Finished(Err(e)) => {
                    warn!(row = number, error = %e, "Row failed");
                    let message = e.to_string();
                    output.push(assemble_row(row, &[], &self.tag_columns, Some(&message)));
                }
            }
            self.emit(number, total, format!("Processed row {number} of {total}"));

            if number < total && !self.config.inter_row_delay.is_zero() {
                // Pause and stop are picked up at the top of the next iteration.
                self.control
                    .sleep(self.config.inter_row_delay, WakeOn::StopOrPause);
            }
        }

        let done = output.len();
        self.finish(
            JobState::Completed,
            output,
            done,
            total,
            STATUS_COMPLETE,
            STATUS_COMPLETE.to_string(),
        )
    }

    fn finish_stopped(self, output: Vec<Row>, total: usize) -> RunOutcome {
        let done = output.len();
        let message = format!(
            "{STATUS_STOPPED}. Output contains the {done} of {total} rows processed before the stop."
        );
        self.finish(JobState::Stopped, output, done, total, STATUS_STOPPED, message)
    }

    fn finish(
        mut self,
        state: JobState,
        rows: Vec<Row>,
        rows_processed: usize,
        total: usize,
        status: &str,
        message: String,
    ) -> RunOutcome {
        let rows_done = if state == JobState::Stopped {
            rows.len()
        } else {
            total
        };
        self.transition(state, rows_done, total, status.to_string());
        info!(
            state = %state,
            rows_processed,
            total_rows = total,
            "Classification job finished"
        );

        RunOutcome {
            state,
            rows,
            tag_columns: self.tag_columns,
            total_rows: total,
            rows_processed,
            message,
        }
    }

    fn transition(&mut self, next: JobState, rows_done: usize, total: usize, status: String) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.emit(rows_done, total, status);
    }

    fn emit(&self, rows_done: usize, total_rows: usize, status: String) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(Progress {
                rows_done,
                total_rows,
                status,
                state: self.state,
            });
        }
    }
}
