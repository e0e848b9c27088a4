use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::engine::{JobState, RunOutcome};

/// How often one top-level tag was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCount {
    pub name: String,
    pub count: usize,
    /// Share of output rows, in percent, rounded to one decimal place.
    pub percentage: f64,
}

impl TagCount {
    /// Tallies every tag column of `outcome`, in column order.
    ///
    /// Percentages are relative to the rows in the output, so a stopped run
    /// is measured against what it actually produced. With no output rows
    /// every percentage is 0.
    pub fn tally(outcome: &RunOutcome) -> Vec<Self> {
        let total = outcome.rows.len();
        outcome
            .tag_columns
            .iter()
            .map(|name| {
                let count = outcome.tag_count(name);
                Self {
                    name: name.clone(),
                    count,
                    percentage: percentage(count, total),
                }
            })
            .collect()
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Machine-readable summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub state: JobState,
    pub total_rows: usize,
    pub rows_processed: usize,
    /// Output rows carrying an `AI_Error`, including rows synthesized after
    /// a fatal error.
    pub rows_failed: usize,
    /// Output rows with at least one matched tag.
    pub rows_tagged: usize,
    /// Top-level tag names that became output columns.
    pub tags_applied: Vec<String>,
    pub tag_counts: Vec<TagCount>,
    pub provider: String,
    pub model: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl RunReport {
    /// Summarizes `outcome`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dtag::engine::{JobState, RunOutcome};
    /// use dtag::report::RunReport;
    /// use time::OffsetDateTime;
    ///
    /// let outcome = RunOutcome {
    ///     state: JobState::Completed,
    ///     rows: Vec::new(),
    ///     tag_columns: vec!["Positive".to_string()],
    ///     total_rows: 0,
    ///     rows_processed: 0,
    ///     message: "Processing complete!".to_string(),
    /// };
    /// let now = OffsetDateTime::now_utc();
    /// let report = RunReport::new(&outcome, "google", "gemini-2.5-flash", now, now);
    ///
    /// assert_eq!(report.tags_applied, vec!["Positive"]);
    /// ```
    pub fn new(
        outcome: &RunOutcome,
        provider: impl Into<String>,
        model: impl Into<String>,
        started_at: OffsetDateTime,
        finished_at: OffsetDateTime,
    ) -> Self {
        Self {
            state: outcome.state,
            total_rows: outcome.total_rows,
            rows_processed: outcome.rows_processed,
            rows_failed: outcome.rows_failed(),
            rows_tagged: outcome.rows_tagged(),
            tags_applied: outcome.tag_columns.clone(),
            tag_counts: TagCount::tally(outcome),
            provider: provider.into(),
            model: model.into(),
            message: outcome.message.clone(),
            started_at,
            finished_at,
        }
    }

    /// Writes the report as pretty-printed JSON.
    pub fn write_path(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json + "\n")
    }
}
