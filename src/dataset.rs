//! Reading input datasets from CSV and writing annotated rows back out.

use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexSet;
use thiserror::Error;
use tracing::debug;

use crate::models::Row;

/// Errors that can occur when reading or writing dataset CSV.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file is not valid CSV or could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input has no header row
    #[error("CSV file has no header row")]
    MissingHeader,

    #[error("CSV data too large (max {limit} bytes)")]
    TooLarge { limit: u64 },

    #[error("CSV contains too many rows ({rows}, max {limit})")]
    TooManyRows { rows: usize, limit: usize },
}

/// Size caps applied to unattended input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetLimits {
    pub max_bytes: u64,
    pub max_rows: usize,
}

impl Default for DatasetLimits {
    /// 10 MiB and 10,000 data rows.
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_rows: 10_000,
        }
    }
}

/// A parsed CSV file: its header row and one `Row` per record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    /// Parses CSV with a header row.
    ///
    /// Empty lines are skipped. Short records are padded with empty values;
    /// cells beyond the header width are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use dtag::dataset::Dataset;
    ///
    /// let csv = "id,comment\n1,Great service!\n\n2\n";
    /// let dataset = Dataset::read_csv(csv.as_bytes()).unwrap();
    ///
    /// assert_eq!(dataset.headers, vec!["id", "comment"]);
    /// assert_eq!(dataset.rows.len(), 2);
    /// assert_eq!(dataset.rows[1].get("comment"), Some(""));
    /// ```
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(DatasetError::MissingHeader);
        }

        let mut rows = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() > headers.len() {
                debug!(
                    record = index + 1,
                    cells = record.len(),
                    columns = headers.len(),
                    "Ignoring cells beyond the header row"
                );
            }
            let row: Row = headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.as_str(), record.get(i).unwrap_or_default()))
                .collect();
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Parses CSV like [`read_csv`](Self::read_csv), refusing input beyond
    /// `limits`.
    ///
    /// At most `max_bytes + 1` bytes are read, so oversized input is rejected
    /// without loading all of it.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::TooLarge` or `DatasetError::TooManyRows` when a
    /// limit is exceeded, and any error `read_csv` can return.
    pub fn read_csv_limited<R: Read>(reader: R, limits: DatasetLimits) -> Result<Self, DatasetError> {
        let mut data = Vec::new();
        reader
            .take(limits.max_bytes.saturating_add(1))
            .read_to_end(&mut data)?;
        if data.len() as u64 > limits.max_bytes {
            return Err(DatasetError::TooLarge {
                limit: limits.max_bytes,
            });
        }

        let dataset = Self::read_csv(data.as_slice())?;
        if dataset.len() > limits.max_rows {
            return Err(DatasetError::TooManyRows {
                rows: dataset.len(),
                limit: limits.max_rows,
            });
        }
        Ok(dataset)
    }

    pub fn read_path(path: &Path) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path)?;
        Self::read_csv(file)
    }

    pub fn read_path_limited(path: &Path, limits: DatasetLimits) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path)?;
        Self::read_csv_limited(file, limits)
    }

    /// Returns `true` if the header row names `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|header| header == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Returns `headers` followed by every other column found in `rows`, in
/// first-seen order.
pub fn output_columns(headers: &[String], rows: &[Row]) -> Vec<String> {
    let mut columns: IndexSet<&str> = headers.iter().map(String::as_str).collect();
    for row in rows {
        columns.extend(row.columns());
    }
    columns.into_iter().map(str::to_string).collect()
}

/// Writes annotated rows as CSV.
///
/// Columns follow [`output_columns`]; a row missing a column gets an empty
/// cell, so error rows and successful rows share one header.
pub fn write_csv<W: Write>(writer: W, headers: &[String], rows: &[Row]) -> Result<(), DatasetError> {
    let columns = output_columns(headers, rows);
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(&columns)?;
    for row in rows {
        csv_writer.write_record(
            columns
                .iter()
                .map(|column| row.get(column).unwrap_or_default()),
        )?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_path(path: &Path, headers: &[String], rows: &[Row]) -> Result<(), DatasetError> {
    let file = std::fs::File::create(path)?;
    write_csv(file, headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_quoted_fields_with_commas() {
        let csv = "id,comment\n1,\"Terrible, slow.\"\n";
        let dataset = Dataset::read_csv(csv.as_bytes()).unwrap();

        assert_eq!(dataset.rows[0].get("comment"), Some("Terrible, slow."));
        assert!(dataset.has_column("comment"));
        assert!(!dataset.has_column("Comment"));
    }

    #[test]
    fn strips_byte_order_mark_from_first_header() {
        let csv = "\u{feff}id,comment\n1,hi\n";
        let dataset = Dataset::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(dataset.headers[0], "id");
        assert_eq!(dataset.rows[0].get("id"), Some("1"));
    }

    #[test]
    fn extra_cells_are_ignored() {
        let csv = "id,comment\n1,hi,surplus\n";
        let dataset = Dataset::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(dataset.rows[0].len(), 2);
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = Dataset::read_csv("".as_bytes()).unwrap_err();
        assert!(matches!(err, DatasetError::MissingHeader));
    }

    #[test]
    fn limits_reject_oversized_input() {
        let csv = "id,comment\n1,a\n2,b\n";
        let tight = DatasetLimits {
            max_bytes: 10,
            max_rows: 10,
        };

        let err = Dataset::read_csv_limited(csv.as_bytes(), tight).unwrap_err();
        assert!(matches!(err, DatasetError::TooLarge { limit: 10 }));

        let exact = DatasetLimits {
            max_bytes: csv.len() as u64,
            max_rows: 2,
        };
        assert_eq!(Dataset::read_csv_limited(csv.as_bytes(), exact).unwrap().len(), 2);
    }

    #[test]
    fn limits_reject_too_many_rows() {
        let csv = "id\n1\n2\n3\n";
        let limits = DatasetLimits {
            max_rows: 2,
            ..DatasetLimits::default()
        };

        let err = Dataset::read_csv_limited(csv.as_bytes(), limits).unwrap_err();
        assert!(matches!(err, DatasetError::TooManyRows { rows: 3, limit: 2 }));
        assert_eq!(err.to_string(), "CSV contains too many rows (3, max 2)");
    }

    #[test]
    fn default_limits_match_unattended_caps() {
        let limits = DatasetLimits::default();
        assert_eq!(limits.max_bytes, 10_485_760);
        assert_eq!(limits.max_rows, 10_000);
    }

    #[test]
    fn header_only_input_has_no_rows() {
        let dataset = Dataset::read_csv("id,comment\n".as_bytes()).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.len(), 0);
    }

    #[test]
    fn output_columns_append_new_keys_in_first_seen_order() {
        let headers = vec!["id".to_string(), "comment".to_string()];
        let ok: Row = [("id", "1"), ("comment", "a"), ("AI_Tags", ""), ("Positive", "0")]
            .into_iter()
            .collect();
        let failed: Row = [
            ("id", "2"),
            ("comment", "b"),
            ("AI_Tags", ""),
            ("Positive", "0"),
            ("AI_Error", "boom"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            output_columns(&headers, &[ok, failed]),
            vec!["id", "comment", "AI_Tags", "Positive", "AI_Error"]
        );
    }

    #[test]
    fn write_fills_missing_cells_with_empty_values() {
        let headers = vec!["id".to_string()];
        let rows: Vec<Row> = vec![
            [("id", "1"), ("AI_Tags", "Positive")].into_iter().collect(),
            [("id", "2"), ("AI_Tags", ""), ("AI_Error", "Network error")]
                .into_iter()
                .collect(),
        ];

        let mut out = Vec::new();
        write_csv(&mut out, &headers, &rows).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id,AI_Tags,AI_Error\n1,Positive,\n2,,Network error\n"
        );
    }
}
