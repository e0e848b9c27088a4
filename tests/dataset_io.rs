/// File-level tests: datasets and tag lists read from disk, annotated output
/// written back.
use std::sync::Arc;
use std::time::Duration;

use dtag::dataset::{self, Dataset, DatasetError, DatasetLimits};
use dtag::engine::{ClassificationJobBuilder, EngineConfig, JobState, RetryPolicy};
use dtag::taxonomy::{self, ImportError, TagNormalizer};
use dtag::{ClassifierClient, ProviderError, ProviderKind};

struct FirstRowFails;

impl ClassifierClient for FirstRowFails {
    fn classify(&self, prompt: &str) -> Result<String, ProviderError> {
        if prompt.contains("\"Broken, row\"") {
            return Err(ProviderError::Status {
                provider: ProviderKind::OpenAi,
                status: 500,
                message: "Internal error".to_string(),
            });
        }
        Ok("Shipping, Late delivery".to_string())
    }
}

#[test]
fn classify_csv_file_and_write_annotated_copy() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("survey.csv");
    let tags_path = dir.path().join("tags.csv");
    let output = dir.path().join("survey_tagged.csv");

    std::fs::write(
        &input,
        "id,comment,region\n1,\"Broken, row\",EU\n\n2,Took three weeks to arrive,US\n3\n",
    )
    .unwrap();
    std::fs::write(
        &tags_path,
        "Tag,Description,Example\nShipping,Delivery issues,Late box\nShipping,,Lost parcel\nPricing,Cost complaints,\n",
    )
    .unwrap();

    let dataset = Dataset::read_path(&input).unwrap();
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.rows[2].get("comment"), Some(""));

    let mut tags = taxonomy::import_csv_path(&tags_path).unwrap();
    assert_eq!(tags[0].examples(), &["Late box", "Lost parcel"]);
    tags[0] = tags[0]
        .clone()
        .with_children(vec![dtag::Tag::new("Late delivery")]);
    let tags = TagNormalizer::clean(&tags);

    let outcome = ClassificationJobBuilder::new()
        .rows(dataset.rows.clone())
        .target_column("comment")
        .tags(tags)
        .client(Arc::new(FirstRowFails))
        .config(EngineConfig {
            inter_row_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
        })
        .build()
        .unwrap()
        .run();
    assert_eq!(outcome.state, JobState::Completed);

    dataset::write_path(&output, &dataset.headers, &outcome.rows).unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("id,comment,region,AI_Tags,Shipping,Pricing,AI_Error")
    );
    assert_eq!(
        lines.next(),
        Some("1,\"Broken, row\",EU,,0,0,OpenAI API error: 500 - Internal error")
    );
    assert_eq!(
        lines.next(),
        Some("2,Took three weeks to arrive,US,\"Shipping, Late delivery\",1,0,")
    );
    assert_eq!(lines.next(), Some("3,,,,0,0,"));
    assert_eq!(lines.next(), None);

    let reread = Dataset::read_path(&output).unwrap();
    assert_eq!(reread.headers.len(), 7);
    assert_eq!(reread.rows[1].get("AI_Tags"), Some("Shipping, Late delivery"));
}

#[test]
fn missing_dataset_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Dataset::read_path(&dir.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, DatasetError::Io(_)));
}

#[test]
fn limited_read_rejects_files_over_the_row_cap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.csv");
    let mut csv = String::from("id,comment\n");
    for i in 0..=10_000 {
        csv.push_str(&format!("{i},ok\n"));
    }
    std::fs::write(&path, &csv).unwrap();

    let err = Dataset::read_path_limited(&path, DatasetLimits::default()).unwrap_err();
    assert!(matches!(
        err,
        DatasetError::TooManyRows {
            rows: 10_001,
            limit: 10_000
        }
    ));

    assert_eq!(Dataset::read_path(&path).unwrap().len(), 10_001);
}

#[test]
fn tag_csv_without_required_headers_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tags.csv");
    std::fs::write(&path, "Name,Notes\nPositive,good\n").unwrap();

    let err = taxonomy::import_csv_path(&path).unwrap_err();

    match err {
        ImportError::MissingHeaders(missing) => {
            assert_eq!(missing, vec!["tag", "description", "example"]);
        }
        other => panic!("expected missing headers, got {other}"),
    }
}

#[test]
fn tag_json_file_is_normalized_and_cleaned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tags.json");
    std::fs::write(
        &path,
        r#"[
            {"name": " Product ", "children": [
                {"name": "Quality", "children": [
                    {"name": "Durability", "children": [{"name": "Too deep"}]}
                ]}
            ]},
            {"name": "   "},
            {"name": "Support", "examples": ["Helpful agent", "", 7]}
        ]"#,
    )
    .unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let tags = TagNormalizer::clean(&TagNormalizer::normalize(&raw));
    let flat = taxonomy::flatten(&tags);

    let labels: Vec<String> = flat.iter().map(|t| t.path_label()).collect();
    assert_eq!(
        labels,
        vec![
            "Product",
            "Product > Quality",
            "Product > Quality > Durability",
            "Support"
        ]
    );
    assert_eq!(tags[1].examples(), &["Helpful agent", "7"]);
    assert!(taxonomy::validate(&tags).is_empty());
}
