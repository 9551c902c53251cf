//! End-to-end runs of the stages over files in a temporary directory.

use admission_pipeline::aliases::Aliases;
use admission_pipeline::analyzer::{Dimension, PublishedDataset};
use admission_pipeline::ingest::CsvIngestor;
use admission_pipeline::models::{
    Average, ColumnConfig, NormalizationConfig, NormalizedDataset, ProcessingNote, Status,
};
use admission_pipeline::normalizer::Normalizer;
use admission_pipeline::pipeline::{self, LooseDataset};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn normalizer() -> Normalizer {
    Normalizer::new(
        Aliases::builtin().unwrap(),
        ColumnConfig::default(),
        &NormalizationConfig::default(),
    )
}

/// Ingest -> normalize -> clean -> project, returning the published file path.
fn run_stages(dir: &Path, csv: &str, skip_title_rows: usize) -> std::path::PathBuf {
    let csv_path = dir.join("responses.csv");
    let raw = dir.join("raw.json");
    let normalized = dir.join("normalized.json");
    let published = dir.join("published.json");
    fs::write(&csv_path, csv).unwrap();

    let ingestor = CsvIngestor::new(skip_title_rows);
    pipeline::ingest_file(&ingestor, &csv_path, &raw).unwrap();
    pipeline::normalize_file(&normalizer(), &raw, &normalized).unwrap();
    pipeline::clean_averages_file(&normalized, &normalized).unwrap();
    pipeline::project_file(&normalized, &published).unwrap();
    published
}

#[test]
fn single_row_survives_every_stage() {
    let dir = TempDir::new().unwrap();
    let csv = "Program,School,Average,Status,Type\n\
               Computer Science,Waterloo,95%,Accepted,101\n";

    let published = run_stages(dir.path(), csv, 0);
    let records = pipeline::load_published(&published).unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.schools, vec!["University of Waterloo"]);
    assert_eq!(record.programs, vec!["Computer Science"]);
    assert_eq!(record.average, Average::Number(95.0));
    assert_eq!(record.status, Status::Accepted);
    assert_eq!(record.applicant_type, "101");
}

#[test]
fn stage_files_carry_metadata() {
    let dir = TempDir::new().unwrap();
    let csv = "Survey export\n\
               Program,School,Average,Status,Type,Attending Year\n\
               cs,uw,95,accepted,domestic,2024\n\
               \"health sci, life sci\",\"mac, western\",idk,waitlist,105d,2024\n";
    let published = run_stages(dir.path(), csv, 1);

    let raw: Value = pipeline::read_json(&dir.path().join("raw.json")).unwrap();
    assert_eq!(raw["metadata"]["total_records"], 2);
    assert_eq!(raw["metadata"]["headers"].as_array().unwrap().len(), 6);

    let normalized: NormalizedDataset =
        pipeline::read_json(&dir.path().join("normalized.json")).unwrap();
    assert_eq!(normalized.metadata.original_headers.len(), 6);
    let last_note = normalized.metadata.processing_notes.last().unwrap();
    assert!(matches!(last_note, ProcessingNote::Operation(op) if op.operation == "average_field_cleanup"));
    assert_eq!(normalized.data[1].original_school, "mac, western");
    assert_eq!(normalized.data[1].status, Status::Waitlisted);
    assert_eq!(normalized.data[1].applicant_type, "105D");

    let published: Value = pipeline::read_json(&published).unwrap();
    assert_eq!(
        published["metadata"]["fields"],
        serde_json::json!(["Status", "Average", "Attending Year", "Schools", "Programs", "Type"])
    );
    assert_eq!(published["data"][1]["Average"], Value::Null);
    assert_eq!(
        published["data"][1]["Schools"],
        serde_json::json!(["McMaster University", "Western University"])
    );
}

#[test]
fn cleaning_twice_leaves_data_unchanged() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("legacy.json");
    fs::write(
        &input,
        r#"{"metadata":{"source":"legacy"},"data":[
            {"Average":"92.5"},{"Average":94},{"Average":""},{"Average":"n/a"},{"Status":"Accepted"}
        ]}"#,
    )
    .unwrap();

    let first = pipeline::clean_averages_file(&input, &input).unwrap();
    assert_eq!(first.converted, 1);
    assert_eq!(first.invalid, 1);
    let once: LooseDataset = pipeline::read_json(&input).unwrap();

    let second = pipeline::clean_averages_file(&input, &input).unwrap();
    assert_eq!(second.converted, 0);
    assert_eq!(second.already_numeric, 2);
    assert_eq!(second.null_undefined, 3);
    let twice: LooseDataset = pipeline::read_json(&input).unwrap();

    assert_eq!(once.data, twice.data);
    assert_eq!(
        twice.metadata["processing_notes"].as_array().unwrap().len(),
        2
    );
    assert!(dir.path().join("legacy.backup.json").exists());
}

#[test]
fn backup_holds_the_input_verbatim() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("normalized.json");
    let original = r#"{"metadata":{},"data":[{"Average":"88"}]}"#;
    fs::write(&input, original).unwrap();

    pipeline::clean_averages_file(&input, &input).unwrap();

    let backup = fs::read_to_string(dir.path().join("normalized.backup.json")).unwrap();
    assert_eq!(backup, original);
}

#[test]
fn missing_input_fails_without_writing_output() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("published.json");
    let result = pipeline::project_file(&dir.path().join("missing.json"), &output);

    assert!(result.is_err());
    assert!(!output.exists());
}

#[test]
fn rankings_over_published_file() {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from("Program,School,Average,Status,Type\n");
    for avg in [95, 96, 97] {
        csv.push_str(&format!("cs,uw,{avg},Accepted,101\n"));
    }
    csv.push_str("cs,uw,99,Rejected,101\n");
    csv.push_str("cs / co-op,mac,91,Accepted,101\n");
    csv.push_str("life sci,mac,49.9,Accepted,101\n");

    let published = run_stages(dir.path(), &csv, 0);
    let dataset = PublishedDataset::new(
        pipeline::load_published(&published).unwrap(),
        vec!["Co-op".to_string(), "Other".to_string()],
    );

    let schools = dataset.competitiveness(Dimension::School, 1);
    assert_eq!(schools[0].name, "University of Waterloo");
    assert_eq!(schools[0].average_grade, Some(96.0));
    assert_eq!(schools[1].name, "McMaster University");
    assert_eq!(schools[1].record_count, 1);

    let popular = dataset.popularity(Dimension::School, 1);
    assert_eq!(popular[0].application_count, Some(4));
    assert_eq!(popular[0].acceptance_rate, Some(75));

    let programs = dataset.popularity(Dimension::Program, 1);
    let names: Vec<&str> = programs.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Computer Science", "Life Sciences"]);

    assert!(dataset.competitiveness(Dimension::School, 4).is_empty());
    assert_eq!(dataset.competitiveness(Dimension::School, 3).len(), 1);
}
