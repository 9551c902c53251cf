//! Stage orchestration. Each stage reads one file, transforms it fully in
//! memory, and only then writes its output.

use crate::cleaner;
use crate::error::{PipelineError, Result};
use crate::ingest::CsvIngestor;
use crate::models::{
    CleanupStats, Dataset, NormalizedDataset, NormalizedMetadata, ProcessingNote,
    PublishedDatasetFile, PublishedMetadata, PublishedRecord, RawDataset, PUBLISHED_FIELDS,
    timestamp_now,
};
use crate::normalizer::{NormalizeReport, Normalizer};
use crate::projector;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Loosely typed dataset, as the average cleaner sees it.
pub type LooseDataset = Dataset<Map<String, Value>, Map<String, Value>>;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = read_text(path)?;
    parse_json(path, &content)
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_json<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T> {
    serde_json::from_str(content).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize, then replace `path` in one rename so readers never see half a file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let write_err = |source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}

/// Stage 1 from a local file.
pub fn ingest_file(ingestor: &CsvIngestor, input: &Path, output: &Path) -> Result<RawDataset> {
    let dataset = ingestor.ingest_file(input)?;
    write_json(output, &dataset)?;
    info!(records = dataset.data.len(), output = %output.display(), "ingested");
    Ok(dataset)
}

/// Stage 1 from an HTTP(S) CSV export.
pub async fn ingest_url(ingestor: &CsvIngestor, url: &str, output: &Path) -> Result<RawDataset> {
    let dataset = ingestor.ingest_url(url).await?;
    write_json(output, &dataset)?;
    info!(records = dataset.data.len(), output = %output.display(), "ingested");
    Ok(dataset)
}

pub fn normalize_dataset(
    raw: &RawDataset,
    source: &str,
    normalizer: &Normalizer,
) -> (NormalizedDataset, NormalizeReport) {
    let (data, report) = normalizer.normalize_all(&raw.data);
    let dataset = NormalizedDataset {
        metadata: NormalizedMetadata {
            source: source.to_string(),
            processed_at: timestamp_now(),
            total_records: data.len(),
            processing_notes: report.notes().into_iter().map(ProcessingNote::Text).collect(),
            original_headers: raw.metadata.headers.clone(),
        },
        data,
    };
    (dataset, report)
}

/// Stage 2.
pub fn normalize_file(
    normalizer: &Normalizer,
    input: &Path,
    output: &Path,
) -> Result<(NormalizedDataset, NormalizeReport)> {
    let raw: RawDataset = read_json(input)?;
    let (dataset, report) = normalize_dataset(&raw, &input.display().to_string(), normalizer);
    write_json(output, &dataset)?;

    log_normalize_report(&report);
    info!(records = dataset.data.len(), output = %output.display(), "normalized");
    Ok((dataset, report))
}

fn log_normalize_report(report: &NormalizeReport) {
    for note in report.notes() {
        info!("{note}");
    }
    if !report.unmatched_schools.is_empty() {
        info!(
            count = report.unmatched_schools.len(),
            values = ?report.unmatched_schools,
            "schools without an alias"
        );
    }
    if !report.unmatched_programs.is_empty() {
        info!(
            count = report.unmatched_programs.len(),
            values = ?report.unmatched_programs,
            "programs without an alias"
        );
    }
}

/// Stage 3. Backs the input up first and refuses to go on if that fails.
pub fn clean_averages_file(input: &Path, output: &Path) -> Result<CleanupStats> {
    let content = read_text(input)?;
    let mut dataset: LooseDataset = parse_json(input, &content)?;

    let backup = cleaner::backup_path(input);
    fs::write(&backup, &content).map_err(|source| PipelineError::Backup {
        path: backup.clone(),
        source,
    })?;
    info!(backup = %backup.display(), "input backed up");

    let stats = cleaner::clean_averages(&mut dataset.data);
    cleaner::append_cleanup_note(&mut dataset.metadata, stats);
    write_json(output, &dataset)?;

    if stats.invalid > 0 {
        warn!(invalid = stats.invalid, "some averages could not be parsed and were set to null");
    }
    info!(
        total = stats.total,
        converted = stats.converted,
        already_numeric = stats.already_numeric,
        empty_string = stats.empty_string,
        invalid = stats.invalid,
        null_undefined = stats.null_undefined,
        output = %output.display(),
        "averages cleaned"
    );
    Ok(stats)
}

pub fn project_dataset(normalized: &NormalizedDataset, source: &str) -> PublishedDatasetFile {
    let data = projector::project_all(&normalized.data);
    PublishedDatasetFile {
        metadata: PublishedMetadata {
            source: source.to_string(),
            created_at: timestamp_now(),
            total_records: data.len(),
            description: "Self-reported admission results with canonical school and program \
                          names, numeric averages and normalized status and applicant type"
                .to_string(),
            fields: PUBLISHED_FIELDS.iter().map(|f| f.to_string()).collect(),
        },
        data,
    }
}

/// Stage 4.
pub fn project_file(input: &Path, output: &Path) -> Result<PublishedDatasetFile> {
    let normalized: NormalizedDataset = read_json(input)?;
    let published = project_dataset(&normalized, &input.display().to_string());
    write_json(output, &published)?;
    info!(records = published.data.len(), output = %output.display(), "projected");
    Ok(published)
}

pub fn load_published(path: &Path) -> Result<Vec<PublishedRecord>> {
    let file: PublishedDatasetFile = read_json(path)?;
    Ok(file.data)
}
