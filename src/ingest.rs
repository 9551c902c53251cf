use crate::error::{PipelineError, Result};
use crate::models::{IngestMetadata, RawDataset, RawRecord, timestamp_now};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reads survey CSV exports, from disk or over HTTP, into raw records.
pub struct CsvIngestor {
    client: reqwest::Client,
    skip_title_rows: usize,
}

impl CsvIngestor {
    pub fn new(skip_title_rows: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            skip_title_rows,
        }
    }

    pub fn ingest_file(&self, path: &Path) -> Result<RawDataset> {
        let content = fs::read_to_string(path).map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        self.parse_content(&content, &path.display().to_string())
    }

    pub async fn ingest_url(&self, url: &str) -> Result<RawDataset> {
        info!(%url, "fetching CSV export");

        let fetch_err = |source| PipelineError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(fetch_err)?;

        if !response.status().is_success() {
            return Err(PipelineError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content = response.text().await.map_err(fetch_err)?;
        self.parse_content(&content, url)
    }

    pub fn parse_content(&self, content: &str, source: &str) -> Result<RawDataset> {
        let (headers, data) = parse_csv(content, source, self.skip_title_rows)?;

        if data.is_empty() {
            warn!(source, "no records found");
        }

        Ok(RawDataset {
            metadata: IngestMetadata {
                source: source.to_string(),
                processed_at: timestamp_now(),
                total_records: data.len(),
                headers,
            },
            data,
        })
    }
}

/// Parse quoted CSV text into `(headers, records)`.
///
/// Each line is split on its own, so a stray quote can only spoil the line it
/// sits on. The first `skip_title_rows` lines are discarded and the next line
/// holds the headers. Blank lines are skipped, rows with fewer fields than
/// headers are dropped, and fields beyond the header count are ignored.
pub fn parse_csv(
    content: &str,
    source: &str,
    skip_title_rows: usize,
) -> Result<(Vec<String>, Vec<RawRecord>)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let csv_err = |err| PipelineError::Csv {
        source_name: source.to_string(),
        source: err,
    };

    let mut lines = content.lines().skip(skip_title_rows);
    let headers = match lines.next() {
        Some(line) => split_line(line).map_err(csv_err)?,
        None => {
            return Err(PipelineError::MissingHeader {
                source_name: source.to_string(),
                skipped: skip_title_rows,
            })
        }
    };

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for (idx, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_line(line).map_err(csv_err)?;
        if fields.len() < headers.len() {
            dropped += 1;
            debug!(
                line = skip_title_rows + idx + 2,
                fields = fields.len(),
                expected = headers.len(),
                "dropping short row"
            );
            continue;
        }

        let mut record = RawRecord::new();
        for (header, value) in headers.iter().zip(fields.iter()) {
            record.insert(header, value);
        }
        records.push(record);
    }

    info!(
        source,
        records = records.len(),
        dropped,
        columns = headers.len(),
        "parsed CSV"
    );

    Ok((headers, records))
}

/// Quote-aware split of a single line into trimmed fields.
/// An unterminated quote runs to the end of the line, not the file.
fn split_line(line: &str) -> std::result::Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(row) => Ok(row?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
Admissions Survey 2024 (responses)
Program,School,Average,Status,Type,Attending Year
Computer Science,Waterloo,95%,Accepted,101,2024

\"Health Sci, Life Sci\",\"McMaster, Western\",93,Rejected,101,2024
truncated,row
Eng,Queens,91,Accepted,105,2023,extra,fields

";

    #[test]
    fn title_row_is_skipped_and_headers_read() {
        let (headers, records) = parse_csv(EXPORT, "test", 1).unwrap();
        assert_eq!(
            headers,
            vec!["Program", "School", "Average", "Status", "Type", "Attending Year"]
        );
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get("Program"), "Computer Science");
        assert_eq!(records[0].get("Average"), "95%");
    }

    #[test]
    fn quoted_commas_stay_in_one_field() {
        let (_, records) = parse_csv(EXPORT, "test", 1).unwrap();
        assert_eq!(records[1].get("Program"), "Health Sci, Life Sci");
        assert_eq!(records[1].get("School"), "McMaster, Western");
    }

    #[test]
    fn extra_fields_are_ignored() {
        let (_, records) = parse_csv(EXPORT, "test", 1).unwrap();
        assert_eq!(records[2].len(), 6);
        assert_eq!(records[2].get("Attending Year"), "2023");
    }

    #[test]
    fn fields_are_trimmed() {
        let csv = "A,B\n  x ,\" y \"\n";
        let (_, records) = parse_csv(csv, "test", 0).unwrap();
        assert_eq!(records[0].get("A"), "x");
        assert_eq!(records[0].get("B"), "y");
    }

    #[test]
    fn unterminated_quote_only_spoils_its_own_line() {
        let csv = "Program,School,Average,Status,Type\n\
                   cs,\"uw,95,Accepted,101\n\
                   se,mac,93,Accepted,101\r\n\
                   eng,queens,91,Rejected,101\n";
        let (_, records) = parse_csv(csv, "test", 0).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Program"), "se");
        assert_eq!(records[0].get("Type"), "101");
        assert_eq!(records[1].get("School"), "queens");
    }

    #[test]
    fn whitespace_only_lines_are_skipped() {
        let csv = "A\n   \nx\n";
        let (_, records) = parse_csv(csv, "test", 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("A"), "x");
    }

    #[test]
    fn missing_header_is_fatal() {
        let err = parse_csv("only a title\n", "test", 1).unwrap_err();
        assert!(matches!(err, PipelineError::MissingHeader { skipped: 1, .. }));
    }

    #[test]
    fn unreadable_file_is_fatal() {
        let ingestor = CsvIngestor::new(1);
        let err = ingestor
            .ingest_file(Path::new("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Read { .. }));
    }

    #[test]
    fn metadata_describes_output() {
        let ingestor = CsvIngestor::new(1);
        let dataset = ingestor.parse_content(EXPORT, "survey.csv").unwrap();
        assert_eq!(dataset.metadata.source, "survey.csv");
        assert_eq!(dataset.metadata.total_records, 3);
        assert_eq!(dataset.metadata.headers.len(), 6);
    }
}
