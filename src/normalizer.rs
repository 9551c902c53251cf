//! Field normalization: free-text survey answers to canonical values.
//!
//! Everything here is pure. Reading input, writing output and logging the
//! run summary belong to [`crate::pipeline`].

use crate::aliases::{AliasTable, Aliases};
use crate::models::{
    Average, ColumnConfig, NormalizationConfig, NormalizedRecord, RawRecord, Status,
    NORMALIZED_FIELDS, RAW_COLUMN_PREFIX,
};
use regex::Regex;
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;
use tracing::debug;

static SCHOOL_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i),|&|\+|\s+and\s+").expect("valid school separator pattern"));

static PROGRAM_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i),|&|\+|/|\s+and\s+").expect("valid program separator pattern")
});

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("valid number pattern"));

const DOMESTIC_ANSWERS: [&str; 4] = ["ontario", "canadian", "ouac", "ontario student"];

pub struct Normalizer {
    aliases: Aliases,
    columns: ColumnConfig,
    type_sentinels: Vec<String>,
}

impl Normalizer {
    pub fn new(aliases: Aliases, columns: ColumnConfig, config: &NormalizationConfig) -> Self {
        Self {
            aliases,
            columns,
            type_sentinels: config
                .type_sentinels
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn normalize(&self, raw: &RawRecord) -> NormalizedRecord {
        self.normalize_into(raw, &mut NormalizeReport::default())
    }

    /// Normalize every record, returning the records and a run summary.
    pub fn normalize_all(&self, records: &[RawRecord]) -> (Vec<NormalizedRecord>, NormalizeReport) {
        let mut report = NormalizeReport::default();
        let normalized = records
            .iter()
            .map(|raw| self.normalize_into(raw, &mut report))
            .collect();
        (normalized, report)
    }

    fn normalize_into(&self, raw: &RawRecord, report: &mut NormalizeReport) -> NormalizedRecord {
        let cols = &self.columns;
        let original_school = raw.get(&cols.school);
        let original_program = raw.get(&cols.program);
        let original_type = raw.get(&cols.applicant_type);
        let original_average = raw.get(&cols.average);

        let (schools, unmatched_schools) =
            split_and_canonicalize(original_school, &SCHOOL_SEPARATORS, &self.aliases.schools);
        let (programs, unmatched_programs) =
            split_and_canonicalize(original_program, &PROGRAM_SEPARATORS, &self.aliases.programs);

        let own_columns = [
            &cols.school,
            &cols.program,
            &cols.status,
            &cols.applicant_type,
            &cols.average,
            &cols.attending_year,
        ];
        let mut extra = Map::new();
        for (header, value) in raw.fields() {
            if own_columns.contains(&header) {
                continue;
            }
            let key = if NORMALIZED_FIELDS.contains(&header.as_str()) {
                format!("{RAW_COLUMN_PREFIX}{header}")
            } else {
                header.clone()
            };
            if NORMALIZED_FIELDS.contains(&key.as_str()) || extra.contains_key(&key) {
                debug!(column = %header, "dropping column that clashes with a normalized field");
                continue;
            }
            extra.insert(key, value.clone());
        }

        let record = NormalizedRecord {
            status: normalize_status(raw.get(&cols.status)),
            applicant_type: normalize_type(original_type, &self.type_sentinels),
            average: normalize_average(original_average),
            attending_year: raw.get(&cols.attending_year).to_string(),
            schools,
            programs,
            original_school: original_school.to_string(),
            original_program: original_program.to_string(),
            original_type: original_type.to_string(),
            original_average: original_average.to_string(),
            extra,
        };

        report.record(&record, unmatched_schools, unmatched_programs);
        record
    }
}

/// Canonical status, or the trimmed input when it is not one we know.
pub fn normalize_status(raw: &str) -> Status {
    let trimmed = raw.trim();
    match trimmed.to_lowercase().as_str() {
        "accepted" => Status::Accepted,
        "rejected" => Status::Rejected,
        "deferred" => Status::Deferred,
        "waitlisted" | "waitlist" => Status::Waitlisted,
        _ => Status::Other(trimmed.to_string()),
    }
}

/// Map an applicant-type answer onto the OUAC form codes.
///
/// `sentinels` must already be lowercased. The 105D/105F suffixes are checked
/// before the bare 105 so that "105d international" keeps its suffix.
pub fn normalize_type(raw: &str, sentinels: &[String]) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();

    let code = if sentinels.iter().any(|s| *s == lower) {
        ""
    } else if lower.contains("105d") {
        "105D"
    } else if lower.contains("105f") {
        "105F"
    } else if lower.contains("105") || lower.contains("international") {
        "105"
    } else if lower.contains("101")
        || lower.contains("domestic")
        || DOMESTIC_ANSWERS.contains(&lower.as_str())
    {
        "101"
    } else {
        return trimmed.to_string();
    };
    code.to_string()
}

/// First decimal number in the text, or unknown for blanks, "idk" and "n/a".
pub fn normalize_average(raw: &str) -> Average {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    if lower.is_empty() || lower == "idk" || lower == "n/a" {
        return Average::Unknown;
    }

    FIRST_NUMBER
        .find(trimmed)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .into()
}

pub fn split_schools(raw: &str, table: &AliasTable) -> Vec<String> {
    split_and_canonicalize(raw, &SCHOOL_SEPARATORS, table).0
}

pub fn split_programs(raw: &str, table: &AliasTable) -> Vec<String> {
    split_and_canonicalize(raw, &PROGRAM_SEPARATORS, table).0
}

/// Returns the deduplicated canonical names and the tokens no alias matched.
fn split_and_canonicalize(
    raw: &str,
    separators: &Regex,
    table: &AliasTable,
) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    let mut unmatched = Vec::new();

    for token in separators.split(raw).map(str::trim).filter(|t| !t.is_empty()) {
        let canonical = match table.lookup(token) {
            Some(name) => name.to_string(),
            None => {
                unmatched.push(token.to_string());
                token.to_string()
            }
        };
        if seen.insert(canonical.to_lowercase()) {
            names.push(canonical);
        }
    }

    (names, unmatched)
}

/// Counters collected over one normalization run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub records: usize,
    pub with_average: usize,
    pub without_average: usize,
    pub statuses: BTreeMap<String, usize>,
    pub unrecognized_statuses: BTreeMap<String, usize>,
    pub types: BTreeMap<String, usize>,
    pub unmatched_schools: BTreeSet<String>,
    pub unmatched_programs: BTreeSet<String>,
}

impl NormalizeReport {
    fn record(
        &mut self,
        record: &NormalizedRecord,
        unmatched_schools: Vec<String>,
        unmatched_programs: Vec<String>,
    ) {
        self.records += 1;
        match record.average {
            Average::Number(_) => self.with_average += 1,
            Average::Unknown => self.without_average += 1,
        }

        *self.statuses.entry(record.status.to_string()).or_default() += 1;
        if let Status::Other(text) = &record.status {
            *self.unrecognized_statuses.entry(text.clone()).or_default() += 1;
        }
        *self.types.entry(record.applicant_type.clone()).or_default() += 1;

        self.unmatched_schools.extend(unmatched_schools);
        self.unmatched_programs.extend(unmatched_programs);
    }

    /// One line per counter, for `metadata.processing_notes`.
    pub fn notes(&self) -> Vec<String> {
        let mut notes = vec![
            format!("Normalized {} records", self.records),
            format!(
                "Average extracted for {} records, unknown for {}",
                self.with_average, self.without_average
            ),
            format!("Status counts: {}", join_counts(&self.statuses)),
            format!("Type counts: {}", join_counts(&self.types)),
        ];
        if !self.unrecognized_statuses.is_empty() {
            notes.push(format!(
                "Unrecognized statuses kept verbatim: {}",
                join_counts(&self.unrecognized_statuses)
            ));
        }
        notes.push(format!(
            "{} school and {} program values had no alias and were kept as written",
            self.unmatched_schools.len(),
            self.unmatched_programs.len()
        ));
        notes
    }
}

fn join_counts(counts: &BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(name, count)| {
            let name = if name.is_empty() { "(empty)" } else { name };
            format!("{name}={count}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
