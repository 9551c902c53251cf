use crate::models::PublishedRecord;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

/// Wildcard entry that heads every filter option list.
pub const ALL: &str = "All";

/// Inclusive range of averages that count toward competitiveness.
pub const MIN_VALID_AVERAGE: f64 = 50.0;
pub const MAX_VALID_AVERAGE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    School,
    Program,
}

impl Dimension {
    fn names(self, record: &PublishedRecord) -> &[String] {
        match self {
            Dimension::School => &record.schools,
            Dimension::Program => &record.programs,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::School => "school",
            Dimension::Program => "program",
        }
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "school" | "schools" => Ok(Dimension::School),
            "program" | "programs" => Ok(Dimension::Program),
            other => Err(format!("unknown grouping '{other}', expected school or program")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Competitiveness,
    Popularity,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::Competitiveness => "competitiveness",
            Metric::Popularity => "popularity",
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "competitiveness" => Ok(Metric::Competitiveness),
            "popularity" => Ok(Metric::Popularity),
            other => Err(format!(
                "unknown metric '{other}', expected competitiveness or popularity"
            )),
        }
    }
}

/// One row of a ranking. Competitiveness fills `average_grade`, popularity
/// fills `application_count` and `acceptance_rate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_grade: Option<f64>,
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_rate: Option<u32>,
}

impl RankingItem {
    pub fn tier(&self) -> &'static str {
        match (self.average_grade, self.application_count) {
            (Some(grade), _) => competitiveness_tier(grade),
            (None, Some(count)) => popularity_tier(count),
            (None, None) => popularity_tier(self.record_count),
        }
    }
}

pub fn competitiveness_tier(average_grade: f64) -> &'static str {
    if average_grade >= 96.0 {
        "Extremely Competitive"
    } else if average_grade >= 94.0 {
        "Very Competitive"
    } else if average_grade >= 92.0 {
        "Highly Competitive"
    } else if average_grade >= 90.0 {
        "Competitive"
    } else {
        "Moderate"
    }
}

pub fn popularity_tier(application_count: usize) -> &'static str {
    match application_count {
        500.. => "Extremely Popular",
        200..=499 => "Very Popular",
        100..=199 => "Popular",
        50..=99 => "Moderate",
        _ => "Low",
    }
}

/// Average of an accepted record if it lies in the valid range.
fn accepted_average(record: &PublishedRecord) -> Option<f64> {
    if !record.status.is_accepted() {
        return None;
    }
    record
        .average
        .value()
        .filter(|avg| (MIN_VALID_AVERAGE..=MAX_VALID_AVERAGE).contains(avg))
}

/// Groups keyed by name, in first-seen order.
struct Groups<T> {
    index: HashMap<String, usize>,
    entries: Vec<(String, T)>,
}

impl<T: Default> Groups<T> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn get_mut(&mut self, name: &str) -> &mut T {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.entries.push((name.to_string(), T::default()));
                self.index.insert(name.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }
}

fn is_excluded(dimension: Dimension, name: &str, excluded_programs: &[String]) -> bool {
    dimension == Dimension::Program && excluded_programs.iter().any(|x| x == name)
}

/// Mean accepted average per school or program, highest first.
pub fn competitiveness(
    records: &[PublishedRecord],
    dimension: Dimension,
    min_records: usize,
    excluded_programs: &[String],
) -> Vec<RankingItem> {
    let mut groups: Groups<Vec<f64>> = Groups::new();

    for record in records {
        let Some(avg) = accepted_average(record) else {
            continue;
        };
        for name in dimension.names(record) {
            groups.get_mut(name).push(avg);
        }
    }

    let mut ranking: Vec<RankingItem> = groups
        .entries
        .into_iter()
        .filter(|(name, grades)| {
            grades.len() >= min_records && !is_excluded(dimension, name, excluded_programs)
        })
        .map(|(name, grades)| {
            let mean = grades.iter().sum::<f64>() / grades.len() as f64;
            RankingItem {
                name,
                average_grade: Some(round_to_tenth(mean)),
                record_count: grades.len(),
                application_count: None,
                acceptance_rate: None,
            }
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.average_grade
            .partial_cmp(&a.average_grade)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranking
}

#[derive(Debug, Default)]
struct Volume {
    total: usize,
    accepted: usize,
}

/// Application volume per school or program, most applied-to first.
pub fn popularity(
    records: &[PublishedRecord],
    dimension: Dimension,
    min_records: usize,
    excluded_programs: &[String],
) -> Vec<RankingItem> {
    let mut groups: Groups<Volume> = Groups::new();

    for record in records {
        let accepted = record.status.is_accepted();
        for name in dimension.names(record) {
            let volume = groups.get_mut(name);
            volume.total += 1;
            if accepted {
                volume.accepted += 1;
            }
        }
    }

    let mut ranking: Vec<RankingItem> = groups
        .entries
        .into_iter()
        .filter(|(name, volume)| {
            volume.total >= min_records && !is_excluded(dimension, name, excluded_programs)
        })
        .map(|(name, volume)| RankingItem {
            name,
            average_grade: None,
            record_count: volume.total,
            application_count: Some(volume.total),
            acceptance_rate: Some(acceptance_rate(volume.accepted, volume.total)),
        })
        .collect();

    ranking.sort_by(|a, b| b.application_count.cmp(&a.application_count));
    ranking
}

fn acceptance_rate(accepted: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * accepted as f64 / total as f64).round() as u32
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Filter selections; `ALL` matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub school: String,
    pub program: String,
    pub status: String,
    pub attending_year: String,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            school: ALL.to_string(),
            program: ALL.to_string(),
            status: ALL.to_string(),
            attending_year: ALL.to_string(),
        }
    }
}

impl RecordFilter {
    pub fn matches(&self, record: &PublishedRecord) -> bool {
        (self.school == ALL || record.schools.iter().any(|s| *s == self.school))
            && (self.program == ALL || record.programs.iter().any(|p| *p == self.program))
            && (self.status == ALL || record.status.as_str() == self.status)
            && (self.attending_year == ALL || record.attending_year == self.attending_year)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub total_records: usize,
    pub accepted_records: usize,
    /// Mean of accepted averages within the valid range.
    pub mean_accepted_average: Option<f64>,
}

/// Read-only view over the published records, as served to the dashboard.
#[derive(Debug, Clone)]
pub struct PublishedDataset {
    records: Vec<PublishedRecord>,
    excluded_programs: Vec<String>,
}

impl PublishedDataset {
    pub fn new(records: Vec<PublishedRecord>, excluded_programs: Vec<String>) -> Self {
        Self {
            records,
            excluded_programs,
        }
    }

    pub fn records(&self) -> &[PublishedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn schools(&self) -> Vec<String> {
        with_all(self.records.iter().flat_map(|r| r.schools.iter().cloned()))
    }

    pub fn programs(&self) -> Vec<String> {
        with_all(self.records.iter().flat_map(|r| r.programs.iter().cloned()))
    }

    pub fn statuses(&self) -> Vec<String> {
        with_all(self.records.iter().map(|r| r.status.to_string()))
    }

    pub fn attending_years(&self) -> Vec<String> {
        with_all(self.records.iter().map(|r| r.attending_year.clone()))
    }

    pub fn filter(&self, filter: &RecordFilter) -> Vec<&PublishedRecord> {
        self.records.iter().filter(|r| filter.matches(r)).collect()
    }

    pub fn competitiveness(&self, dimension: Dimension, min_records: usize) -> Vec<RankingItem> {
        competitiveness(&self.records, dimension, min_records, &self.excluded_programs)
    }

    pub fn popularity(&self, dimension: Dimension, min_records: usize) -> Vec<RankingItem> {
        popularity(&self.records, dimension, min_records, &self.excluded_programs)
    }

    pub fn rank(&self, metric: Metric, dimension: Dimension, min_records: usize) -> Vec<RankingItem> {
        match metric {
            Metric::Competitiveness => self.competitiveness(dimension, min_records),
            Metric::Popularity => self.popularity(dimension, min_records),
        }
    }

    pub fn summary(&self) -> DatasetSummary {
        let accepted_records = self.records.iter().filter(|r| r.status.is_accepted()).count();
        let grades: Vec<f64> = self.records.iter().filter_map(accepted_average).collect();
        let mean_accepted_average = if grades.is_empty() {
            None
        } else {
            Some(round_to_tenth(grades.iter().sum::<f64>() / grades.len() as f64))
        };

        DatasetSummary {
            total_records: self.records.len(),
            accepted_records,
            mean_accepted_average,
        }
    }
}

/// Sorted distinct non-empty values, headed by `ALL`.
fn with_all(values: impl Iterator<Item = String>) -> Vec<String> {
    let distinct: BTreeSet<String> = values.filter(|v| !v.trim().is_empty()).collect();
    std::iter::once(ALL.to_string()).chain(distinct).collect()
}
