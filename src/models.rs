use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub input_csv: Option<String>,
    pub input_url: Option<String>,
    pub output_directory: Option<String>,
    /// Rows discarded before the header row (survey exports carry a title row).
    pub skip_title_rows: usize,
    /// Extra alias table merged over the built-in one.
    pub aliases_file: Option<String>,
    pub columns: ColumnConfig,
    pub ranking: RankingConfig,
    pub normalization: NormalizationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
}

/// Raw CSV header names of the columns the normalizer reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub school: String,
    pub program: String,
    pub status: String,
    pub applicant_type: String,
    pub average: String,
    pub attending_year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Threshold used by the `rank` and `run` reports.
    pub min_records: usize,
    pub dashboard_school_min: usize,
    pub dashboard_program_min: usize,
    /// Canonical program names that are normalization artifacts, not programs.
    pub excluded_programs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Non-answers in the Type column that normalize to an empty string.
    pub type_sentinels: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_source_mode: DataSourceMode::Local,
            input_csv: Some("data-source/responses.csv".to_string()),
            input_url: None,
            output_directory: Some("output".to_string()),
            skip_title_rows: 1,
            aliases_file: None,
            columns: ColumnConfig::default(),
            ranking: RankingConfig::default(),
            normalization: NormalizationConfig::default(),
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            school: "School".to_string(),
            program: "Program".to_string(),
            status: "Status".to_string(),
            applicant_type: "Type".to_string(),
            average: "Average".to_string(),
            attending_year: "Attending Year".to_string(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_records: 10,
            dashboard_school_min: 2,
            dashboard_program_min: 4,
            excluded_programs: vec!["Co-op".to_string(), "Other".to_string()],
        }
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            type_sentinels: vec!["ur mom".to_string(), "lol".to_string()],
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config: {}", file_path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", file_path))?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)
            .with_context(|| format!("Failed to write config: {}", file_path))?;
        Ok(())
    }

    pub fn output_dir(&self) -> &str {
        self.output_directory.as_deref().unwrap_or("output")
    }
}

/// One CSV line keyed by header name. Values are trimmed strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, header: &str, value: &str) {
        self.0
            .insert(header.to_string(), Value::String(value.trim().to_string()));
    }

    /// Field value, or "" when the column is absent or not a string.
    pub fn get(&self, header: &str) -> &str {
        self.0.get(header).and_then(Value::as_str).unwrap_or("")
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Grade average, resolved once: a number or unknown. Serializes as a JSON number or null.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Average {
    Number(f64),
    #[default]
    Unknown,
}

impl Average {
    pub fn value(self) -> Option<f64> {
        match self {
            Average::Number(v) => Some(v),
            Average::Unknown => None,
        }
    }
}

impl From<Option<f64>> for Average {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Average::Number(v),
            _ => Average::Unknown,
        }
    }
}

impl Serialize for Average {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Average::Number(v) => serializer.serialize_f64(*v),
            Average::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Average {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.into())
    }
}

pub const STATUS_ACCEPTED: &str = "Accepted";
pub const STATUS_REJECTED: &str = "Rejected";
pub const STATUS_DEFERRED: &str = "Deferred";
pub const STATUS_WAITLISTED: &str = "Waitlisted";

/// Application outcome. Anything outside the canonical set is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Accepted,
    Rejected,
    Deferred,
    Waitlisted,
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Accepted => STATUS_ACCEPTED,
            Status::Rejected => STATUS_REJECTED,
            Status::Deferred => STATUS_DEFERRED,
            Status::Waitlisted => STATUS_WAITLISTED,
            Status::Other(s) => s,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Status::Accepted)
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        match value.as_str() {
            STATUS_ACCEPTED => Status::Accepted,
            STATUS_REJECTED => Status::Rejected,
            STATUS_DEFERRED => Status::Deferred,
            STATUS_WAITLISTED => Status::Waitlisted,
            _ => Status::Other(value),
        }
    }
}

impl From<Status> for String {
    fn from(value: Status) -> Self {
        match value {
            Status::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "Type")]
    pub applicant_type: String,
    #[serde(rename = "Average")]
    pub average: Average,
    #[serde(rename = "Attending Year", default)]
    pub attending_year: String,
    #[serde(rename = "Schools")]
    pub schools: Vec<String>,
    #[serde(rename = "Programs")]
    pub programs: Vec<String>,
    #[serde(rename = "OriginalSchool", default)]
    pub original_school: String,
    #[serde(rename = "OriginalProgram", default)]
    pub original_program: String,
    #[serde(rename = "OriginalType", default)]
    pub original_type: String,
    #[serde(rename = "OriginalAverage", default)]
    pub original_average: String,
    /// Remaining survey columns, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keys a `NormalizedRecord` writes itself. Carried-through survey columns
/// with one of these names are renamed with [`RAW_COLUMN_PREFIX`].
pub const NORMALIZED_FIELDS: [&str; 10] = [
    "Status",
    "Type",
    "Average",
    "Attending Year",
    "Schools",
    "Programs",
    "OriginalSchool",
    "OriginalProgram",
    "OriginalType",
    "OriginalAverage",
];

pub const RAW_COLUMN_PREFIX: &str = "Raw ";

/// The externally published record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRecord {
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "Average")]
    pub average: Average,
    #[serde(rename = "Attending Year", default)]
    pub attending_year: String,
    #[serde(rename = "Schools")]
    pub schools: Vec<String>,
    #[serde(rename = "Programs")]
    pub programs: Vec<String>,
    #[serde(rename = "Type")]
    pub applicant_type: String,
}

pub const PUBLISHED_FIELDS: [&str; 6] = [
    "Status",
    "Average",
    "Attending Year",
    "Schools",
    "Programs",
    "Type",
];

/// A stage output file: metadata plus records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset<M, R> {
    pub metadata: M,
    pub data: Vec<R>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMetadata {
    pub source: String,
    pub processed_at: String,
    pub total_records: usize,
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMetadata {
    pub source: String,
    pub processed_at: String,
    pub total_records: usize,
    #[serde(default)]
    pub processing_notes: Vec<ProcessingNote>,
    #[serde(default)]
    pub original_headers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessingNote {
    Text(String),
    Operation(OperationNote),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationNote {
    pub timestamp: String,
    pub operation: String,
    pub description: String,
    pub stats: CleanupStats,
}

/// Counters reported by the average cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub total: usize,
    pub converted: usize,
    pub already_numeric: usize,
    pub empty_string: usize,
    pub invalid: usize,
    pub null_undefined: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedMetadata {
    pub source: String,
    pub created_at: String,
    pub total_records: usize,
    pub description: String,
    pub fields: Vec<String>,
}

pub type RawDataset = Dataset<IngestMetadata, RawRecord>;
pub type NormalizedDataset = Dataset<NormalizedMetadata, NormalizedRecord>;
pub type PublishedDatasetFile = Dataset<PublishedMetadata, PublishedRecord>;

/// Current time as an RFC 3339 UTC timestamp.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
