use crate::models::{NormalizedRecord, PublishedRecord};

/// Narrow a normalized record to the published fields. Values are copied as-is.
pub fn project(record: &NormalizedRecord) -> PublishedRecord {
    PublishedRecord {
        status: record.status.clone(),
        average: record.average,
        attending_year: record.attending_year.clone(),
        schools: record.schools.clone(),
        programs: record.programs.clone(),
        applicant_type: record.applicant_type.clone(),
    }
}

pub fn project_all(records: &[NormalizedRecord]) -> Vec<PublishedRecord> {
    records.iter().map(project).collect()
}
