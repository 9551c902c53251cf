//! Boundary with the hosted backend that holds each user's own submission.
//!
//! The pipeline works from a CSV export of that store and never reads it
//! directly; this module only fixes the record shape and the access contract.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub university_attendance: String,
    pub high_school: String,
    pub other_achievements: String,
    #[serde(default)]
    pub universities: Vec<UniversityApplication>,
    #[serde(default)]
    pub grades: Vec<GradeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_grade_11: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_grade_12: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversityApplication {
    pub name: String,
    pub program: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub level: String,
    pub course_name: String,
    pub course_code: String,
    pub grade: f64,
    #[serde(rename = "type")]
    pub course_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ib_ap_mark: Option<f64>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user id must not be empty")]
    EmptyUserId,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Per-user create/read/update of a submission.
pub trait SubmissionStore {
    /// Insert or replace the submission for `user_id`.
    fn upsert(&mut self, user_id: &str, submission: Submission) -> Result<(), StoreError>;

    fn get(&self, user_id: &str) -> Result<Option<Submission>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySubmissionStore {
    submissions: HashMap<String, Submission>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }
}

impl SubmissionStore for InMemorySubmissionStore {
    fn upsert(&mut self, user_id: &str, submission: Submission) -> Result<(), StoreError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(StoreError::EmptyUserId);
        }
        self.submissions.insert(user_id.to_string(), submission);
        Ok(())
    }

    fn get(&self, user_id: &str) -> Result<Option<Submission>, StoreError> {
        Ok(self.submissions.get(user_id.trim()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(status: &str) -> Submission {
        Submission {
            university_attendance: "University of Waterloo".to_string(),
            high_school: "Central Secondary".to_string(),
            universities: vec![UniversityApplication {
                name: "University of Waterloo".to_string(),
                program: "Computer Science".to_string(),
                status: status.to_string(),
            }],
            grades: vec![GradeEntry {
                level: "12".to_string(),
                course_name: "Calculus and Vectors".to_string(),
                course_code: "MCV4U".to_string(),
                grade: 97.0,
                course_type: "U".to_string(),
                ib_ap_mark: None,
            }],
            avg_grade_12: Some(95.5),
            ..Default::default()
        }
    }

    #[test]
    fn upsert_creates_then_replaces() {
        let mut store = InMemorySubmissionStore::new();
        store.upsert("user-1", submission("Deferred")).unwrap();
        store.upsert("user-1", submission("Accepted")).unwrap();

        assert_eq!(store.len(), 1);
        let saved = store.get("user-1").unwrap().unwrap();
        assert_eq!(saved.universities[0].status, "Accepted");
        assert_eq!(store.get("user-2").unwrap(), None);
    }

    #[test]
    fn empty_user_id_is_rejected() {
        let mut store = InMemorySubmissionStore::new();
        assert!(matches!(
            store.upsert("  ", Submission::default()),
            Err(StoreError::EmptyUserId)
        ));
    }

    #[test]
    fn grade_entries_use_backend_field_names() {
        let json = serde_json::to_value(&submission("Accepted").grades[0]).unwrap();
        assert_eq!(json["courseCode"], "MCV4U");
        assert_eq!(json["type"], "U");
        assert!(json.get("ibApMark").is_none());
    }
}
