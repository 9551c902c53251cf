//! Repair pass for the `Average` field.
//!
//! Works on loosely typed JSON so it can fix files written by older tools,
//! where `Average` may be a string, a number, missing, or something else.

use crate::models::{CleanupStats, timestamp_now};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const AVERAGE_FIELD: &str = "Average";
pub const CLEANUP_OPERATION: &str = "average_field_cleanup";

static FLOAT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")
        .expect("valid float prefix pattern")
});

/// Make every record's `Average` a JSON number or null, in place.
pub fn clean_averages(records: &mut [Map<String, Value>]) -> CleanupStats {
    let mut stats = CleanupStats {
        total: records.len(),
        ..Default::default()
    };

    for (idx, record) in records.iter_mut().enumerate() {
        let position = idx + 1;
        let cleaned = match record.get(AVERAGE_FIELD) {
            None | Some(Value::Null) => {
                stats.null_undefined += 1;
                Value::Null
            }
            Some(Value::Number(_)) => {
                stats.already_numeric += 1;
                continue;
            }
            Some(Value::String(text)) if text.trim().is_empty() => {
                stats.empty_string += 1;
                Value::Null
            }
            Some(Value::String(text)) => match parse_float_prefix(text) {
                Some(value) => {
                    stats.converted += 1;
                    debug!(position, raw = %text, value, "converted average");
                    Value::from(value)
                }
                None => {
                    stats.invalid += 1;
                    warn!(position, value = %text, "unparseable average, set to null");
                    Value::Null
                }
            },
            Some(other) => {
                stats.invalid += 1;
                warn!(position, value = %other, "unexpected average type, set to null");
                Value::Null
            }
        };
        record.insert(AVERAGE_FIELD.to_string(), cleaned);
    }

    stats
}

/// Leading decimal literal of the trimmed text, like JavaScript's `parseFloat`.
/// Non-finite results count as unparseable.
pub fn parse_float_prefix(text: &str) -> Option<f64> {
    FLOAT_PREFIX
        .find(text.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Append the cleanup note to `metadata.processing_notes`, creating it if needed.
pub fn append_cleanup_note(metadata: &mut Map<String, Value>, stats: CleanupStats) {
    let note = json!({
        "timestamp": timestamp_now(),
        "operation": CLEANUP_OPERATION,
        "description": "Converted Average values to numbers; blank or unparseable values set to null",
        "stats": {
            "total": stats.total,
            "converted": stats.converted,
            "already_numeric": stats.already_numeric,
            "empty_string": stats.empty_string,
            "invalid": stats.invalid,
            "null_undefined": stats.null_undefined,
        },
    });

    match metadata
        .get_mut("processing_notes")
        .and_then(Value::as_array_mut)
    {
        Some(notes) => notes.push(note),
        None => {
            metadata.insert("processing_notes".to_string(), Value::Array(vec![note]));
        }
    }
}

/// Sibling file that receives the untouched input before cleanup.
pub fn backup_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    input.with_file_name(format!("{stem}.backup.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::models::ProcessingNote;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Map<String, Value>> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn every_branch_is_counted() {
        let mut data = records(vec![
            json!({"Average": 93.5}),
            json!({"Average": "91"}),
            json!({"Average": " 88.5% "}),
            json!({"Average": "   "}),
            json!({"Average": "idk"}),
            json!({"Average": null}),
            json!({"Status": "Accepted"}),
            json!({"Average": [90]}),
        ]);

        let stats = clean_averages(&mut data);

        assert_eq!(
            stats,
            CleanupStats {
                total: 8,
                converted: 2,
                already_numeric: 1,
                empty_string: 1,
                invalid: 2,
                null_undefined: 2,
            }
        );
        assert_eq!(data[0]["Average"], json!(93.5));
        assert_eq!(data[1]["Average"], json!(91.0));
        assert_eq!(data[2]["Average"], json!(88.5));
        for idx in 3..8 {
            assert_eq!(data[idx]["Average"], Value::Null);
        }
    }

    #[test]
    fn parse_float_prefix_matches_javascript() {
        assert_eq!(parse_float_prefix("92%"), Some(92.0));
        assert_eq!(parse_float_prefix(" -3.5abc"), Some(-3.5));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("1e2"), Some(100.0));
        assert_eq!(parse_float_prefix("~90"), None);
        assert_eq!(parse_float_prefix("Infinity"), None);
        assert_eq!(parse_float_prefix("1e999"), None);
    }

    #[test]
    fn note_is_appended_to_existing_notes() {
        let mut metadata = Map::new();
        metadata.insert("processing_notes".to_string(), json!(["normalized"]));
        append_cleanup_note(&mut metadata, CleanupStats::default());

        let notes = metadata["processing_notes"].as_array().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1]["operation"], json!(CLEANUP_OPERATION));
        assert_eq!(notes[1]["stats"]["total"], json!(0));
    }

    #[test]
    fn cleanup_note_reads_back_as_operation_note() {
        let stats = CleanupStats {
            total: 5,
            converted: 2,
            already_numeric: 1,
            empty_string: 1,
            invalid: 0,
            null_undefined: 1,
        };
        let mut metadata = Map::new();
        append_cleanup_note(&mut metadata, stats);

        let notes: Vec<ProcessingNote> =
            serde_json::from_value(metadata["processing_notes"].clone()).unwrap();
        match &notes[..] {
            [ProcessingNote::Operation(note)] => {
                assert_eq!(note.operation, CLEANUP_OPERATION);
                assert_eq!(note.stats, stats);
                assert!(!note.timestamp.is_empty());
            }
            other => panic!("unexpected notes: {other:?}"),
        }
    }

    #[test]
    fn backup_sits_next_to_input() {
        assert_eq!(
            backup_path(Path::new("out/normalized.json")),
            PathBuf::from("out/normalized.backup.json")
        );
    }

    fn loose_average() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<i32>().prop_map(Value::from),
            (0.0f64..120.0).prop_map(Value::from),
            "[ 0-9.%a-z~-]{0,8}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ]
    }

    proptest! {
        #[test]
        fn second_pass_changes_nothing(averages in prop::collection::vec(loose_average(), 0..20)) {
            let mut data: Vec<Map<String, Value>> = averages
                .into_iter()
                .map(|v| {
                    let mut m = Map::new();
                    m.insert(AVERAGE_FIELD.to_string(), v);
                    m
                })
                .collect();

            clean_averages(&mut data);
            let first = data.clone();
            let stats = clean_averages(&mut data);

            prop_assert_eq!(&first, &data);
            prop_assert_eq!(stats.converted + stats.empty_string + stats.invalid, 0);
        }
    }
}
