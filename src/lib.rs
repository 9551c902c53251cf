//! Batch pipeline for self-reported university admission results.
//!
//! Stages run in order, each reading the previous stage's JSON file:
//! CSV ingestion, field normalization, average cleanup, projection to the
//! published schema, and ranking by competitiveness or popularity.

pub mod aliases;
pub mod analyzer;
pub mod cleaner;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod projector;
pub mod report;
pub mod store;

pub use error::PipelineError;
