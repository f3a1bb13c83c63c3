//! Ingestion service: validate + create-only persist.

pub mod service;

pub use service::{IngestionResult, IngestionService};
