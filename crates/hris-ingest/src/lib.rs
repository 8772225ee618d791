//! Batch ingestion pipeline: reference resolution, upserts, quarantine and the
//! per-batch coordinator.

mod config;
mod coordinator;
mod quarantine;
mod resolver;
mod upsert;

use hris_adapters::SourceError;
use hris_storage::StoreError;
use thiserror::Error;

pub use config::IngestConfig;
pub use coordinator::{connect_from_config, Ingestor};
pub use quarantine::QuarantineSink;
pub use resolver::{ReferenceResolver, References};
pub use upsert::{upsert_department, upsert_employee, upsert_job, UpsertOutcome};

pub const CRATE_NAME: &str = "hris-ingest";

/// Batch-fatal failures. Row-level problems never surface here; they are
/// quarantined instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("the batch has no rows")]
    EmptyBatch,
    #[error("the batch must have between 1 and {max} rows (got {rows})")]
    BatchTooLarge { rows: usize, max: usize },
    #[error("missing required columns {0:?}")]
    MissingColumns(Vec<String>),
    #[error("row {row_index}: {detail}")]
    InvalidRow { row_index: usize, detail: String },
    #[error("row {row_index}: conflicts with an existing record ({constraint})")]
    Conflict { row_index: usize, constraint: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("writing quarantine artifact: {0:#}")]
    Quarantine(anyhow::Error),
}

impl IngestError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Source(SourceError::NotFound(_)))
    }

    /// Caller-correctable input problems, as opposed to store or filesystem faults.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Source(SourceError::Io { .. }) => false,
            Self::Source(_)
            | Self::EmptyBatch
            | Self::BatchTooLarge { .. }
            | Self::MissingColumns(_)
            | Self::InvalidRow { .. }
            | Self::Conflict { .. } => true,
            Self::Store(_) | Self::Quarantine(_) => false,
        }
    }
}
