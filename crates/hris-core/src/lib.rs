//! Core domain model and batch outcome types for HRIS ingestion.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "hris-core";

/// Upper bound on the number of rows a single batch may carry.
pub const MAX_ROWS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub title: String,
}

/// Employee row. `(first_name, last_name, hire_date)` is unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub hire_date: NaiveDate,
    pub salary: Option<f64>,
    pub department_id: i64,
    pub job_id: i64,
}

impl Employee {
    pub fn identity(&self) -> (&str, &str, NaiveDate) {
        (&self.first_name, &self.last_name, self.hire_date)
    }
}

/// The three ingestion flavours exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestKind {
    Departments,
    Jobs,
    HiredEmployees,
}

impl IngestKind {
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Self::Departments => &["id", "department"],
            Self::Jobs => &["id", "job"],
            Self::HiredEmployees => &["id", "name", "datetime", "department_id", "job_id"],
        }
    }

    /// Subdirectory name used for quarantine artifacts of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Departments => "departments",
            Self::Jobs => "jobs",
            Self::HiredEmployees => "hired_employees",
        }
    }
}

impl fmt::Display for IngestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "departments" | "department" => Ok(Self::Departments),
            "jobs" | "job" => Ok(Self::Jobs),
            "hired" | "hired_employees" | "hired-employees" | "employees" => {
                Ok(Self::HiredEmployees)
            }
            other => Err(format!(
                "unknown ingest kind `{other}` (expected departments, jobs or hired)"
            )),
        }
    }
}

/// Row-level rejection reasons, in validation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidIdOrDateOrName,
    MissingFkValues,
    FkNotFound,
    DuplicateUniqueIdentity,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidIdOrDateOrName => "invalid_id_or_date_or_name",
            Self::MissingFkValues => "missing_fk_values",
            Self::FkNotFound => "fk_not_found",
            Self::DuplicateUniqueIdentity => "duplicate_unique_identity",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quarantined row. Field values are the raw source text, never the normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub reason: RejectReason,
    pub row_index: usize,
    pub id: String,
    pub name: String,
    pub datetime: String,
    pub department_id: String,
    pub job_id: String,
}

/// Batch token: UTC timestamp plus a short random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary returned to the transport layer for every ingestion call.
///
/// The `skipped_*`, `rejections`, `batch_id` and `rejected_file` fields are only
/// populated for hired-employee batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_missing_fk: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_bad_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_dup_identity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejections: Option<BTreeMap<RejectReason, usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl BatchResult {
    pub fn total_rejected(&self) -> usize {
        self.skipped_missing_fk.unwrap_or(0)
            + self.skipped_bad_row.unwrap_or(0)
            + self.skipped_dup_identity.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn batch_id_carries_utc_stamp_and_suffix() {
        let now = Utc.with_ymd_and_hms(2021, 7, 27, 16, 2, 8).single().unwrap();
        let id = BatchId::generate(now);
        let (stamp, suffix) = id.as_str().split_once('_').unwrap();
        assert_eq!(stamp, "20210727T160208Z");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, BatchId::generate(now));
    }

    #[test]
    fn kinds_parse_from_cli_spellings() {
        assert_eq!("hired".parse::<IngestKind>().unwrap(), IngestKind::HiredEmployees);
        assert_eq!("Jobs".parse::<IngestKind>().unwrap(), IngestKind::Jobs);
        assert!("payroll".parse::<IngestKind>().is_err());
        assert_eq!(IngestKind::HiredEmployees.to_string(), "hired_employees");
    }

    #[test]
    fn department_result_omits_employee_fields() {
        let result = BatchResult {
            rows: 2,
            created: 1,
            updated: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"rows": 2, "created": 1, "updated": 1}));
    }

    #[test]
    fn reasons_serialize_as_snake_case_codes() {
        let json = serde_json::to_string(&RejectReason::DuplicateUniqueIdentity).unwrap();
        assert_eq!(json, "\"duplicate_unique_identity\"");
        assert_eq!(RejectReason::FkNotFound.as_str(), "fk_not_found");
    }
}
