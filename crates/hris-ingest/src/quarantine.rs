use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use hris_adapters::RawRow;
use hris_core::{BatchId, IngestKind, RejectReason, RejectedRow};
use hris_storage::{ArtifactStore, StoredArtifact};
use tracing::info;

/// Rejected rows of one batch, in arrival order.
#[derive(Debug)]
pub struct QuarantineSink {
    kind: IngestKind,
    batch_id: BatchId,
    rows: Vec<RejectedRow>,
}

impl QuarantineSink {
    pub fn new(kind: IngestKind, batch_id: BatchId) -> Self {
        Self {
            kind,
            batch_id,
            rows: Vec::new(),
        }
    }

    /// Record a rejection with a snapshot of the raw (un-normalized) fields.
    pub fn reject(&mut self, reason: RejectReason, row: &RawRow) {
        info!(
            kind = self.kind.as_str(),
            batch_id = %self.batch_id,
            reason = reason.as_str(),
            row_index = row.index,
            "reject_row"
        );
        self.rows.push(RejectedRow {
            reason,
            row_index: row.index,
            id: row.get("id").to_string(),
            name: row.get("name").to_string(),
            datetime: row.get("datetime").to_string(),
            department_id: row.get("department_id").to_string(),
            job_id: row.get("job_id").to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn counts(&self) -> BTreeMap<RejectReason, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.reason).or_default() += 1;
        }
        counts
    }

    /// Location of this batch's artifact, relative to the quarantine root.
    fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.kind.as_str()).join(format!("rejected_{}.csv", self.batch_id))
    }

    /// Persist the accumulated rows. Nothing is written for an empty batch.
    pub async fn flush(self, store: &ArtifactStore) -> anyhow::Result<Option<StoredArtifact>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let relative_path = self.relative_path();
        let bytes = encode_rows(&self.rows)?;
        let stored = store
            .store_bytes(&relative_path, &bytes)
            .await
            .with_context(|| format!("storing quarantine artifact for batch {}", self.batch_id))?;
        info!(
            batch_id = %self.batch_id,
            rows = self.rows.len(),
            sha256 = %stored.content_hash,
            path = %stored.absolute_path.display(),
            "quarantine artifact written"
        );
        Ok(Some(stored))
    }
}

fn encode_rows(rows: &[RejectedRow]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("serializing rejected row {}", row.row_index))?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flushing quarantine CSV: {}", err.error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn batch_id() -> BatchId {
        BatchId::generate(Utc.with_ymd_and_hms(2021, 7, 27, 0, 0, 0).single().unwrap())
    }

    fn raw(index: usize, department_id: &str) -> RawRow {
        RawRow::new(
            index,
            [
                ("id", "4"),
                ("name", "Ann Lee"),
                ("datetime", "2021-01-02"),
                ("department_id", department_id),
                ("job_id", "3"),
            ],
        )
    }

    #[tokio::test]
    async fn empty_sink_writes_nothing() {
        let dir = tempdir().unwrap();
        let sink = QuarantineSink::new(IngestKind::HiredEmployees, batch_id());
        let stored = sink.flush(&ArtifactStore::new(dir.path())).await.unwrap();
        assert!(stored.is_none());
        assert!(!dir.path().join("hired_employees").exists());
    }

    #[tokio::test]
    async fn artifact_keeps_raw_text_reason_and_order() {
        let dir = tempdir().unwrap();
        let id = batch_id();
        let mut sink = QuarantineSink::new(IngestKind::HiredEmployees, id.clone());
        sink.reject(RejectReason::MissingFkValues, &raw(2, ""));
        sink.reject(RejectReason::FkNotFound, &raw(5, "99"));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.counts()[&RejectReason::FkNotFound], 1);

        let stored = sink
            .flush(&ArtifactStore::new(dir.path()))
            .await
            .unwrap()
            .expect("artifact");
        assert_eq!(
            stored.absolute_path,
            dir.path()
                .join("hired_employees")
                .join(format!("rejected_{id}.csv"))
        );

        let text = std::fs::read_to_string(&stored.absolute_path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "reason,row_index,id,name,datetime,department_id,job_id");
        assert_eq!(lines[1], "missing_fk_values,2,4,Ann Lee,2021-01-02,,3");
        assert_eq!(lines[2], "fk_not_found,5,4,Ann Lee,2021-01-02,99,3");
        assert_eq!(lines.len(), 3);
    }
}
