use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use hris_adapters::{
    is_null_sentinel, parse_date, parse_identifier, split_name, CsvSource, PersonName, RawRow,
    Window,
};
use hris_core::{
    BatchId, BatchResult, Department, Employee, IngestKind, Job, RejectReason, MAX_ROWS,
};
use hris_storage::{ArtifactStore, PgStore, Store, StoreError, StoreSession};
use tracing::{info, info_span, warn, Instrument};

use crate::{
    upsert_department, upsert_employee, upsert_job, IngestConfig, IngestError, QuarantineSink,
    ReferenceResolver, UpsertOutcome,
};

/// Drives one batch per call: read window, validate, upsert, quarantine, commit.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn Store>,
    data_dir: PathBuf,
    quarantine: ArtifactStore,
}

impl Ingestor {
    pub fn new(store: Arc<dyn Store>, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let quarantine = ArtifactStore::new(data_dir.join("errors"));
        Self {
            store,
            data_dir,
            quarantine,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Ingest a file from the managed data directory.
    pub async fn ingest_file(
        &self,
        kind: IngestKind,
        file_name: &str,
        window: Option<Window>,
    ) -> Result<BatchResult, IngestError> {
        let source = CsvSource::file(&self.data_dir, file_name);
        self.ingest(kind, &source, window).await
    }

    /// Run one batch. `None` for `window` submits the whole source as the batch.
    pub async fn ingest(
        &self,
        kind: IngestKind,
        source: &CsvSource,
        window: Option<Window>,
    ) -> Result<BatchResult, IngestError> {
        let batch_id = BatchId::generate(Utc::now());
        let span = info_span!(
            "ingest_batch",
            kind = kind.as_str(),
            batch_id = %batch_id,
            source = %source.describe()
        );
        self.run_batch(kind, source, window, batch_id)
            .instrument(span)
            .await
    }

    async fn run_batch(
        &self,
        kind: IngestKind,
        source: &CsvSource,
        window: Option<Window>,
        batch_id: BatchId,
    ) -> Result<BatchResult, IngestError> {
        let csv = source.read(window).await?;
        let rows = csv.rows.len();
        if rows == 0 {
            return Err(IngestError::EmptyBatch);
        }
        if rows > MAX_ROWS {
            return Err(IngestError::BatchTooLarge {
                rows,
                max: MAX_ROWS,
            });
        }
        let missing = csv.missing_columns(kind.required_columns());
        if !missing.is_empty() {
            return Err(IngestError::MissingColumns(missing));
        }

        let mut result = match kind {
            IngestKind::Departments => self.ingest_catalog(kind, &csv.rows).await?,
            IngestKind::Jobs => self.ingest_catalog(kind, &csv.rows).await?,
            IngestKind::HiredEmployees => self.ingest_hired(batch_id, &csv.rows).await?,
        };
        result.offset = window.map(|w| w.offset);
        result.limit = window.map(|w| w.limit);
        result.total = Some(csv.total);

        info!(
            rows = result.rows,
            created = result.created,
            updated = result.updated,
            rejected = result.total_rejected(),
            "batch committed"
        );
        Ok(result)
    }

    /// Departments and jobs: unconditional upsert, any bad row aborts the batch.
    async fn ingest_catalog(
        &self,
        kind: IngestKind,
        rows: &[RawRow],
    ) -> Result<BatchResult, IngestError> {
        let mut session = self.store.begin().await?;
        match apply_catalog_rows(session.as_mut(), kind, rows).await {
            Ok((created, updated)) => {
                session.commit().await?;
                Ok(BatchResult {
                    rows: rows.len(),
                    created,
                    updated,
                    ..Default::default()
                })
            }
            Err(err) => {
                rollback_quietly(session).await;
                Err(err)
            }
        }
    }

    async fn ingest_hired(
        &self,
        batch_id: BatchId,
        rows: &[RawRow],
    ) -> Result<BatchResult, IngestError> {
        let mut session = self.store.begin().await?;
        let mut sink = QuarantineSink::new(IngestKind::HiredEmployees, batch_id.clone());

        let (created, updated) = match apply_hired_rows(session.as_mut(), rows, &mut sink).await {
            Ok(counts) => counts,
            Err(err) => {
                rollback_quietly(session).await;
                return Err(err.into());
            }
        };

        let counts = sink.counts();
        let artifact = match sink.flush(&self.quarantine).await {
            Ok(artifact) => artifact,
            Err(err) => {
                rollback_quietly(session).await;
                return Err(IngestError::Quarantine(err));
            }
        };

        if let Err(err) = session.commit().await {
            if let Some(stored) = &artifact {
                if let Err(remove_err) = self.quarantine.remove(stored).await {
                    warn!(error = %remove_err, "could not remove quarantine artifact of failed batch");
                }
            }
            return Err(err.into());
        }

        let count = |reason: RejectReason| counts.get(&reason).copied().unwrap_or(0);
        Ok(BatchResult {
            rows: rows.len(),
            created,
            updated,
            skipped_missing_fk: Some(
                count(RejectReason::MissingFkValues) + count(RejectReason::FkNotFound),
            ),
            skipped_bad_row: Some(count(RejectReason::InvalidIdOrDateOrName)),
            skipped_dup_identity: Some(count(RejectReason::DuplicateUniqueIdentity)),
            rejections: Some(counts.clone()),
            batch_id: Some(batch_id),
            rejected_file: artifact.map(|stored| stored.absolute_path.display().to_string()),
            ..Default::default()
        })
    }
}

/// Build an [`Ingestor`] backed by Postgres from process configuration.
pub async fn connect_from_config(config: &IngestConfig) -> anyhow::Result<Ingestor> {
    let store = PgStore::connect(&config.store_config())
        .await
        .context("connecting to the relational store")?;
    Ok(Ingestor::new(Arc::new(store), config.data_dir.clone()))
}

async fn rollback_quietly(session: Box<dyn StoreSession>) {
    if let Err(err) = session.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

/// Fields of a hired-employee row, all parsed up front.
struct HiredFields {
    id: Option<i64>,
    hire_date: Option<NaiveDate>,
    name: Option<PersonName>,
    department_id: Option<i64>,
    job_id: Option<i64>,
}

impl HiredFields {
    fn parse(row: &RawRow) -> Self {
        Self {
            id: parse_identifier(row.get("id")),
            hire_date: parse_date(row.get("datetime")),
            name: split_name(row.get("name")),
            department_id: parse_identifier(row.get("department_id")),
            job_id: parse_identifier(row.get("job_id")),
        }
    }
}

/// Checks that need no store access, in rejection priority order.
fn check_fields(fields: HiredFields) -> Result<(Employee, i64, i64), RejectReason> {
    let (Some(id), Some(hire_date), Some(name)) = (fields.id, fields.hire_date, fields.name) else {
        return Err(RejectReason::InvalidIdOrDateOrName);
    };
    let (Some(department_id), Some(job_id)) = (fields.department_id, fields.job_id) else {
        return Err(RejectReason::MissingFkValues);
    };
    let employee = Employee {
        id,
        first_name: name.first,
        last_name: name.last,
        hire_date,
        salary: None,
        department_id,
        job_id,
    };
    Ok((employee, department_id, job_id))
}

async fn apply_hired_rows(
    session: &mut dyn StoreSession,
    rows: &[RawRow],
    sink: &mut QuarantineSink,
) -> Result<(usize, usize), StoreError> {
    let mut resolver = ReferenceResolver::new();
    let mut created = 0usize;
    let mut updated = 0usize;

    for row in rows {
        let (employee, department_id, job_id) = match check_fields(HiredFields::parse(row)) {
            Ok(validated) => validated,
            Err(reason) => {
                sink.reject(reason, row);
                continue;
            }
        };

        let references = resolver.resolve(session, department_id, job_id).await?;
        if !references.all_exist() {
            sink.reject(RejectReason::FkNotFound, row);
            continue;
        }

        match upsert_employee(session, employee).await? {
            UpsertOutcome::Created => created += 1,
            UpsertOutcome::Updated | UpsertOutcome::Unchanged => updated += 1,
            UpsertOutcome::DuplicateIdentity => {
                sink.reject(RejectReason::DuplicateUniqueIdentity, row)
            }
        }
    }

    Ok((created, updated))
}

async fn apply_catalog_rows(
    session: &mut dyn StoreSession,
    kind: IngestKind,
    rows: &[RawRow],
) -> Result<(usize, usize), IngestError> {
    let label_column = match kind {
        IngestKind::Departments => "department",
        _ => "job",
    };
    let mut created = 0usize;
    let mut updated = 0usize;

    for row in rows {
        let id = parse_identifier(row.get("id")).ok_or_else(|| IngestError::InvalidRow {
            row_index: row.index,
            detail: format!("`id` value `{}` is not an integer", row.get("id")),
        })?;
        let label = row.get(label_column).trim();
        if is_null_sentinel(label) {
            return Err(IngestError::InvalidRow {
                row_index: row.index,
                detail: format!("`{label_column}` is empty"),
            });
        }

        let outcome = match kind {
            IngestKind::Departments => {
                let department = Department {
                    id,
                    name: label.to_string(),
                };
                upsert_department(session, department).await
            }
            _ => {
                let job = Job {
                    id,
                    title: label.to_string(),
                };
                upsert_job(session, job).await
            }
        };

        match outcome {
            Ok(UpsertOutcome::Created) => created += 1,
            Ok(UpsertOutcome::Updated) => updated += 1,
            Ok(_) => {}
            Err(StoreError::UniqueViolation { constraint }) => {
                return Err(IngestError::Conflict {
                    row_index: row.index,
                    constraint,
                })
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok((created, updated))
}
