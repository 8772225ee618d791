//! Relational store sessions + immutable artifact storage for HRIS ingestion.

mod memory;
mod postgres;

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use hris_core::{Department, Employee, Job};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub use memory::{MemorySession, MemoryState, MemoryStore};
pub use postgres::{PgStore, PgStoreConfig};

pub const CRATE_NAME: &str = "hris-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: String },
    #[error("foreign key constraint `{constraint}` violated")]
    ForeignKeyViolation { constraint: String },
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let constraint = db.constraint().unwrap_or("unknown").to_string();
            if db.is_unique_violation() {
                return Self::UniqueViolation { constraint };
            }
            if db.is_foreign_key_violation() {
                return Self::ForeignKeyViolation { constraint };
            }
        }
        Self::Database(err)
    }
}

/// Factory for transactional sessions. One session backs exactly one batch.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short engine label reported by the info endpoint.
    fn engine(&self) -> &'static str;

    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// A unit of work against the store.
///
/// Employee writes are flushed immediately inside a row-scoped savepoint: a
/// failing write leaves every earlier write of the session intact and the
/// session usable. Dropping a session without committing rolls it back.
#[async_trait]
pub trait StoreSession: Send {
    async fn get_department(&mut self, id: i64) -> Result<Option<Department>, StoreError>;

    async fn get_job(&mut self, id: i64) -> Result<Option<Job>, StoreError>;

    async fn get_employee(&mut self, id: i64) -> Result<Option<Employee>, StoreError>;

    async fn insert_department(&mut self, department: &Department) -> Result<(), StoreError>;

    async fn update_department(&mut self, department: &Department) -> Result<(), StoreError>;

    async fn insert_job(&mut self, job: &Job) -> Result<(), StoreError>;

    async fn update_job(&mut self, job: &Job) -> Result<(), StoreError>;

    async fn insert_employee(&mut self, employee: &Employee) -> Result<(), StoreError>;

    async fn update_employee(&mut self, employee: &Employee) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
}

/// Write-once artifact area rooted at a managed directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Store bytes at `relative_path` using an fsynced temp file and atomic rename.
    pub async fn store_bytes(
        &self,
        relative_path: impl AsRef<Path>,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating artifact directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp artifact file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp artifact file {}", temp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("syncing temp artifact file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp artifact {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }

        Ok(StoredArtifact {
            content_hash: Self::sha256_hex(bytes),
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
        })
    }

    pub async fn remove(&self, artifact: &StoredArtifact) -> anyhow::Result<()> {
        fs::remove_file(&artifact.absolute_path)
            .await
            .with_context(|| format!("removing artifact {}", artifact.absolute_path.display()))
    }
}
