use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use hris_core::MAX_ROWS;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source {0} does not exist")]
    NotFound(PathBuf),
    #[error("invalid file name `{0}`: must be a plain file name inside the data directory")]
    InvalidFileName(String),
    #[error("invalid window: {0}")]
    InvalidWindow(String),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `(offset, limit)` bounds on the data rows read in one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    /// Validate caller-supplied bounds: `offset >= 0` and `1 <= limit <= MAX_ROWS`.
    pub fn new(offset: i64, limit: i64) -> Result<Self, SourceError> {
        if offset < 0 {
            return Err(SourceError::InvalidWindow(format!(
                "offset must be >= 0 (got {offset})"
            )));
        }
        if limit < 1 || limit > MAX_ROWS as i64 {
            return Err(SourceError::InvalidWindow(format!(
                "limit must be between 1 and {MAX_ROWS} (got {limit})"
            )));
        }
        Ok(Self {
            offset: offset as usize,
            limit: limit as usize,
        })
    }

    /// Page request from optional caller bounds: the first `MAX_ROWS` rows by default.
    pub fn page(offset: Option<i64>, limit: Option<i64>) -> Result<Self, SourceError> {
        Self::new(offset.unwrap_or(0), limit.unwrap_or(MAX_ROWS as i64))
    }
}

/// One data row: column name -> raw cell text. Missing cells read as empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 0-based position within the window.
    pub index: usize,
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn new<K, V>(index: usize, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            index,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct CsvWindow {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Data rows in the whole source, regardless of the window.
    pub total: usize,
}

impl CsvWindow {
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|column| !self.headers.iter().any(|h| h == *column))
            .map(|column| column.to_string())
            .collect()
    }
}

/// Where a batch reads its rows from.
#[derive(Debug, Clone)]
pub enum CsvSource {
    /// A named file inside the managed data directory.
    File { dir: PathBuf, name: String },
    /// An uploaded byte stream, already buffered.
    Upload { label: String, bytes: Vec<u8> },
}

impl CsvSource {
    pub fn file(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self::File {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn upload(label: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Upload {
            label: label.into(),
            bytes: bytes.into(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::File { dir, name } => dir.join(name).display().to_string(),
            Self::Upload { label, .. } => format!("upload:{label}"),
        }
    }

    /// Read the rows selected by `window`; `None` selects the whole source.
    pub async fn read(&self, window: Option<Window>) -> Result<CsvWindow, SourceError> {
        match self {
            Self::File { dir, name } => {
                let path = resolve_managed_path(dir, name)?;
                let bytes = fs::read(&path).await.map_err(|source| {
                    if source.kind() == std::io::ErrorKind::NotFound {
                        SourceError::NotFound(path.clone())
                    } else {
                        SourceError::Io {
                            path: path.clone(),
                            source,
                        }
                    }
                })?;
                parse_window(&bytes, window)
            }
            Self::Upload { bytes, .. } => parse_window(bytes, window),
        }
    }
}

fn resolve_managed_path(dir: &Path, name: &str) -> Result<PathBuf, SourceError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(dir.join(name)),
        _ => Err(SourceError::InvalidFileName(name.to_string())),
    }
}

fn parse_window(bytes: &[u8], window: Option<Window>) -> Result<CsvWindow, SourceError> {
    let (offset, limit) = window.map_or((0, usize::MAX), |w| (w.offset, w.limit));
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    let mut total = 0usize;
    for (position, record) in reader.records().enumerate() {
        total += 1;
        let in_window = position >= offset && rows.len() < limit;
        if !in_window {
            continue;
        }
        let record = record?;
        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), record.get(i).unwrap_or("").to_string()));
        rows.push(RawRow::new(rows.len(), fields));
    }

    Ok(CsvWindow {
        headers,
        rows,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HIRED: &str = "id,name,datetime,department_id,job_id\n\
        1,John Doe,2021-07-27T16:02:08Z,5,3\n\
        2,,2021-07-27T16:02:08Z,5,3\n\
        3,Ann Lee,2021-01-02,,3\n";

    #[test]
    fn window_bounds_are_validated() {
        assert!(Window::new(0, 1).is_ok());
        assert!(Window::new(10, MAX_ROWS as i64).is_ok());
        assert!(matches!(Window::new(-1, 10), Err(SourceError::InvalidWindow(msg)) if msg.contains("offset")));
        assert!(matches!(Window::new(0, 0), Err(SourceError::InvalidWindow(msg)) if msg.contains("limit")));
        assert!(Window::new(0, MAX_ROWS as i64 + 1).is_err());
    }

    #[test]
    fn page_defaults_to_first_max_rows() {
        let default = Window::page(None, None).unwrap();
        assert_eq!(default, Window { offset: 0, limit: MAX_ROWS });
        assert_eq!(Window::page(Some(0), None).unwrap(), default);
        assert_eq!(Window::page(Some(20), Some(5)).unwrap(), Window { offset: 20, limit: 5 });
        assert!(Window::page(None, Some(0)).is_err());
    }

    #[tokio::test]
    async fn upload_window_keeps_text_and_total() {
        let source = CsvSource::upload("hired.csv", HIRED.as_bytes().to_vec());
        let window = source
            .read(Some(Window { offset: 1, limit: 5 }))
            .await
            .unwrap();

        assert_eq!(window.total, 3);
        assert_eq!(window.rows.len(), 2);
        assert_eq!(window.rows[0].index, 0);
        assert_eq!(window.rows[0].get("id"), "2");
        assert_eq!(window.rows[0].get("name"), "");
        assert_eq!(window.rows[1].get("department_id"), "");
        assert_eq!(window.rows[1].get("unknown"), "");
        assert!(window
            .missing_columns(&["id", "name", "datetime", "department_id", "job_id"])
            .is_empty());
    }

    #[tokio::test]
    async fn limit_caps_rows_but_not_total() {
        let source = CsvSource::upload("hired.csv", HIRED.as_bytes().to_vec());
        let window = source.read(Some(Window { offset: 0, limit: 1 })).await.unwrap();
        assert_eq!(window.rows.len(), 1);
        assert_eq!(window.total, 3);
    }

    #[tokio::test]
    async fn short_rows_read_as_empty_text() {
        let source = CsvSource::upload("d.csv", b"id,department\n7\n".to_vec());
        let window = source.read(None).await.unwrap();
        assert_eq!(window.rows[0].get("id"), "7");
        assert_eq!(window.rows[0].get("department"), "");
        assert_eq!(window.missing_columns(&["id", "department"]), Vec::<String>::new());
        assert_eq!(window.missing_columns(&["id", "job"]), vec!["job".to_string()]);
    }

    #[tokio::test]
    async fn managed_files_resolve_inside_the_data_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hired.csv"), HIRED).unwrap();

        let window = CsvSource::file(dir.path(), "hired.csv")
            .read(None)
            .await
            .unwrap();
        assert_eq!(window.rows.len(), 3);

        let missing = CsvSource::file(dir.path(), "absent.csv")
            .read(None)
            .await;
        assert!(matches!(missing, Err(SourceError::NotFound(_))));

        for name in ["../hired.csv", "nested/hired.csv", "/etc/passwd", "..", ""] {
            let err = CsvSource::file(dir.path(), name)
                .read(None)
                .await;
            assert!(matches!(err, Err(SourceError::InvalidFileName(_))), "{name}");
        }
    }
}
