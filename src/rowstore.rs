//! Row files: JSON arrays of article objects keyed by column name.
//!
//! These replace the newsroom's spreadsheets. Columns are checked before
//! decoding so a file exported with a renamed header fails loudly instead of
//! producing empty articles.

use crate::models::ArticleRecord;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument, warn};

pub const TITLE: &str = "제목";
pub const OUTLET: &str = "언론사";
pub const BODY: &str = "본문";
pub const CATEGORY: &str = "카테고리";
pub const KEYWORD: &str = "키워드";
pub const URL: &str = "URL";

/// Columns every input row file must carry.
pub const REQUIRED_COLUMNS: &[&str] = &[TITLE, OUTLET, BODY, CATEGORY, KEYWORD, URL];

#[derive(Debug, Error)]
pub enum RowStoreError {
    #[error("row file {0} does not exist")]
    NotFound(PathBuf),
    #[error("could not access row file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("row file {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("row {row} of {path} has no {column:?} column")]
    MissingColumn {
        path: PathBuf,
        column: String,
        row: usize,
    },
}

/// Load articles from `path`, checking that every row has `required` columns.
///
/// # Arguments
///
/// * `path` - JSON array of row objects
/// * `required` - Column names every row must carry, e.g. [`REQUIRED_COLUMNS`]
///
/// # Returns
///
/// The decoded rows in file order. Rows with an empty body are dropped with a
/// warning.
///
/// # Examples
///
/// ```ignore
/// let rows = load_rows(Path::new("data/회사_20250506_naver.json"), REQUIRED_COLUMNS).await?;
/// ```
///
/// # Errors
///
/// - [`RowStoreError::NotFound`] when the file does not exist
/// - [`RowStoreError::Io`] when it cannot be read
/// - [`RowStoreError::Malformed`] when it is not an array of objects
/// - [`RowStoreError::MissingColumn`] naming the first absent column
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_rows(path: &Path, required: &[&str]) -> Result<Vec<ArticleRecord>, RowStoreError> {
    let raw = fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RowStoreError::NotFound(path.to_path_buf())
        } else {
            RowStoreError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    let records = parse_rows(path, &raw, required)?;
    info!(count = records.len(), "Loaded rows");
    Ok(records)
}

fn parse_rows(path: &Path, raw: &str, required: &[&str]) -> Result<Vec<ArticleRecord>, RowStoreError> {
    let malformed = |reason: String| RowStoreError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let rows = match serde_json::from_str::<Value>(raw).map_err(|e| malformed(e.to_string()))? {
        Value::Array(rows) => rows,
        other => return Err(malformed(format!("expected an array of rows, found {}", kind(&other)))),
    };

    let mut records = Vec::with_capacity(rows.len());
    for (row, value) in rows.into_iter().enumerate() {
        let Value::Object(fields) = &value else {
            return Err(malformed(format!("row {row} is {}, not an object", kind(&value))));
        };
        if let Some(column) = required.iter().find(|c| !fields.contains_key(**c)) {
            return Err(RowStoreError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
                row,
            });
        }

        let record: ArticleRecord =
            serde_json::from_value(value).map_err(|e| malformed(format!("row {row}: {e}")))?;
        if record.body.trim().is_empty() {
            warn!(row, id = %record.id, "Dropping row with empty body");
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Write `records` to `path` as pretty JSON, replacing the file.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_rows(path: &Path, records: &[ArticleRecord]) -> Result<(), RowStoreError> {
    let io = |e: std::io::Error| RowStoreError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io)?;
    }
    let json = serde_json::to_string_pretty(records).map_err(|e| RowStoreError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, json).await.map_err(io)?;
    info!("Wrote rows");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Label;
    use tempfile::tempdir;

    const ROWS: &str = r#"[
        {"제목": "[단독] 삼성생명", "언론사": "조선일보", "본문": "본문 하나", "카테고리": "당사", "키워드": "삼성생명", "URL": "https://n.news.naver.com/1"},
        {"제목": "빈 기사", "언론사": "KBS", "본문": null, "카테고리": "당사", "키워드": "삼성생명", "URL": "https://n.news.naver.com/2"}
    ]"#;

    #[test]
    fn test_parse_rows_drops_empty_bodies() {
        let records = parse_rows(Path::new("rows.json"), ROWS, REQUIRED_COLUMNS).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outlet, "조선일보");
        assert_eq!(records[0].keyword, "삼성생명");
    }

    #[test]
    fn test_missing_column_is_descriptive() {
        let raw = r#"[{"제목": "t", "본문": "b", "URL": "u"}]"#;
        let err = parse_rows(Path::new("rows.json"), raw, REQUIRED_COLUMNS).unwrap_err();
        match &err {
            RowStoreError::MissingColumn { column, row, .. } => {
                assert_eq!(column, OUTLET);
                assert_eq!(*row, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("언론사"));
    }

    #[test]
    fn test_non_array_is_malformed() {
        let err = parse_rows(Path::new("rows.json"), r#"{"rows": []}"#, REQUIRED_COLUMNS).unwrap_err();
        assert!(matches!(err, RowStoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = load_rows(&dir.path().join("nope.json"), REQUIRED_COLUMNS).await.unwrap_err();
        assert!(matches!(err, RowStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_written_rows_use_column_names_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("회사_20250506_cluster.json");

        let mut record = ArticleRecord::new("https://n.news.naver.com/1", "제목", "중앙일보");
        record.body = "본문".to_string();
        record.category = "보험".to_string();
        record.keyword = "실손".to_string();
        record.label = Some(Label::Negative);
        record.cluster = Some(2);
        write_rows(&path, &[record.clone()]).await.unwrap();

        let raw: Value = serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        let row = raw[0].as_object().unwrap();
        for column in REQUIRED_COLUMNS {
            assert!(row.contains_key(*column), "missing {column}");
        }
        assert_eq!(row["라벨"], "Negative");
        assert_eq!(row["클러스터"], 2);

        let reloaded = load_rows(&path, REQUIRED_COLUMNS).await.unwrap();
        assert_eq!(reloaded, vec![record]);
    }
}
