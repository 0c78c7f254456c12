//! Dataset retrieval
//!
//! The monitor and the training job only see [`DataSource`]; the bundled
//! implementation reads `<root>/<query>.csv` exported from the claims
//! database.

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{RawRecord, REQUIRED_COLUMNS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of claim snapshots
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<RawRecord>>;
}

/// Reads snapshots from CSV files named after the query
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    root: PathBuf,
}

impl CsvDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, query: &str) -> PathBuf {
        self.root.join(format!("{}.csv", query))
    }
}

#[async_trait]
impl DataSource for CsvDataSource {
    async fn retrieve(&self, query: &str) -> Result<Vec<RawRecord>> {
        if query.is_empty() || query.contains(['/', '\\']) || query.contains("..") {
            return Err(LifecycleError::validation(format!("invalid dataset query '{}'", query)).into());
        }
        let path = self.path_for(query);
        let records = tokio::task::spawn_blocking({
            let path = path.clone();
            move || read_records_csv(&path)
        })
        .await
        .context("Dataset read task panicked")?
        .with_context(|| format!("Failed to retrieve dataset {:?}", path))?;

        debug!(query = %query, rows = records.len(), "Dataset retrieved");
        Ok(records)
    }
}

/// Parse a claims CSV, rejecting files without the required columns
pub fn read_records_csv(path: &Path) -> LifecycleResult<Vec<RawRecord>> {
    let file = std::fs::File::open(path).map_err(|e| LifecycleError::io(path, e))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == *column) {
            return Err(LifecycleError::MissingColumn(column.to_string()));
        }
    }

    reader
        .deserialize()
        .map(|row| row.map_err(LifecycleError::from))
        .collect()
}

/// Encode records in the same layout [`read_records_csv`] accepts
pub fn encode_records_csv(records: &[RawRecord]) -> LifecycleResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record(crate::models::RAW_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| LifecycleError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CLAIMS: &str = "\
pet_breed_id,birth,gender,neuter_yn,weight_kg,claim_price,created_at,disease_name
1144,2020-01-01,M,y,4.5,120000,2021-03-01 10:00:00,otitis
1121,2019-05-05,,n,,,2021-03-02 11:30:00,
";

    #[tokio::test]
    async fn test_csv_source_reads_rows() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("claims.csv"), CLAIMS).unwrap();

        let source = CsvDataSource::new(dir.path());
        let rows = source.retrieve("claims").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].claim_price, Some(120_000.0));
        assert_eq!(rows[1].gender, None);
        assert_eq!(rows[1].weight_kg, None);
    }

    #[tokio::test]
    async fn test_csv_source_rejects_path_queries() {
        let dir = TempDir::new().unwrap();
        let source = CsvDataSource::new(dir.path());
        assert!(source.retrieve("../etc/passwd").await.is_err());
        assert!(source.retrieve("missing").await.is_err());
    }

    #[test]
    fn test_missing_required_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "pet_breed_id,gender\n1,M\n").unwrap();
        assert!(matches!(
            read_records_csv(&path),
            Err(LifecycleError::MissingColumn(c)) if c == "birth"
        ));
    }

    #[test]
    fn test_encoded_records_read_back() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("claims.csv");
        std::fs::write(&source, CLAIMS).unwrap();
        let rows = read_records_csv(&source).unwrap();

        let copy = dir.path().join("copy.csv");
        std::fs::write(&copy, encode_records_csv(&rows).unwrap()).unwrap();
        assert_eq!(read_records_csv(&copy).unwrap(), rows);

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, encode_records_csv(&[]).unwrap()).unwrap();
        assert!(read_records_csv(&empty).unwrap().is_empty());
    }
}
