//! Partitioned sink writer with staged-run commits.
//!
//! Every write is a full overwrite of one table. Files for a run are staged
//! under `<root>/<table>/runs/<run_id>/`, then the run is committed by
//! overwriting the table's single `_manifest.json` object. Object stores
//! replace single objects atomically, so readers resolve the manifest and
//! either see the previous complete run or the new complete run, never a
//! mixture. Files from the superseded run are deleted after commit on a
//! best-effort basis; orphans are unreachable and harmless.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use cadenza_core::{StorageBackend, WritePrecondition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::model::{PartitionedRow, TableDef};

const MANIFEST_NAME: &str = "_manifest.json";
const PART_FILE: &str = "part-00000.parquet";

/// One data file recorded in a table manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Storage path of the parquet payload.
    pub path: String,
    /// Hive-style partition path; empty for unpartitioned tables.
    pub partition: String,
    /// Row count in this file.
    pub rows: u64,
}

/// The committed state of one table: the authoritative file list readers
/// resolve. Swapping this single object is the commit point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    /// Logical table name.
    pub table: String,
    /// Identifier of the run that produced these files.
    pub run_id: String,
    /// Commit timestamp.
    pub committed_at: DateTime<Utc>,
    /// Data files in deterministic partition order.
    pub files: Vec<ManifestFile>,
}

/// Writes star-schema tables to an object store, one staged run at a time.
pub struct TableWriter {
    storage: Arc<dyn StorageBackend>,
    root: String,
}

impl TableWriter {
    /// Creates a writer rooted at `root` within the given store.
    pub fn new(storage: Arc<dyn StorageBackend>, root: impl Into<String>) -> Self {
        Self {
            storage,
            root: root.into(),
        }
    }

    fn manifest_path(&self, table: &TableDef) -> String {
        format!("{}/{}/{MANIFEST_NAME}", self.root, table.name)
    }

    fn file_path(&self, table: &TableDef, run_id: &str, partition: &str) -> String {
        if partition.is_empty() {
            format!("{}/{}/runs/{run_id}/{PART_FILE}", self.root, table.name)
        } else {
            format!(
                "{}/{}/runs/{run_id}/{partition}/{PART_FILE}",
                self.root, table.name
            )
        }
    }

    /// Fully overwrites one table with the given rows.
    ///
    /// Rows are grouped by partition key, encoded to one parquet file per
    /// partition, staged under a fresh run directory, and committed by a
    /// single manifest swap. An empty `rows` slice commits an empty table.
    ///
    /// # Errors
    ///
    /// Returns a storage error if staging or the manifest swap fails, or an
    /// encoding error from the supplied encoder.
    pub async fn overwrite<R, F>(
        &self,
        table: &TableDef,
        rows: &[R],
        encode: F,
    ) -> Result<TableManifest>
    where
        R: PartitionedRow + Clone,
        F: Fn(&[R]) -> Result<Bytes>,
    {
        let run_id = Uuid::new_v4().to_string();
        let previous = self.read_manifest_opt(table).await?;

        // BTreeMap keyed on the partition path keeps file order deterministic.
        let mut partitions: BTreeMap<String, Vec<R>> = BTreeMap::new();
        for row in rows {
            partitions
                .entry(row.partition_key().path())
                .or_default()
                .push(row.clone());
        }

        let mut files = Vec::with_capacity(partitions.len());
        for (partition, partition_rows) in &partitions {
            let payload = encode(partition_rows)?;
            let path = self.file_path(table, &run_id, partition);
            self.storage
                .put(&path, payload, WritePrecondition::None)
                .await?;
            files.push(ManifestFile {
                path,
                partition: partition.clone(),
                rows: partition_rows.len() as u64,
            });
        }

        let manifest = TableManifest {
            table: table.name.to_string(),
            run_id: run_id.clone(),
            committed_at: Utc::now(),
            files,
        };
        let encoded = serde_json::to_vec_pretty(&manifest).map_err(|e| {
            PipelineError::Encoding {
                message: format!("manifest encode failed: {e}"),
            }
        })?;
        self.storage
            .put(
                &self.manifest_path(table),
                Bytes::from(encoded),
                WritePrecondition::None,
            )
            .await?;

        info!(
            table = table.name,
            run_id = %run_id,
            files = manifest.files.len(),
            rows = rows.len(),
            "committed table overwrite"
        );

        if let Some(previous) = previous {
            self.clean_superseded(&previous).await;
        }

        Ok(manifest)
    }

    async fn read_manifest_opt(&self, table: &TableDef) -> Result<Option<TableManifest>> {
        match self.storage.get(&self.manifest_path(table)).await {
            Ok(bytes) => {
                let manifest = serde_json::from_slice(&bytes).map_err(|e| {
                    PipelineError::Encoding {
                        message: format!("manifest decode failed for {}: {e}", table.name),
                    }
                })?;
                Ok(Some(manifest))
            }
            Err(cadenza_core::Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes the previous run's files. Failures are logged, not raised:
    /// orphaned files are unreachable once the manifest points elsewhere.
    async fn clean_superseded(&self, previous: &TableManifest) {
        for file in &previous.files {
            if let Err(e) = self.storage.delete(&file.path).await {
                warn!(
                    path = %file.path,
                    error = %e,
                    "failed to delete superseded file"
                );
            }
        }
    }
}

/// Reads committed table payloads by resolving the table manifest.
pub struct TableReader {
    storage: Arc<dyn StorageBackend>,
    root: String,
}

impl TableReader {
    /// Creates a reader rooted at `root` within the given store.
    pub fn new(storage: Arc<dyn StorageBackend>, root: impl Into<String>) -> Self {
        Self {
            storage,
            root: root.into(),
        }
    }

    /// Reads the committed manifest for one table.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table has never been committed.
    pub async fn manifest(&self, table: &TableDef) -> Result<TableManifest> {
        let path = format!("{}/{}/{MANIFEST_NAME}", self.root, table.name);
        let bytes = match self.storage.get(&path).await {
            Ok(bytes) => bytes,
            Err(cadenza_core::Error::NotFound(_)) => {
                return Err(PipelineError::Storage {
                    message: format!("table not committed: {}", table.name),
                });
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| PipelineError::Encoding {
            message: format!("manifest decode failed for {}: {e}", table.name),
        })
    }

    /// Reads all committed parquet payloads for one table, in manifest
    /// order. An empty table yields an empty vec.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table has never been committed or a
    /// manifest file is missing.
    pub async fn read_table(&self, table: &TableDef) -> Result<Vec<Bytes>> {
        let manifest = self.manifest(table).await?;
        let mut payloads = Vec::with_capacity(manifest.files.len());
        for file in &manifest.files {
            payloads.push(self.storage.get(&file.path).await?);
        }
        Ok(payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode;
    use crate::model::{CreatorRow, ItemRow, CREATORS, ITEMS};
    use cadenza_core::MemoryBackend;

    fn creator(id: &str) -> CreatorRow {
        CreatorRow {
            creator_id: id.to_string(),
            name: format!("Name of {id}"),
            location: None,
            latitude: None,
            longitude: None,
        }
    }

    fn item(key: i64, creator_id: &str, year: i32) -> ItemRow {
        ItemRow {
            item_key: key,
            title: format!("Song {key}"),
            creator_id: creator_id.to_string(),
            year,
            duration: 200.5,
        }
    }

    #[tokio::test]
    async fn unpartitioned_table_writes_one_file() {
        let storage = Arc::new(MemoryBackend::new());
        let writer = TableWriter::new(storage.clone(), "warehouse");

        let manifest = writer
            .overwrite(&CREATORS, &[creator("C1"), creator("C2")], |rows| {
                encode::write_creators(rows)
            })
            .await
            .expect("overwrite");

        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].partition, "");
        assert_eq!(manifest.files[0].rows, 2);

        let reader = TableReader::new(storage, "warehouse");
        let payloads = reader.read_table(&CREATORS).await.expect("read");
        assert_eq!(payloads.len(), 1);
        let rows = encode::read_creators(&payloads[0]).expect("decode");
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn partitioned_table_writes_one_file_per_partition() {
        let storage = Arc::new(MemoryBackend::new());
        let writer = TableWriter::new(storage, "warehouse");

        let rows = vec![item(1, "C1", 2005), item(2, "C1", 2006), item(3, "C2", 2005)];
        let manifest = writer
            .overwrite(&ITEMS, &rows, |rows| encode::write_items(rows))
            .await
            .expect("overwrite");

        assert_eq!(manifest.files.len(), 3);
        let partitions: Vec<&str> =
            manifest.files.iter().map(|f| f.partition.as_str()).collect();
        assert!(partitions.contains(&"year=2005/creator_id=C1"));
        assert!(partitions.contains(&"year=2006/creator_id=C1"));
        assert!(partitions.contains(&"year=2005/creator_id=C2"));
        assert!(manifest
            .files
            .iter()
            .all(|f| f.path.contains(&format!("runs/{}/", manifest.run_id))));
    }

    #[tokio::test]
    async fn rerun_replaces_previous_files() {
        let storage = Arc::new(MemoryBackend::new());
        let writer = TableWriter::new(storage.clone(), "warehouse");

        let first = writer
            .overwrite(&CREATORS, &[creator("C1")], |rows| {
                encode::write_creators(rows)
            })
            .await
            .expect("first");
        let second = writer
            .overwrite(&CREATORS, &[creator("C1"), creator("C2")], |rows| {
                encode::write_creators(rows)
            })
            .await
            .expect("second");
        assert_ne!(first.run_id, second.run_id);

        // Old run's files are gone; only the new run remains listed.
        let listed = storage.list("warehouse/creators/runs/").await.expect("list");
        assert!(listed.iter().all(|m| m.path.contains(&second.run_id)));

        let reader = TableReader::new(storage, "warehouse");
        let payloads = reader.read_table(&CREATORS).await.expect("read");
        let rows = encode::read_creators(&payloads[0]).expect("decode");
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn empty_table_commits_and_reads_back_empty() {
        let storage = Arc::new(MemoryBackend::new());
        let writer = TableWriter::new(storage.clone(), "warehouse");

        let manifest = writer
            .overwrite(&CREATORS, &[], |rows: &[CreatorRow]| {
                encode::write_creators(rows)
            })
            .await
            .expect("overwrite");
        assert!(manifest.files.is_empty());

        let reader = TableReader::new(storage, "warehouse");
        let payloads = reader.read_table(&CREATORS).await.expect("read");
        assert!(payloads.is_empty());
    }

    #[tokio::test]
    async fn reading_uncommitted_table_is_storage_error() {
        let storage = Arc::new(MemoryBackend::new());
        let reader = TableReader::new(storage, "warehouse");
        let err = reader.read_table(&CREATORS).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage { .. }));
    }
}
