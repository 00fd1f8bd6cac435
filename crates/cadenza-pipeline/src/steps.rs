//! Pipeline steps: dimension load, fact load, and the quality gate.
//!
//! Each step is an independently re-runnable unit over one storage backend.
//! Steps communicate only through the sink: the fact builder reads the item
//! and creator dimensions back from their committed tables, never from
//! in-memory leftovers of a previous step, so `facts` can run in a separate
//! process from `dimensions`.

use std::sync::Arc;

use cadenza_core::{step_span, StorageBackend};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::dimensions::{build_actors, build_creators, build_items, build_time_buckets};
use crate::encode;
use crate::error::{PipelineError, Result};
use crate::facts::build_interaction_events;
use crate::model::{ACTORS, CREATORS, INTERACTION_EVENTS, ITEMS, TIME_BUCKETS};
use crate::quality::{QualityCheck, QualityGate};
use crate::raw::{parse_catalog_record, parse_event_batch, RawCatalogRecord, RawEventRecord};
use crate::writer::{TableReader, TableWriter};

/// Row counts written by a dimension load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionCounts {
    /// Rows written to the items dimension.
    pub items: usize,
    /// Rows written to the creators dimension.
    pub creators: usize,
    /// Rows written to the actors dimension.
    pub actors: usize,
    /// Rows written to the time dimension.
    pub time_buckets: usize,
}

/// The pipeline facade: raw prefixes in, committed star schema out.
pub struct Pipeline {
    storage: Arc<dyn StorageBackend>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline over the given backend and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the configuration is invalid.
    pub fn new(storage: Arc<dyn StorageBackend>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { storage, config })
    }

    fn writer(&self) -> TableWriter {
        TableWriter::new(self.storage.clone(), self.config.output_root.clone())
    }

    fn reader(&self) -> TableReader {
        TableReader::new(self.storage.clone(), self.config.output_root.clone())
    }

    /// Builds and commits all four dimension tables from the raw prefixes.
    ///
    /// # Errors
    ///
    /// Returns a schema error on malformed raw payloads, or a storage or
    /// encoding error from the sink.
    pub async fn build_dimensions(&self) -> Result<DimensionCounts> {
        let run_id = Uuid::new_v4().to_string();
        let span = step_span("build_dimensions", &run_id);
        async {
            let catalog = self.load_catalog().await?;
            let events = self.load_events().await?;

            let items = build_items(&catalog);
            let creators = build_creators(&catalog);
            let actors = build_actors(&events)?;
            let time_buckets = build_time_buckets(&events)?;

            let writer = self.writer();
            writer.overwrite(&ITEMS, &items, |r| encode::write_items(r)).await?;
            writer
                .overwrite(&CREATORS, &creators, |r| encode::write_creators(r))
                .await?;
            writer
                .overwrite(&ACTORS, &actors, |r| encode::write_actors(r))
                .await?;
            writer
                .overwrite(&TIME_BUCKETS, &time_buckets, |r| encode::write_time_buckets(r))
                .await?;

            let counts = DimensionCounts {
                items: items.len(),
                creators: creators.len(),
                actors: actors.len(),
                time_buckets: time_buckets.len(),
            };
            info!(
                items = counts.items,
                creators = counts.creators,
                actors = counts.actors,
                time_buckets = counts.time_buckets,
                "dimension load complete"
            );
            Ok(counts)
        }
        .instrument(span)
        .await
    }

    /// Builds and commits the interaction fact table. Reads the item and
    /// creator dimensions back from the sink, so `build_dimensions` must
    /// have committed first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the dimension tables are not committed, a
    /// schema error on malformed raw payloads, or an encoding error.
    pub async fn build_facts(&self) -> Result<usize> {
        let run_id = Uuid::new_v4().to_string();
        let span = step_span("build_facts", &run_id);
        async {
            let events = self.load_events().await?;

            let reader = self.reader();
            let mut items = Vec::new();
            for payload in reader.read_table(&ITEMS).await? {
                items.extend(encode::read_items(&payload)?);
            }
            let mut creators = Vec::new();
            for payload in reader.read_table(&CREATORS).await? {
                creators.extend(encode::read_creators(&payload)?);
            }

            let facts = build_interaction_events(&events, &items, &creators)?;
            self.writer()
                .overwrite(&INTERACTION_EVENTS, &facts, |r| {
                    encode::write_interaction_events(r)
                })
                .await?;

            info!(facts = facts.len(), "fact load complete");
            Ok(facts.len())
        }
        .instrument(span)
        .await
    }

    /// Runs the quality gate over the committed tables.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ExpectationMismatch`] on the first failed
    /// check, or a query/storage error if a check cannot be evaluated.
    pub async fn run_quality_gate(&self, checks: Vec<QualityCheck>) -> Result<()> {
        let run_id = Uuid::new_v4().to_string();
        let span = step_span("quality_gate", &run_id);
        async {
            QualityGate::new(checks).run(&self.reader()).await?;
            info!("quality gate passed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Like [`Self::run_quality_gate`] but folds the determinate failure
    /// mode into the success type: `Ok(false)` means a check failed, `Err`
    /// means the gate itself could not run.
    ///
    /// # Errors
    ///
    /// Returns a query/storage error if a check cannot be evaluated.
    pub async fn quality_gate_passes(&self, checks: Vec<QualityCheck>) -> Result<bool> {
        match self.run_quality_gate(checks).await {
            Ok(()) => Ok(true),
            Err(PipelineError::ExpectationMismatch { query, expected, observed }) => {
                tracing::warn!(
                    query = %query,
                    expected = %expected,
                    observed = %observed,
                    "quality check failed"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads and parses every catalog record under the configured prefix,
    /// in path order.
    async fn load_catalog(&self) -> Result<Vec<RawCatalogRecord>> {
        let mut listed = self.storage.list(&self.config.catalog_prefix).await?;
        listed.sort_by(|a, b| a.path.cmp(&b.path));

        let mut records = Vec::with_capacity(listed.len());
        for meta in &listed {
            let payload = self.storage.get(&meta.path).await?;
            records.push(parse_catalog_record(&payload).map_err(|e| context(&meta.path, &e))?);
        }
        info!(files = listed.len(), "loaded catalog records");
        Ok(records)
    }

    /// Reads and parses every event log batch under the configured prefix,
    /// in path order.
    async fn load_events(&self) -> Result<Vec<RawEventRecord>> {
        let mut listed = self.storage.list(&self.config.events_prefix).await?;
        listed.sort_by(|a, b| a.path.cmp(&b.path));

        let mut records = Vec::new();
        for meta in &listed {
            let payload = self.storage.get(&meta.path).await?;
            records.extend(parse_event_batch(&payload).map_err(|e| context(&meta.path, &e))?);
        }
        info!(files = listed.len(), events = records.len(), "loaded event batches");
        Ok(records)
    }
}

fn context(path: &str, err: &PipelineError) -> PipelineError {
    PipelineError::Schema {
        message: format!("{path}: {err}"),
    }
}
