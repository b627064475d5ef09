//! Batched inserts into the destination store

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::catalog::INGESTED_AT_COLUMN;
use crate::error::{IngestError, Result};
use crate::records::CanonicalRecord;
use crate::store::{AnalyticalStore, Row};

/// Rows per insert request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub struct BatchLoader {
    store: Arc<dyn AnalyticalStore>,
    dataset: String,
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn AnalyticalStore>, dataset: impl Into<String>) -> Self {
        Self {
            store,
            dataset: dataset.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert `records` into `table` in sequential batches.
    ///
    /// Every row gets the same `data_ingestao` stamp. The first failing batch
    /// stops the load; batches already written stay written.
    #[instrument(skip(self, records), fields(dataset = %self.dataset, records = records.len()))]
    pub async fn load(&self, table: &str, records: &[CanonicalRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let stamp = Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        let rows = records
            .iter()
            .map(|record| {
                let mut row = record.to_row().map_err(|source| IngestError::Serialization {
                    table: table.to_string(),
                    source,
                })?;
                row.insert(INGESTED_AT_COLUMN.to_string(), stamp.clone());
                Ok(row)
            })
            .collect::<Result<Vec<Row>>>()?;

        let mut loaded = 0;
        for (index, batch) in rows.chunks(self.batch_size).enumerate() {
            let start = index * self.batch_size;
            let end = start + batch.len();
            self.store
                .insert_rows(&self.dataset, table, batch)
                .await
                .map_err(|source| IngestError::Batch {
                    table: table.to_string(),
                    start,
                    end,
                    source,
                })?;
            loaded = end;
            debug!(start, end, "Batch inserted");
        }

        info!(rows = loaded, "Load complete");
        Ok(loaded)
    }
}
