//! In-memory store implementations
//!
//! Used by the `preview` command and by tests. They follow the same contracts
//! as the Postgres and S3 back-ends, including `AlreadyExists` on duplicate
//! creates and `NotFound` for missing tables and objects.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use crate::catalog::{TableSchema, SOURCE_FILE_COLUMN};
use crate::control::{ControlFilter, ControlPatch, ControlRecord, ControlStore};
use crate::store::{AnalyticalStore, ObjectStore, Row, StoreError};

#[derive(Default)]
struct Warehouse {
    datasets: HashSet<String>,
    tables: BTreeMap<(String, String), Vec<Row>>,
    create_table_calls: usize,
    insert_calls: usize,
    fail_inserts_after: Option<usize>,
    fail_deletes_on: HashSet<String>,
}

/// Analytical store keeping rows in memory.
#[derive(Default)]
pub struct MemoryAnalyticalStore {
    inner: Mutex<Warehouse>,
    racing_creates: bool,
}

impl MemoryAnalyticalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every create report `AlreadyExists` after performing it, as if a
    /// concurrent writer got there first.
    pub fn racing_creates(mut self) -> Self {
        self.racing_creates = true;
        self
    }

    /// Fail every insert after the first `successful` ones.
    pub async fn fail_inserts_after(&self, successful: usize) {
        self.inner.lock().await.fail_inserts_after = Some(successful);
    }

    /// Fail every row deletion on `table`.
    pub async fn fail_deletes_on(&self, table: &str) {
        self.inner.lock().await.fail_deletes_on.insert(table.to_string());
    }

    pub async fn rows(&self, dataset: &str, table: &str) -> Vec<Row> {
        self.inner
            .lock()
            .await
            .tables
            .get(&(dataset.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Row counts per existing table of `dataset`.
    pub async fn counts(&self, dataset: &str) -> BTreeMap<String, usize> {
        self.inner
            .lock()
            .await
            .tables
            .iter()
            .filter(|((ds, _), _)| ds == dataset)
            .map(|((_, table), rows)| (table.clone(), rows.len()))
            .collect()
    }

    pub async fn create_table_calls(&self) -> usize {
        self.inner.lock().await.create_table_calls
    }

    pub async fn insert_calls(&self) -> usize {
        self.inner.lock().await.insert_calls
    }
}

#[async_trait]
impl AnalyticalStore for MemoryAnalyticalStore {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.datasets.contains(dataset))
    }

    async fn create_dataset(&self, dataset: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.datasets.insert(dataset.to_string()) || self.racing_creates {
            return Err(StoreError::AlreadyExists(dataset.to_string()));
        }
        Ok(())
    }

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool, StoreError> {
        let key = (dataset.to_string(), table.to_string());
        Ok(self.inner.lock().await.tables.contains_key(&key))
    }

    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        _schema: &TableSchema,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.datasets.contains(dataset) {
            return Err(StoreError::NotFound(format!("dataset {dataset}")));
        }
        let key = (dataset.to_string(), table.to_string());
        if inner.tables.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{dataset}.{table}")));
        }
        inner.tables.insert(key, Vec::new());
        inner.create_table_calls += 1;
        if self.racing_creates {
            return Err(StoreError::AlreadyExists(format!("{dataset}.{table}")));
        }
        Ok(())
    }

    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: &[Row],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(limit) = inner.fail_inserts_after {
            if inner.insert_calls >= limit {
                return Err(StoreError::backend("insert rejected"));
            }
        }
        inner.insert_calls += 1;
        let target = inner
            .tables
            .get_mut(&(dataset.to_string(), table.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("{dataset}.{table}")))?;
        target.extend_from_slice(rows);
        Ok(())
    }

    async fn delete_file_rows(
        &self,
        dataset: &str,
        table: &str,
        file_name: &str,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_deletes_on.contains(table) {
            return Err(StoreError::backend("delete rejected"));
        }
        let target = inner
            .tables
            .get_mut(&(dataset.to_string(), table.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("{dataset}.{table}")))?;
        let before = target.len();
        target.retain(|row| row.get(SOURCE_FILE_COLUMN) != Some(&Value::String(file_name.into())));
        Ok((before - target.len()) as u64)
    }
}

/// Control store keeping records in memory.
#[derive(Default)]
pub struct MemoryControlStore {
    records: Mutex<HashMap<String, ControlRecord>>,
}

impl MemoryControlStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl ControlStore for MemoryControlStore {
    async fn get(&self, file_id: &str) -> Result<Option<ControlRecord>, StoreError> {
        Ok(self.records.lock().await.get(file_id).cloned())
    }

    async fn upsert(&self, file_id: &str, patch: ControlPatch) -> Result<ControlRecord, StoreError> {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        let record = records
            .entry(file_id.to_string())
            .or_insert_with(|| ControlRecord::new(file_id, now));
        record.apply(&patch, now);
        Ok(record.clone())
    }

    async fn remove(&self, file_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().await.remove(file_id).is_some())
    }

    async fn list(&self, filter: &ControlFilter) -> Result<Vec<ControlRecord>, StoreError> {
        let records = self.records.lock().await;
        let mut matching: Vec<ControlRecord> =
            records.values().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        matching.truncate(filter.effective_limit());
        Ok(matching)
    }
}

/// Object store keeping blobs in memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.objects.lock().await.insert(path.to_string(), bytes.into());
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.lock().await.contains_key(path)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.put(path, bytes).await;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.objects.lock().await.remove(path);
        Ok(())
    }
}
