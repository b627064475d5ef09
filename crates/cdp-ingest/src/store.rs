//! Storage seams
//!
//! The pipeline talks to its destination warehouse and to object storage only
//! through these traits. Postgres and S3 back them in production; the
//! in-memory versions in [`crate::memory`] back tests and dry runs.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::catalog::TableSchema;

/// One destination row, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Returned by create operations that lost a race; callers treat it as success.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Backend(String),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn backend(message: impl std::fmt::Display) -> Self {
        Self::Backend(message.to_string())
    }
}

/// Destination warehouse: datasets holding tables of rows.
#[async_trait]
pub trait AnalyticalStore: Send + Sync {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool, StoreError>;

    /// Create a dataset. Fails with [`StoreError::AlreadyExists`] if it exists.
    async fn create_dataset(&self, dataset: &str) -> Result<(), StoreError>;

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool, StoreError>;

    /// Create a table. Fails with [`StoreError::AlreadyExists`] if it exists.
    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        schema: &TableSchema,
    ) -> Result<(), StoreError>;

    async fn insert_rows(&self, dataset: &str, table: &str, rows: &[Row])
        -> Result<(), StoreError>;

    /// Delete every row whose `arquivo_origem` equals `file_name`, returning the count.
    /// A missing table yields [`StoreError::NotFound`].
    async fn delete_file_rows(
        &self,
        dataset: &str,
        table: &str,
        file_name: &str,
    ) -> Result<u64, StoreError>;
}

/// Object storage holding the uploaded files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object bytes. A missing object yields [`StoreError::NotFound`].
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Write the object, replacing any previous content at `path`.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}
