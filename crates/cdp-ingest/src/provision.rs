//! Destination provisioning
//!
//! `ensure` makes sure the dataset and a table exist before rows are loaded.
//! Concurrent ingestions may race to create the same table; creation runs in a
//! short critical section and "already exists" from the store counts as done.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::catalog::SchemaCatalog;
use crate::error::{IngestError, Result};
use crate::store::{AnalyticalStore, StoreError};

pub struct SchemaProvisioner {
    store: Arc<dyn AnalyticalStore>,
    catalog: Arc<SchemaCatalog>,
    ensured: Mutex<HashSet<String>>,
}

impl SchemaProvisioner {
    pub fn new(store: Arc<dyn AnalyticalStore>, catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            store,
            catalog,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    /// Ensure the dataset and `table` exist. Unknown tables are a configuration error.
    #[instrument(skip(self), fields(dataset = %self.catalog.dataset))]
    pub async fn ensure(&self, table: &str) -> Result<()> {
        let schema = self
            .catalog
            .get(table)
            .ok_or_else(|| IngestError::UnknownTable(table.to_string()))?;

        let mut ensured = self.ensured.lock().await;
        if ensured.contains(table) {
            return Ok(());
        }

        let dataset = self.catalog.dataset.as_str();

        if !self.store.dataset_exists(dataset).await? {
            match self.store.create_dataset(dataset).await {
                Ok(()) => info!("Created dataset"),
                Err(StoreError::AlreadyExists(_)) => debug!("Dataset created concurrently"),
                Err(e) => return Err(e.into()),
            }
        }

        if !self.store.table_exists(dataset, table).await? {
            match self.store.create_table(dataset, table, schema).await {
                Ok(()) => info!(columns = schema.fields.len(), "Created table"),
                Err(StoreError::AlreadyExists(_)) => debug!("Table created concurrently"),
                Err(e) => return Err(e.into()),
            }
        }

        ensured.insert(table.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::tables;
    use crate::memory::MemoryAnalyticalStore;

    fn provisioner(store: Arc<MemoryAnalyticalStore>) -> SchemaProvisioner {
        SchemaProvisioner::new(store, Arc::new(SchemaCatalog::default()))
    }

    #[tokio::test]
    async fn test_ensure_creates_dataset_and_table_once() {
        let store = Arc::new(MemoryAnalyticalStore::new());
        let provisioner = provisioner(store.clone());

        provisioner.ensure(tables::GRUPOS_DETALHADOS).await.unwrap();
        provisioner.ensure(tables::GRUPOS_DETALHADOS).await.unwrap();

        assert!(store.dataset_exists("consorcios").await.unwrap());
        assert!(store.table_exists("consorcios", "grupos_detalhados").await.unwrap());
        assert_eq!(store.create_table_calls().await, 1);
    }

    #[tokio::test]
    async fn test_ensure_unknown_table_is_configuration_error() {
        let provisioner = provisioner(Arc::new(MemoryAnalyticalStore::new()));
        let err = provisioner.ensure("propostas").await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_ensure_tolerates_table_created_elsewhere() {
        let store = Arc::new(MemoryAnalyticalStore::new());
        let catalog = SchemaCatalog::default();
        store.create_dataset("consorcios").await.unwrap();
        store
            .create_table("consorcios", "segmentos", catalog.get("segmentos").unwrap())
            .await
            .unwrap();

        let provisioner = provisioner(store.clone());
        provisioner.ensure(tables::SEGMENTOS).await.unwrap();
        assert_eq!(store.create_table_calls().await, 1);
    }

    #[tokio::test]
    async fn test_ensure_treats_lost_race_as_success() {
        let store = Arc::new(MemoryAnalyticalStore::new().racing_creates());
        let provisioner = provisioner(store.clone());
        provisioner.ensure(tables::ADMINISTRADORAS).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_ensure_creates_table_once() {
        let store = Arc::new(MemoryAnalyticalStore::new());
        let provisioner = Arc::new(provisioner(store.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = provisioner.clone();
                tokio::spawn(async move { p.ensure(tables::DADOS_TRIMESTRAIS_UF).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.create_table_calls().await, 1);
    }
}
