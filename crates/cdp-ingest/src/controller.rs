//! Ingestion controller
//!
//! Drives one file through classification, mapping, provisioning and loading,
//! and keeps its control record in step:
//!
//! ```text
//! PENDING/UPLOADED -> PROCESSING -> SUCCESS | WARNING | ERROR
//! ```
//!
//! Data problems end in `WARNING` or `ERROR` on the record and a report for the
//! caller. Only configuration problems (a table missing from the catalog) and
//! failures of the control store itself come back as `Err`.
//!
//! The administrative operations (delete, reprocess, reset-all) require a
//! privileged [`Caller`] and fail with an [`AdminError`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::catalog::SchemaCatalog;
use crate::classify::{classify, FileClassification};
use crate::competence::{competence_from_file_name, resolve_reference_date, UNKNOWN_COMPETENCE};
use crate::control::{ControlFilter, ControlPatch, ControlRecord, ControlStatus, ControlStore};
use crate::error::{AdminError, IngestError, Result};
use crate::loader::BatchLoader;
use crate::mapper::{map_rows, plan_for, MappedFile};
use crate::normalize::{base_name, file_name};
use crate::provision::SchemaProvisioner;
use crate::rows::read_table;
use crate::store::{AnalyticalStore, ObjectStore, StoreError};

/// Object paths outside this prefix are not ingested.
pub const DEFAULT_RAW_PREFIX: &str = "uploads/raw/";

/// Who is asking for an operation. Resolved by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Caller {
    pub privileged: bool,
}

impl Caller {
    pub fn privileged() -> Self {
        Self { privileged: true }
    }

    pub fn anonymous() -> Self {
        Self { privileged: false }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub file_id: String,
    pub file_name: String,
    pub status: ControlStatus,
    pub file_type: FileClassification,
    pub rows_processed: usize,
    pub rows_skipped: usize,
    pub reference_date: String,
    pub target_table: Option<String>,
    /// Records loaded per table, including reference tables fed as a side output.
    pub tables: BTreeMap<String, usize>,
    pub error: Option<String>,
}

/// Result of handling an object-storage notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ObjectOutcome {
    Ignored { storage_path: String },
    Processed(IngestReport),
}

/// Per-table result of a file-scoped row deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDeletion {
    pub table: String,
    pub deleted: u64,
    pub error: Option<String>,
}

impl TableDeletion {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub file_id: String,
    pub storage_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReprocessRequest {
    #[serde(default)]
    pub file_id: Option<String>,
    pub storage_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub file_id: String,
    pub tables: Vec<TableDeletion>,
    pub object_deleted: bool,
    pub record_removed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetSummary {
    pub files_reset: usize,
    pub rows_deleted: u64,
    pub table_failures: usize,
}

/// Mapping result plus the classification it was produced under.
struct Processed {
    file_type: FileClassification,
    mapped: MappedFile,
    loaded: BTreeMap<String, usize>,
}

pub struct IngestionController {
    control: Arc<dyn ControlStore>,
    analytical: Arc<dyn AnalyticalStore>,
    objects: Arc<dyn ObjectStore>,
    catalog: Arc<SchemaCatalog>,
    provisioner: SchemaProvisioner,
    loader: BatchLoader,
    raw_prefix: String,
}

impl IngestionController {
    pub fn new(
        control: Arc<dyn ControlStore>,
        analytical: Arc<dyn AnalyticalStore>,
        objects: Arc<dyn ObjectStore>,
        catalog: Arc<SchemaCatalog>,
    ) -> Self {
        let provisioner = SchemaProvisioner::new(analytical.clone(), catalog.clone());
        let loader = BatchLoader::new(analytical.clone(), catalog.dataset.clone());
        Self {
            control,
            analytical,
            objects,
            catalog,
            provisioner,
            loader,
            raw_prefix: DEFAULT_RAW_PREFIX.to_string(),
        }
    }

    pub fn with_raw_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.raw_prefix = prefix;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.loader = self.loader.with_batch_size(batch_size);
        self
    }

    pub fn raw_prefix(&self) -> &str {
        &self.raw_prefix
    }

    /// Storage path an upload named `file_name` is stored under.
    pub fn raw_path(&self, file_name: &str) -> String {
        format!("{}{}", self.raw_prefix, file_name)
    }

    pub fn is_raw_path(&self, storage_path: &str) -> bool {
        storage_path.starts_with(&self.raw_prefix)
    }

    pub async fn record(&self, file_id: &str) -> Result<Option<ControlRecord>> {
        Ok(self.control.get(file_id).await?)
    }

    pub async fn records(&self, filter: &ControlFilter) -> Result<Vec<ControlRecord>> {
        Ok(self.control.list(filter).await?)
    }

    /// Register a freshly uploaded file. The reference date comes from the
    /// file name when it embeds a month, so later content cannot override it.
    #[instrument(skip(self))]
    pub async fn register_upload(&self, file_name: &str, storage_path: &str) -> Result<ControlRecord> {
        let file_id = base_name(file_name);
        let reference_date = competence_from_file_name(file_name)
            .unwrap_or_else(|| UNKNOWN_COMPETENCE.to_string());

        let patch = ControlPatch {
            file_name: Some(file_name.to_string()),
            storage_path: Some(storage_path.to_string()),
            rows_processed: Some(0),
            reference_date: Some(reference_date),
            uploaded_at: Some(Utc::now()),
            ..ControlPatch::status(ControlStatus::Uploaded).clear_error()
        };
        let record = self.control.upsert(file_id, patch).await?;
        info!(file_id, reference_date = %record.reference_date, "Upload registered");
        Ok(record)
    }

    /// Store uploaded bytes under the raw prefix and register them.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn store_upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<ControlRecord> {
        let name = normalize_upload_name(file_name)?;
        let storage_path = self.raw_path(name);
        self.objects.upload(&storage_path, bytes).await?;
        self.register_upload(name, &storage_path).await
    }

    /// Handle an object-storage notification: download and ingest objects
    /// under the raw prefix, ignore everything else.
    #[instrument(skip(self))]
    pub async fn handle_object(&self, storage_path: &str) -> Result<ObjectOutcome> {
        if !self.is_raw_path(storage_path) {
            debug!(prefix = %self.raw_prefix, "Outside raw prefix, ignoring");
            return Ok(ObjectOutcome::Ignored {
                storage_path: storage_path.to_string(),
            });
        }

        let bytes = self.objects.download(storage_path).await?;
        let report = self.ingest(&bytes, file_name(storage_path), storage_path).await?;
        Ok(ObjectOutcome::Processed(report))
    }

    /// Run one file through the pipeline and finalize its control record.
    #[instrument(skip(self, bytes), fields(file_id = %base_name(file_name), size = bytes.len()))]
    pub async fn ingest(&self, bytes: &[u8], file_name: &str, storage_path: &str) -> Result<IngestReport> {
        let file_id = base_name(file_name).to_string();
        let previous = self.control.get(&file_id).await?;

        self.control
            .upsert(
                &file_id,
                ControlPatch {
                    file_name: Some(file_name.to_string()),
                    storage_path: Some(storage_path.to_string()),
                    ..ControlPatch::status(ControlStatus::Processing).clear_error()
                },
            )
            .await?;
        info!("Processing started");

        // Rows can outlive a failed attempt or a partial delete; purge before every load.
        let mut stale_names = vec![file_name.to_string()];
        if let Some(prev) = previous.as_ref() {
            if !prev.file_name.is_empty() && prev.file_name != file_name {
                stale_names.push(prev.file_name.clone());
            }
        }

        let trusted_date = previous.as_ref().map(|r| r.reference_date.as_str());
        let name_date = competence_from_file_name(file_name);

        match self.process(bytes, file_name, &stale_names).await {
            Ok(done) => {
                let content_date = done.mapped.competence.clone().or(name_date);
                let reference_date = resolve_reference_date(trusted_date, content_date.as_deref());
                self.finish(&file_id, file_name, done, reference_date).await
            }
            Err(err) => {
                let reference_date = resolve_reference_date(trusted_date, name_date.as_deref());
                let file_type = match &err {
                    IngestError::Unclassified(_) => Some(FileClassification::Unknown),
                    _ => None,
                };
                warn!(error = %err, "Processing failed");
                self.control
                    .upsert(
                        &file_id,
                        ControlPatch {
                            file_type,
                            rows_processed: Some(0),
                            reference_date: Some(reference_date.clone()),
                            ..ControlPatch::status(ControlStatus::Error).with_error(err.to_string())
                        },
                    )
                    .await?;

                if err.is_configuration() {
                    return Err(err);
                }
                Ok(IngestReport {
                    file_id,
                    file_name: file_name.to_string(),
                    status: ControlStatus::Error,
                    file_type: file_type.unwrap_or(FileClassification::Unknown),
                    rows_processed: 0,
                    rows_skipped: 0,
                    reference_date,
                    target_table: None,
                    tables: BTreeMap::new(),
                    error: Some(err.to_string()),
                })
            }
        }
    }

    async fn process(&self, bytes: &[u8], file_name: &str, stale_names: &[String]) -> Result<Processed> {
        for name in stale_names {
            if let Some(failed) = self.purge_file_rows(name).await.into_iter().find(|d| !d.is_ok()) {
                return Err(IngestError::Purge {
                    file: name.clone(),
                    table: failed.table,
                    reason: failed.error.unwrap_or_default(),
                });
            }
        }

        let table = read_table(bytes, file_name)?;

        let file_type = classify(file_name, Some(table.headers.as_slice()));
        let plan = plan_for(file_type).ok_or_else(|| IngestError::Unclassified(file_name.to_string()))?;
        info!(%file_type, rows = table.rows.len(), "Classified");

        let mapped = map_rows(&plan, &table.rows, file_name);
        let mut loaded = BTreeMap::new();
        for (target, records) in &mapped.tables {
            if records.is_empty() {
                continue;
            }
            self.provisioner.ensure(target).await?;
            let count = self.loader.load(target, records).await?;
            loaded.insert(target.to_string(), count);
        }

        Ok(Processed {
            file_type,
            mapped,
            loaded,
        })
    }

    async fn finish(
        &self,
        file_id: &str,
        file_name: &str,
        done: Processed,
        reference_date: String,
    ) -> Result<IngestReport> {
        let rows = done.mapped.primary_count();
        let (status, error) = if rows == 0 {
            (
                ControlStatus::Warning,
                Some(format!("no valid rows in {} rows read", done.mapped.rows_seen)),
            )
        } else {
            (ControlStatus::Success, None)
        };

        let mut patch = ControlPatch {
            file_type: Some(done.file_type),
            rows_processed: Some(rows as i64),
            reference_date: Some(reference_date.clone()),
            target_table: Some(done.mapped.primary_table.to_string()),
            ..ControlPatch::status(status)
        };
        patch = match &error {
            Some(details) => patch.with_error(details.clone()),
            None => patch.clear_error(),
        };
        self.control.upsert(file_id, patch).await?;

        info!(
            %status,
            rows,
            skipped = done.mapped.rows_skipped,
            reference_date = %reference_date,
            "Processing finished"
        );

        Ok(IngestReport {
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
            status,
            file_type: done.file_type,
            rows_processed: rows,
            rows_skipped: done.mapped.rows_skipped,
            reference_date,
            target_table: Some(done.mapped.primary_table.to_string()),
            tables: done.loaded,
            error,
        })
    }

    /// Delete the rows loaded from `file_name` from every catalog table.
    /// Each table is attempted; a missing table counts as nothing to delete.
    #[instrument(skip(self))]
    pub async fn purge_file_rows(&self, file_name: &str) -> Vec<TableDeletion> {
        let dataset = self.catalog.dataset.as_str();
        let mut results = Vec::new();
        for table in self.catalog.table_ids() {
            let result = match self.analytical.delete_file_rows(dataset, table, file_name).await {
                Ok(deleted) => TableDeletion {
                    table: table.to_string(),
                    deleted,
                    error: None,
                },
                Err(StoreError::NotFound(_)) => TableDeletion {
                    table: table.to_string(),
                    deleted: 0,
                    error: None,
                },
                Err(e) => {
                    warn!(table, error = %e, "Row deletion failed");
                    TableDeletion {
                        table: table.to_string(),
                        deleted: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }
        results
    }

    /// Remove a file everywhere: its rows, its bytes and its control record.
    #[instrument(skip(self, request), fields(file_id = %request.file_id))]
    pub async fn delete(
        &self,
        caller: Caller,
        request: &DeleteRequest,
    ) -> std::result::Result<DeleteOutcome, AdminError> {
        authorize(caller)?;
        let file_id = required("file_id", &request.file_id)?;
        let storage_path = required("storage_path", &request.storage_path)?;
        if base_name(storage_path) != file_id {
            return Err(AdminError::InvalidArgument(format!(
                "file_id '{file_id}' does not match storage_path"
            )));
        }

        let record = self
            .control
            .get(file_id)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("no control record for '{file_id}'")))?;

        let name = if record.file_name.is_empty() {
            file_name(storage_path)
        } else {
            record.file_name.as_str()
        };
        let tables = self.purge_file_rows(name).await;

        let object_deleted = match self.objects.delete(storage_path).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Object deletion failed");
                false
            }
        };
        let record_removed = self.control.remove(file_id).await?;

        info!(
            deleted = tables.iter().map(|t| t.deleted).sum::<u64>(),
            object_deleted,
            "File deleted"
        );
        Ok(DeleteOutcome {
            file_id: file_id.to_string(),
            tables,
            object_deleted,
            record_removed,
        })
    }

    /// Re-run ingestion for a stored file, updating its control record in place.
    #[instrument(skip(self, request), fields(storage_path = %request.storage_path))]
    pub async fn reprocess(
        &self,
        caller: Caller,
        request: &ReprocessRequest,
    ) -> std::result::Result<IngestReport, AdminError> {
        authorize(caller)?;
        let storage_path = required("storage_path", &request.storage_path)?;
        if !self.is_raw_path(storage_path) {
            return Err(AdminError::InvalidArgument(format!(
                "storage_path must be under '{}'",
                self.raw_prefix
            )));
        }
        if let Some(file_id) = request.file_id.as_deref().filter(|id| !id.trim().is_empty()) {
            if file_id != base_name(storage_path) {
                return Err(AdminError::InvalidArgument(format!(
                    "file_id '{file_id}' does not match storage_path"
                )));
            }
        }

        let bytes = self.objects.download(storage_path).await?;
        let report = self.ingest(&bytes, file_name(storage_path), storage_path).await?;
        Ok(report)
    }

    /// Purge the rows of every tracked file and drop all control records.
    /// Uploaded objects are kept so files can be reprocessed later.
    #[instrument(skip(self))]
    pub async fn reset_all(&self, caller: Caller) -> std::result::Result<ResetSummary, AdminError> {
        authorize(caller)?;

        let filter = ControlFilter {
            limit: Some(crate::control::MAX_LIST_LIMIT),
            ..Default::default()
        };
        let mut summary = ResetSummary::default();
        loop {
            let batch = self.control.list(&filter).await?;
            if batch.is_empty() {
                break;
            }
            for record in batch {
                for deletion in self.purge_file_rows(&record.file_name).await {
                    summary.rows_deleted += deletion.deleted;
                    if !deletion.is_ok() {
                        summary.table_failures += 1;
                    }
                }
                self.control.remove(&record.file_id).await?;
                summary.files_reset += 1;
            }
        }

        info!(
            files = summary.files_reset,
            rows = summary.rows_deleted,
            failures = summary.table_failures,
            "Reset complete"
        );
        Ok(summary)
    }
}

fn normalize_upload_name(file_name: &str) -> Result<&str> {
    let name = file_name.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return Err(IngestError::read(file_name, "invalid upload file name"));
    }
    Ok(name)
}

fn authorize(caller: Caller) -> std::result::Result<(), AdminError> {
    if caller.privileged {
        Ok(())
    } else {
        Err(AdminError::PermissionDenied)
    }
}

fn required<'a>(field: &str, value: &'a str) -> std::result::Result<&'a str, AdminError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AdminError::InvalidArgument(format!("{field} is required")));
    }
    Ok(value)
}
