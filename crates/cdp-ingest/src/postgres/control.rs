use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::control::{ControlFilter, ControlPatch, ControlRecord, ControlStore};
use crate::store::StoreError;

const UPSERT_SQL: &str = r#"
    INSERT INTO ingestion_control (
        file_id, file_name, storage_path, file_type, status, rows_processed,
        reference_date, error_details, target_table, uploaded_at, updated_at
    )
    VALUES (
        $1, COALESCE($2, $1), COALESCE($3, ''), $4, COALESCE($5, 'PENDING'),
        COALESCE($6, 0), COALESCE($7, 'UNKNOWN'), $8, $9, COALESCE($10, NOW()), NOW()
    )
    ON CONFLICT (file_id) DO UPDATE SET
        file_name = COALESCE($2, ingestion_control.file_name),
        storage_path = COALESCE($3, ingestion_control.storage_path),
        file_type = COALESCE($4, ingestion_control.file_type),
        status = COALESCE($5, ingestion_control.status),
        rows_processed = COALESCE($6, ingestion_control.rows_processed),
        reference_date = COALESCE($7, ingestion_control.reference_date),
        error_details = CASE WHEN $11 THEN $8 ELSE ingestion_control.error_details END,
        target_table = COALESCE($9, ingestion_control.target_table),
        uploaded_at = COALESCE($10, ingestion_control.uploaded_at),
        updated_at = NOW()
    RETURNING *
"#;

/// Control records in the `ingestion_control` table.
pub struct PgControlStore {
    pool: PgPool,
}

impl PgControlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: &PgRow) -> Result<ControlRecord, StoreError> {
    let file_type: Option<String> = row.try_get("file_type")?;
    let status: String = row.try_get("status")?;

    Ok(ControlRecord {
        file_id: row.try_get("file_id")?,
        file_name: row.try_get("file_name")?,
        storage_path: row.try_get("storage_path")?,
        file_type: file_type
            .map(|t| t.parse())
            .transpose()
            .map_err(StoreError::backend)?,
        status: status.parse().map_err(StoreError::backend)?,
        rows_processed: row.try_get("rows_processed")?,
        reference_date: row.try_get("reference_date")?,
        error_details: row.try_get("error_details")?,
        target_table: row.try_get("target_table")?,
        uploaded_at: row.try_get("uploaded_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ControlStore for PgControlStore {
    async fn get(&self, file_id: &str) -> Result<Option<ControlRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM ingestion_control WHERE file_id = $1")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn upsert(&self, file_id: &str, patch: ControlPatch) -> Result<ControlRecord, StoreError> {
        let (set_error, error_details) = match patch.error_details {
            Some(details) => (true, details),
            None => (false, None),
        };

        let row = sqlx::query(UPSERT_SQL)
            .bind(file_id)
            .bind(patch.file_name)
            .bind(patch.storage_path)
            .bind(patch.file_type.map(|t| t.as_str()))
            .bind(patch.status.map(|s| s.as_str()))
            .bind(patch.rows_processed)
            .bind(patch.reference_date)
            .bind(error_details)
            .bind(patch.target_table)
            .bind(patch.uploaded_at)
            .bind(set_error)
            .fetch_one(&self.pool)
            .await?;
        decode(&row)
    }

    async fn remove(&self, file_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM ingestion_control WHERE file_id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &ControlFilter) -> Result<Vec<ControlRecord>, StoreError> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM ingestion_control WHERE TRUE");

        if filter.from.is_some() || filter.to.is_some() {
            query_builder.push(" AND reference_date ~ '^[0-9]{4}-[0-9]{2}$'");
        }
        if let Some(from) = &filter.from {
            query_builder.push(" AND reference_date >= ").push_bind(from.clone());
        }
        if let Some(to) = &filter.to {
            query_builder.push(" AND reference_date <= ").push_bind(to.clone());
        }
        if let Some(status) = filter.status {
            query_builder.push(" AND status = ").push_bind(status.as_str());
        }
        query_builder
            .push(" ORDER BY updated_at DESC, file_id LIMIT ")
            .push_bind(filter.effective_limit() as i64);

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode).collect()
    }
}
