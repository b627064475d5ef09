use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::debug;

use super::{map_db_error, quote_ident};
use crate::catalog::{FieldType, SchemaCatalog, TableSchema, SOURCE_FILE_COLUMN};
use crate::store::{AnalyticalStore, Row, StoreError};

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "TEXT",
        FieldType::Integer => "BIGINT",
        FieldType::Float => "DOUBLE PRECISION",
        FieldType::Timestamp => "TIMESTAMPTZ",
        FieldType::Json => "JSONB",
    }
}

fn text_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn timestamp_value(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Destination store writing one Postgres table per catalog table.
pub struct PgAnalyticalStore {
    pool: PgPool,
    catalog: Arc<SchemaCatalog>,
}

impl PgAnalyticalStore {
    pub fn new(pool: PgPool, catalog: Arc<SchemaCatalog>) -> Self {
        Self { pool, catalog }
    }

    fn qualified(dataset: &str, table: &str) -> Result<String, StoreError> {
        Ok(format!("{}.{}", quote_ident(dataset)?, quote_ident(table)?))
    }
}

#[async_trait]
impl AnalyticalStore for PgAnalyticalStore {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(dataset)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_dataset(&self, dataset: &str) -> Result<(), StoreError> {
        let sql = format!("CREATE SCHEMA {}", quote_ident(dataset)?);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(e, dataset))?;
        Ok(())
    }

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(dataset)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        schema: &TableSchema,
    ) -> Result<(), StoreError> {
        let columns = schema
            .fields
            .iter()
            .map(|f| Ok(format!("{} {}", quote_ident(&f.name)?, column_type(f.field_type))))
            .collect::<Result<Vec<_>, StoreError>>()?;
        let sql = format!(
            "CREATE TABLE {} ({})",
            Self::qualified(dataset, table)?,
            columns.join(", ")
        );

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(e, &format!("{dataset}.{table}")))?;

        if schema.field(SOURCE_FILE_COLUMN).is_some() {
            let index = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&format!("{table}_{SOURCE_FILE_COLUMN}_idx"))?,
                Self::qualified(dataset, table)?,
                quote_ident(SOURCE_FILE_COLUMN)?
            );
            sqlx::query(&index).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: &[Row],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let schema = self
            .catalog
            .get(table)
            .ok_or_else(|| StoreError::backend(format!("no schema for table {table}")))?;

        let columns = schema
            .fields
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            Self::qualified(dataset, table)?,
            columns.join(", ")
        ));

        query_builder.push_values(rows.iter(), |mut b, row| {
            for field in &schema.fields {
                let value = row.get(&field.name);
                match field.field_type {
                    FieldType::String => {
                        b.push_bind(text_value(value));
                    }
                    FieldType::Integer => {
                        b.push_bind(value.and_then(Value::as_i64));
                    }
                    FieldType::Float => {
                        b.push_bind(value.and_then(Value::as_f64));
                    }
                    FieldType::Timestamp => {
                        b.push_bind(timestamp_value(value));
                    }
                    FieldType::Json => {
                        b.push_bind(value.filter(|v| !v.is_null()).cloned());
                    }
                }
            }
        });

        query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(e, &format!("{dataset}.{table}")))?;

        debug!(table, rows = rows.len(), "Rows inserted");
        Ok(())
    }

    async fn delete_file_rows(
        &self,
        dataset: &str,
        table: &str,
        file_name: &str,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            Self::qualified(dataset, table)?,
            quote_ident(SOURCE_FILE_COLUMN)?
        );
        let result = sqlx::query(&sql)
            .bind(file_name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(e, &format!("{dataset}.{table}")))?;
        Ok(result.rows_affected())
    }
}
