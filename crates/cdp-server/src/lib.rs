//! CDP Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP front for the consortium disclosure ingestion pipeline. Uploaded files
//! land under the raw prefix of an S3-compatible bucket, are ingested into
//! Postgres, and are tracked by one control record each.
//!
//! # Routes
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET  | `/health` | liveness and database check |
//! | POST | `/api/v1/files/upload/:file_name` | multipart upload, ingested in the background |
//! | POST | `/api/v1/files/events` | object-storage notification |
//! | GET  | `/api/v1/files` | list control records |
//! | GET  | `/api/v1/files/:file_id` | one control record |
//! | POST | `/api/v1/files/admin/delete` | remove a file's rows, object and record |
//! | POST | `/api/v1/files/admin/reprocess` | re-run ingestion for a stored file |
//! | POST | `/api/v1/files/admin/reset-all` | purge every ingested row and record |
//!
//! Admin routes require the `x-admin-token` header.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod features;
pub mod middleware;
pub mod storage;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{ApiResult, AppError};
