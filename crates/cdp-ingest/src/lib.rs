//! CDP Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingestion pipeline for the consortium-market disclosure files published by
//! the central bank: quarterly and monthly CSV/XLSX reports with drifting
//! layouts, accented headers and Brazilian number formatting.
//!
//! # Pipeline
//!
//! ```text
//! bytes ─► classify ─► read rows ─► map rows ─► provision tables ─► batch load
//!                                                                     │
//!                      control record: UPLOADED ─► PROCESSING ─► SUCCESS/WARNING/ERROR
//! ```
//!
//! - [`normalize`]: header tokens (`Código_do_grupo` → `codigodogrupo`)
//! - [`values`]: candidate lookup and Brazilian number parsing
//! - [`classify`]: file name rules, then header rules
//! - [`rows`]: CSV and spreadsheet readers
//! - [`mapper`]: one mapping function per layout into [`records::CanonicalRecord`]
//! - [`provision`] / [`loader`]: destination tables and batched inserts
//! - [`controller`]: per-file state machine and the admin operations
//!
//! Storage is reached through the traits in [`store`] and [`control`]. The
//! [`memory`] module implements them in-process; the `database` feature adds
//! Postgres implementations in `postgres`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cdp_ingest::catalog::SchemaCatalog;
//! use cdp_ingest::controller::IngestionController;
//! use cdp_ingest::memory::{MemoryAnalyticalStore, MemoryControlStore, MemoryObjectStore};
//!
//! # async fn run() -> cdp_ingest::error::Result<()> {
//! let controller = IngestionController::new(
//!     Arc::new(MemoryControlStore::new()),
//!     Arc::new(MemoryAnalyticalStore::new()),
//!     Arc::new(MemoryObjectStore::new()),
//!     Arc::new(SchemaCatalog::default()),
//! );
//! let bytes = std::fs::read("202501_Imoveis.csv").unwrap_or_default();
//! let report = controller
//!     .ingest(&bytes, "202501_Imoveis.csv", "uploads/raw/202501_Imoveis.csv")
//!     .await?;
//! println!("{} rows, status {}", report.rows_processed, report.status);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod classify;
pub mod competence;
pub mod control;
pub mod controller;
pub mod error;
pub mod loader;
pub mod mapper;
pub mod memory;
pub mod normalize;
#[cfg(feature = "database")]
pub mod postgres;
pub mod provision;
pub mod records;
pub mod rows;
pub mod store;
pub mod values;

pub use catalog::SchemaCatalog;
pub use classify::FileClassification;
pub use control::{ControlRecord, ControlStatus};
pub use controller::{Caller, IngestReport, IngestionController};
pub use error::{AdminError, IngestError, Result};
