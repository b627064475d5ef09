//! Feature modules implementing the CDP API
//!
//! Each feature is a vertical slice with its own commands, queries and routes.
//!
//! # Features
//!
//! - **files**: uploads, object notifications, control-record queries and the
//!   administrative delete / reprocess / reset-all operations
//!
//! # Architecture
//!
//! Each feature module follows the structure:
//! - `commands/` - Write operations
//! - `queries/` - Read operations
//! - `routes.rs` - HTTP route definitions

pub mod files;

use axum::Router;
use cdp_ingest::IngestionController;
use std::sync::Arc;

use crate::auth::AdminToken;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Pipeline entry point, wired to the configured stores
    pub controller: Arc<IngestionController>,
    /// Resolves privileged callers for the admin endpoints
    pub admin: AdminToken,
}

/// Creates the API router with all feature routes mounted
///
/// - `/files` - Uploads, notifications, control records and admin operations
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest("/files", files::files_routes().with_state(state))
}
