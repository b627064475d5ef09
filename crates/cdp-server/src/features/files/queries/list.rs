use cdp_ingest::competence::is_well_formed;
use cdp_ingest::control::{ControlFilter, ControlRecord, ControlStatus};
use cdp_ingest::IngestionController;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;

/// `GET /files?from=2024-01&to=2024-12&status=success&limit=50`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilesQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

impl ListFilesQuery {
    pub fn to_filter(&self) -> Result<ControlFilter, AppError> {
        for (name, bound) in [("from", &self.from), ("to", &self.to)] {
            if let Some(value) = bound {
                if !is_well_formed(value) {
                    return Err(AppError::BadRequest(format!(
                        "{name} must be a YYYY-MM month, got '{value}'"
                    )));
                }
            }
        }
        if let (Some(from), Some(to)) = (&self.from, &self.to) {
            if from > to {
                return Err(AppError::BadRequest(format!("from ({from}) is after to ({to})")));
            }
        }
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ControlStatus>)
            .transpose()
            .map_err(AppError::BadRequest)?;

        Ok(ControlFilter {
            from: self.from.clone(),
            to: self.to.clone(),
            status,
            limit: self.limit,
        })
    }
}

#[tracing::instrument(skip(controller))]
pub async fn handle(
    controller: Arc<IngestionController>,
    query: ListFilesQuery,
) -> Result<(Vec<ControlRecord>, usize), AppError> {
    let filter = query.to_filter()?;
    let records = controller.records(&filter).await?;
    Ok((records, filter.effective_limit()))
}
