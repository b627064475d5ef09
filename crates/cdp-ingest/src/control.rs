//! Per-file control records
//!
//! Exactly one record exists per logical file (its base name) and it always
//! reflects the latest processing attempt. Writes go through [`ControlPatch`]
//! with merge semantics: fields left as `None` keep their stored value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::classify::FileClassification;
use crate::store::StoreError;

/// Default page size when listing control records.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Maximum page size when listing control records.
pub const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlStatus {
    Pending,
    Uploaded,
    Processing,
    Success,
    Warning,
    Error,
}

impl ControlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Uploaded => "UPLOADED",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Warning | Self::Error)
    }

    /// True once a processing attempt has started, so rows may already exist.
    pub fn has_attempted(&self) -> bool {
        matches!(self, Self::Processing) || self.is_terminal()
    }
}

impl std::fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ControlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "UPLOADED" => Ok(Self::Uploaded),
            "PROCESSING" => Ok(Self::Processing),
            "SUCCESS" => Ok(Self::Success),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// File base name without extension.
    pub file_id: String,
    pub file_name: String,
    pub storage_path: String,
    pub file_type: Option<FileClassification>,
    pub status: ControlStatus,
    pub rows_processed: i64,
    /// `YYYY-MM` or `UNKNOWN`.
    pub reference_date: String,
    pub error_details: Option<String>,
    pub target_table: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ControlRecord {
    /// A fresh record for `file_id` with every optional field empty.
    pub fn new(file_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let file_id = file_id.into();
        Self {
            file_name: file_id.clone(),
            storage_path: String::new(),
            file_id,
            file_type: None,
            status: ControlStatus::Pending,
            rows_processed: 0,
            reference_date: crate::competence::UNKNOWN_COMPETENCE.to_string(),
            error_details: None,
            target_table: None,
            uploaded_at: now,
            updated_at: now,
        }
    }

    /// Apply `patch` on top of this record.
    pub fn apply(&mut self, patch: &ControlPatch, now: DateTime<Utc>) {
        if let Some(v) = &patch.file_name {
            self.file_name = v.clone();
        }
        if let Some(v) = &patch.storage_path {
            self.storage_path = v.clone();
        }
        if let Some(v) = patch.file_type {
            self.file_type = Some(v);
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        if let Some(v) = patch.rows_processed {
            self.rows_processed = v;
        }
        if let Some(v) = &patch.reference_date {
            self.reference_date = v.clone();
        }
        if let Some(v) = &patch.error_details {
            self.error_details = v.clone();
        }
        if let Some(v) = &patch.target_table {
            self.target_table = Some(v.clone());
        }
        if let Some(v) = patch.uploaded_at {
            self.uploaded_at = v;
        }
        self.updated_at = now;
    }
}

/// Partial update of a control record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlPatch {
    pub file_name: Option<String>,
    pub storage_path: Option<String>,
    pub file_type: Option<FileClassification>,
    pub status: Option<ControlStatus>,
    pub rows_processed: Option<i64>,
    pub reference_date: Option<String>,
    /// `Some(None)` clears a previous error.
    pub error_details: Option<Option<String>>,
    pub target_table: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl ControlPatch {
    pub fn status(status: ControlStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(Some(details.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_details = Some(None);
        self
    }
}

/// Listing filter. Bounds on `reference_date` are inclusive `YYYY-MM` values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ControlFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<ControlStatus>,
    pub limit: Option<usize>,
}

impl ControlFilter {
    pub fn matches(&self, record: &ControlRecord) -> bool {
        let date = record.reference_date.as_str();
        let bounded = self.from.is_some() || self.to.is_some();
        if bounded && !crate::competence::is_well_formed(date) {
            return false;
        }
        self.from.as_deref().is_none_or(|from| date >= from)
            && self.to.as_deref().is_none_or(|to| date <= to)
            && self.status.is_none_or(|status| record.status == status)
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

/// Persistence for control records.
#[async_trait]
pub trait ControlStore: Send + Sync {
    async fn get(&self, file_id: &str) -> Result<Option<ControlRecord>, StoreError>;

    /// Create the record if missing, then merge `patch` into it. Returns the stored record.
    async fn upsert(&self, file_id: &str, patch: ControlPatch) -> Result<ControlRecord, StoreError>;

    /// Remove the record; `false` if it did not exist.
    async fn remove(&self, file_id: &str) -> Result<bool, StoreError>;

    /// Records matching `filter`, most recently updated first.
    async fn list(&self, filter: &ControlFilter) -> Result<Vec<ControlRecord>, StoreError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(date: &str, status: ControlStatus) -> ControlRecord {
        let mut r = ControlRecord::new("202501_Imoveis", Utc::now());
        r.reference_date = date.into();
        r.status = status;
        r
    }

    #[test]
    fn test_status_round_trip_and_serde() {
        for status in [
            ControlStatus::Pending,
            ControlStatus::Uploaded,
            ControlStatus::Processing,
            ControlStatus::Success,
            ControlStatus::Warning,
            ControlStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ControlStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&ControlStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
        assert!("done".parse::<ControlStatus>().is_err());
        assert_eq!("success".parse::<ControlStatus>().unwrap(), ControlStatus::Success);
    }

    #[test]
    fn test_attempted_states() {
        assert!(!ControlStatus::Uploaded.has_attempted());
        assert!(!ControlStatus::Pending.has_attempted());
        assert!(ControlStatus::Processing.has_attempted());
        assert!(ControlStatus::Warning.has_attempted());
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let now = Utc::now();
        let mut r = ControlRecord::new("a", now);
        r.apply(
            &ControlPatch {
                storage_path: Some("uploads/raw/a.csv".into()),
                rows_processed: Some(10),
                ..ControlPatch::status(ControlStatus::Error).with_error("boom")
            },
            now,
        );
        r.apply(&ControlPatch::status(ControlStatus::Processing), now);

        assert_eq!(r.status, ControlStatus::Processing);
        assert_eq!(r.storage_path, "uploads/raw/a.csv");
        assert_eq!(r.rows_processed, 10);
        assert_eq!(r.error_details.as_deref(), Some("boom"));

        r.apply(&ControlPatch::status(ControlStatus::Success).clear_error(), now);
        assert_eq!(r.error_details, None);
    }

    #[test]
    fn test_filter_by_date_range_and_status() {
        let filter = ControlFilter {
            from: Some("2024-01".into()),
            to: Some("2024-06".into()),
            status: Some(ControlStatus::Success),
            limit: None,
        };
        assert!(filter.matches(&record("2024-01", ControlStatus::Success)));
        assert!(filter.matches(&record("2024-06", ControlStatus::Success)));
        assert!(!filter.matches(&record("2024-07", ControlStatus::Success)));
        assert!(!filter.matches(&record("2024-03", ControlStatus::Error)));
        assert!(ControlFilter::default().matches(&record("UNKNOWN", ControlStatus::Error)));

        let open_ended = ControlFilter {
            from: Some("2024-01".into()),
            ..Default::default()
        };
        assert!(!open_ended.matches(&record("UNKNOWN", ControlStatus::Success)));
    }

    #[test]
    fn test_effective_limit() {
        assert_eq!(ControlFilter::default().effective_limit(), DEFAULT_LIST_LIMIT);
        let big = ControlFilter {
            limit: Some(1_000_000),
            ..Default::default()
        };
        assert_eq!(big.effective_limit(), MAX_LIST_LIMIT);
    }
}
