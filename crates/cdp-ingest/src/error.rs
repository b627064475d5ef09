//! Error types for the ingestion pipeline

use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unable to classify file '{0}'")]
    Unclassified(String),

    /// The table is missing from the schema catalog. This is a deployment
    /// problem, not a data problem, and must reach the caller.
    #[error("no schema registered for table '{0}'")]
    UnknownTable(String),

    #[error("failed to read '{file}': {reason}")]
    Read { file: String, reason: String },

    #[error("batch rows {start}..{end} of '{table}' failed: {source}")]
    Batch {
        table: String,
        start: usize,
        end: usize,
        #[source]
        source: StoreError,
    },

    /// Rows of an earlier attempt could not be removed, so loading again
    /// would duplicate them.
    #[error("failed to purge earlier rows of '{file}' from '{table}': {reason}")]
    Purge {
        file: String,
        table: String,
        reason: String,
    },

    #[error("failed to serialize record for '{table}': {source}")]
    Serialization {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn read(file: &str, reason: impl std::fmt::Display) -> Self {
        Self::Read {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Configuration failures halt the caller instead of only marking the file.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnknownTable(_))
    }
}

/// Failure of an administrative operation, with a stable wire code.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("caller is not allowed to perform this operation")]
    PermissionDenied,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl AdminError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid-argument",
            Self::PermissionDenied => "permission-denied",
            Self::NotFound(_) => "not-found",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<IngestError> for AdminError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Store(store) => store.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_error_codes() {
        assert_eq!(AdminError::InvalidArgument("x".into()).code(), "invalid-argument");
        assert_eq!(AdminError::PermissionDenied.code(), "permission-denied");
        assert_eq!(AdminError::NotFound("x".into()).code(), "not-found");
        assert_eq!(AdminError::Internal("x".into()).code(), "internal");
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: AdminError = StoreError::NotFound("uploads/raw/a.csv".into()).into();
        assert!(matches!(err, AdminError::NotFound(_)));

        let err: AdminError = IngestError::UnknownTable("x".into()).into();
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn test_batch_error_names_range() {
        let err = IngestError::Batch {
            table: "grupos_detalhados".into(),
            start: 1000,
            end: 2000,
            source: StoreError::Backend("connection reset".into()),
        };
        assert_eq!(
            err.to_string(),
            "batch rows 1000..2000 of 'grupos_detalhados' failed: store error: connection reset"
        );
        assert!(!err.is_configuration());
    }
}
