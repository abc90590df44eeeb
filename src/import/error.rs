use serde::Serialize;
use thiserror::Error;

/// Why a single row did not fully import. Never escapes the row boundary; the
/// orchestrator folds it into the report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{message}")]
    Resolution { message: String },

    #[error("product upsert failed: {message}")]
    ProductPersistence { message: String },

    /// The product row exists but its category links could not be written.
    #[error("product {product_id} saved but category links failed: {message}")]
    LinkPersistence { product_id: i64, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Resolution,
    Persistence,
    Partial,
}

impl RowError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::ProductPersistence { .. } => ErrorKind::Persistence,
            Self::LinkPersistence { .. } => ErrorKind::Partial,
        }
    }

    /// True when store state was mutated before the failure.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::LinkPersistence { .. })
    }
}
