use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// One fan-out step of an aggregate write that did not complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("person service unavailable: {0}")]
    RemoteUnavailable(#[from] TransportError),

    #[error("{entity} {id} written with {} failed step(s)", .failures.len())]
    PartialWrite { entity: &'static str, id: String, failures: Vec<StepFailure> },

    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::NotFound(_) => ErrorKind::NotFound,
            CatalogError::Conflict(_) => ErrorKind::Conflict,
            CatalogError::Validation(_) | CatalogError::Serialization(_) => {
                ErrorKind::ValidationFailure
            },
            CatalogError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            CatalogError::PartialWrite { .. } => ErrorKind::PartialWriteFailure,
            CatalogError::Database(_) => ErrorKind::Storage,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ValidationFailure,
    RemoteUnavailable,
    PartialWriteFailure,
    Storage,
}

/// True when the storage layer rejected a write because of a unique index.
pub fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(err.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_)))
}

pub type CatalogResult<T> = Result<T, CatalogError>;
