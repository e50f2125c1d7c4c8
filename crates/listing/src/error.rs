use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("forbidden: missing grant `{grant}`")]
    Forbidden { grant: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    ValidationFailed(ValidationErrors),

    #[error("{message}")]
    PersistenceFailed {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("`{field}` is not an orderable field of {entity}")]
    InvalidSortField { entity: &'static str, field: String },

    #[error("page size must be greater than zero")]
    InvalidPageSize,

    #[error("import file is empty")]
    EmptyImportFile,

    #[error("no record is open for editing")]
    NoActiveEdit,

    #[error("bulk delete of {entity} rejected, unknown ids: {}", missing.join(", "))]
    BulkDeleteRejected {
        entity: &'static str,
        missing: Vec<String>,
    },
}

impl ListingError {
    pub(crate) fn persistence(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::PersistenceFailed {
            message: message.into(),
            source,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}
