use thiserror::Error;

#[derive(Error, Debug)]
pub enum HazopError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Rating {field} rejected: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{id}' belongs to another organization")]
    Forbidden { entity: &'static str, id: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Copy from deviation '{source_deviation}' rolled back: {cause}")]
    CopyRolledBack {
        source_deviation: String,
        #[source]
        cause: Box<HazopError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HazopError {
    pub fn out_of_range(field: &'static str, value: i64) -> Self {
        Self::Validation {
            field,
            reason: format!("{value} is outside the rating range 1..=5"),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn forbidden(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Forbidden { entity, id: id.into() }
    }

    /// Short machine-readable class, for callers relaying errors as JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_)          => "database",
            Self::Serialization(_)     => "serialization",
            Self::Validation { .. }    => "validation",
            Self::InvalidInput { .. }  => "invalid_input",
            Self::NotFound { .. }      => "not_found",
            Self::Forbidden { .. }     => "forbidden",
            Self::Cancelled            => "cancelled",
            Self::CopyRolledBack { .. } => "copy_rolled_back",
            Self::Other(_)             => "other",
        }
    }
}

pub type HazopResult<T> = Result<T, HazopError>;
