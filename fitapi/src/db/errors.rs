use thiserror::Error;

/// Unified error type for storage operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation on {entity}.{field}")]
    UniqueViolation { entity: String, field: String },

    /// The backing store could not be reached. Callers on the authentication path treat this as
    /// "no principal" but log it separately from a plain miss.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// Whether retrying the same operation later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Unavailable("connection refused".to_string()).is_transient());
        assert!(!DbError::NotFound.is_transient());
        assert!(
            !DbError::UniqueViolation {
                entity: "users".to_string(),
                field: "email".to_string(),
            }
            .is_transient()
        );
    }
}
