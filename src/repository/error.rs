use sqlx::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DatabaseError {
    #[error("Internal database error: {0}")]
    BackendError(#[from] sqlx::Error),

    #[error("Internal database error: {message}")]
    InternalError { message: String },
}

impl DatabaseError {
    /// Whether the statement was rejected by a UNIQUE constraint.
    pub fn is_unique_violation(&self) -> bool {
        if let DatabaseError::BackendError(sqlx_err) = self
            && let Some(db_err) = sqlx_err.as_database_error()
        {
            return matches!(db_err.kind(), ErrorKind::UniqueViolation);
        }
        false
    }
}
