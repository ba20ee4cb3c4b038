use crate::provider::error::ProviderError;
use crate::repository::error::DatabaseError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("Unexpected result: {message}")]
    UnexpectedResult { message: String },

    #[error("ProviderError: {0}")]
    ProviderError(#[from] ProviderError),

    #[error("DatabaseError: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Show `{show_id}` not found.")]
    ShowNotFound { show_id: String },
}
