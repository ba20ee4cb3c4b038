#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Provider returned server error status {status}.")]
    ServerError { status: u16 },

    #[error("Provider rejected the request with status {status}.")]
    ClientError { status: u16 },

    #[error("Failed to parse API response: {0}")]
    JsonParseFailed(#[from] serde_json::Error),

    #[error("Invalid URL `{url}`: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid data from API: missing field `{field}`.")]
    MissingField { field: String },

    #[error("Provider `{provider}` is not configured.")]
    UnsupportedProvider { provider: String },

    #[error("Request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("Unexpected error: {message}")]
    UnexpectedResult { message: String },
}

impl ProviderError {
    /// Transport failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RequestFailed(_) | ProviderError::ServerError { .. }
        )
    }
}

impl From<wreq::Error> for ProviderError {
    fn from(e: wreq::Error) -> Self {
        ProviderError::RequestFailed(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(ProviderError::ServerError { status: 503 }.is_retryable());
        assert!(!ProviderError::ClientError { status: 404 }.is_retryable());
        assert!(
            !ProviderError::MissingField {
                field: "id".to_string()
            }
            .is_retryable()
        );
    }
}
