//! Rate-limited HTTP access with bounded retry.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::Quota;
use governor::RateLimiter;
use governor::clock::QuantaClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use log::debug;
use log::warn;
use serde::de::DeserializeOwned;
use url::Url;
use wreq::header::HeaderMap;
use wreq::header::HeaderValue;
use wreq::header::USER_AGENT;

use crate::config::ProviderSettings;
use crate::provider::error::ProviderError;

const USER_AGENT_VALUE: &str = concat!("shows-bot/", env!("CARGO_PKG_VERSION"));

/// How often and how patiently a failed request is repeated.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Backoff slept after the 0-indexed `attempt` failed: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// HTTP client shared by the calls of one provider.
///
/// Only transport failures and 5xx responses are retried. Each call owns its own
/// retry loop, so concurrent callers never wait on each other's backoff.
pub struct ResilientClient {
    name: String,
    client: wreq::Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(name: &str, settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        let client = wreq::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()?;

        let per_second = NonZeroU32::new(settings.rate_limit).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            name: name.to_string(),
            client,
            limiter,
            policy: RetryPolicy::new(settings.max_retries),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GETs `url` with `query` appended and returns the response body.
    pub async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, ProviderError> {
        let url = Self::build_url(url, query)?;
        let attempts = self.policy.max_attempts();
        let mut last_err = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt - 1);
                debug!(
                    "Retrying {} request in {delay:?} (attempt {}/{attempts})",
                    self.name,
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "{} request failed (attempt {}/{attempts}): {e}",
                        self.name,
                        attempt + 1
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::RetriesExhausted {
            attempts,
            source: Box::new(last_err.unwrap_or(ProviderError::UnexpectedResult {
                message: "no attempt was made".to_string(),
            })),
        })
    }

    /// Same as [`Self::get_text`], decoding the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let body = self.get_text(url, query).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_once(&self, url: &Url) -> Result<String, ProviderError> {
        self.limiter.until_ready().await;

        debug!("Making request to: {}", url.path());
        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::ServerError {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::ClientError {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    fn build_url(url: &str, query: &[(&str, &str)]) -> Result<Url, ProviderError> {
        let parsed = if query.is_empty() {
            Url::parse(url)
        } else {
            Url::parse_with_params(url, query)
        };
        parsed.map_err(|e| ProviderError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_for() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_delay_for_saturates() {
        let policy = RetryPolicy::new(3);
        assert!(policy.delay_for(64) >= policy.delay_for(31));
    }

    #[test]
    fn test_build_url_encodes_query() {
        let url = ResilientClient::build_url(
            "https://api.tvmaze.com/search/shows",
            &[("q", "the office & co")],
        )
        .unwrap();
        assert_eq!(url.path(), "/search/shows");
        assert_eq!(
            url.query_pairs().next().map(|(k, v)| (k.to_string(), v.to_string())),
            Some(("q".to_string(), "the office & co".to_string()))
        );
    }
}
