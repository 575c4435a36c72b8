//! Outbound client for the forecast provider
//!
//! Wraps a `reqwest` client with a retry middleware for transient failures
//! and a persistent response cache keyed by the full request URL.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
    Jitter, RetryTransientMiddleware, Retryable, RetryableStrategy, default_on_request_failure,
    policies::ExponentialBackoff,
};
use serde::{Deserialize, de::DeserializeOwned};
use tokio::time;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::ResponseCache;
use crate::config::UpstreamConfig;
use crate::error::{ServiceError, error_chain};

/// Retries transport failures and 5xx answers; any other non-success status is final.
struct TransientFailures;

impl RetryableStrategy for TransientFailures {
    fn handle(
        &self,
        res: &std::result::Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> Option<Retryable> {
        match res {
            Ok(response) if response.status().is_success() => None,
            Ok(response) if response.status().is_server_error() => {
                warn!("Upstream answered {}, treating as transient", response.status());
                Some(Retryable::Transient)
            }
            Ok(_) => Some(Retryable::Fatal),
            Err(error) => {
                warn!("Upstream request failed: {}", error_chain(error));
                default_on_request_failure(error)
            }
        }
    }
}

/// Error body Open-Meteo sends with 4xx answers
#[derive(Debug, Deserialize)]
struct ProviderError {
    reason: String,
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ProviderError>(body) {
        Ok(error) => format!("Upstream returned {status}: {}", error.reason),
        Err(_) => format!("Upstream returned {status}"),
    }
}

pub struct UpstreamClient {
    http: ClientWithMiddleware,
    cache: ResponseCache,
    ttl: Duration,
    /// Upper bound for a download including every retry
    deadline: Duration,
}

impl UpstreamClient {
    pub fn new(
        config: &UpstreamConfig,
        cache: ResponseCache,
        ttl: Duration,
        deadline: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .with_context(|| "Failed to create HTTP client")?;

        let (min_backoff, max_backoff) = config.backoff_bounds();
        let policy = ExponentialBackoff::builder()
            .retry_bounds(min_backoff, max_backoff)
            .jitter(Jitter::None)
            .base(2)
            .build_with_max_retries(config.max_retries);

        let http = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                policy,
                TransientFailures,
            ))
            .build();

        Ok(Self {
            http,
            cache,
            ttl,
            deadline,
        })
    }

    /// Fetch `endpoint` with `params` and parse the JSON body.
    ///
    /// Served from the cache while the stored body is fresh.
    #[instrument(level = "debug", skip(self, params))]
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<T, ServiceError> {
        let url = Url::parse_with_params(endpoint, params).map_err(|e| {
            ServiceError::upstream(format!("Invalid upstream URL '{endpoint}': {e}"))
        })?;
        let key = url.as_str().to_owned();

        if let Some(payload) = self.cached(&key).await {
            match serde_json::from_slice::<T>(&payload) {
                Ok(parsed) => {
                    debug!("Serving {} from cache", key);
                    return Ok(parsed);
                }
                Err(e) => {
                    warn!("Dropping unreadable cache entry for {}: {}", key, e);
                    if let Err(e) = self.cache.remove(&key).await {
                        warn!("Failed to remove cache entry: {:#}", e);
                    }
                }
            }
        }

        let payload = time::timeout(self.deadline, self.download(url))
            .await
            .map_err(|_| {
                ServiceError::upstream(format!(
                    "Upstream did not answer within {}s",
                    self.deadline.as_secs_f64()
                ))
            })??;
        let parsed = serde_json::from_slice::<T>(&payload)
            .map_err(|e| ServiceError::upstream(format!("Unexpected upstream payload: {e}")))?;

        if let Err(e) = self.cache.put(&key, payload, self.ttl).await {
            warn!("Failed to cache upstream response: {:#}", e);
        }

        Ok(parsed)
    }

    async fn cached(&self, key: &str) -> Option<Vec<u8>> {
        match self.cache.get::<Vec<u8>>(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache lookup failed, fetching upstream: {:#}", e);
                None
            }
        }
    }

    async fn download(&self, url: Url) -> std::result::Result<Vec<u8>, ServiceError> {
        let started = Instant::now();

        let response = self.http.get(url).send().await.map_err(|e| {
            ServiceError::upstream(format!("Upstream request failed: {}", error_chain(&e)))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::upstream(describe_failure(status, &body)));
        }

        let bytes = response.bytes().await.map_err(|e| {
            ServiceError::upstream(format!(
                "Failed to read upstream response: {}",
                error_chain(&e)
            ))
        })?;

        info!(
            "Upstream answered {} in {:.3}s ({} bytes)",
            status,
            started.elapsed().as_secs_f64(),
            bytes.len()
        );
        Ok(bytes.to_vec())
    }

    /// Flush the response cache to disk.
    pub fn close(&self) -> Result<()> {
        self.cache.flush()
    }
}
