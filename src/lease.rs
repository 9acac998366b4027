use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default wait between acquisition attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// A cookie file leased from the coordinator.
///
/// Not `Clone`: the id goes back to the coordinator exactly once, through
/// [`LeaseClient::release`].
#[derive(Debug)]
pub struct Lease {
    resource_id: String,
}

impl Lease {
    /// Rebuild a lease from an id obtained elsewhere, e.g. to free a cookie
    /// that an earlier run failed to release.
    pub fn from_resource_id(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }
}

/// How long `acquire` keeps polling.
///
/// With neither `max_attempts` nor `deadline` set the wait is unbounded and
/// ends only with a grant or cancellation.
#[derive(Debug, Clone)]
pub struct AcquirePolicy {
    pub poll_interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for AcquirePolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("cookie acquisition cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("no cookie granted after {attempts} attempt(s)")]
    AttemptsExhausted { attempts: u32 },

    #[error("no cookie granted within {deadline:?} ({attempts} attempt(s))")]
    DeadlineExceeded { deadline: Duration, attempts: u32 },
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(default)]
    cookie_file: Option<String>,
}

/// HTTP client for the cookie coordinator (`POST /start`, `POST /end`).
#[derive(Debug, Clone)]
pub struct LeaseClient {
    http: reqwest::Client,
    base_url: String,
}

impl LeaseClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Poll the coordinator until it grants a cookie.
    ///
    /// "None available" and transport failures are handled the same way: log,
    /// wait `poll_interval`, try again. Only the policy bounds or `cancel`
    /// end the loop without a lease.
    pub async fn acquire(
        &self,
        policy: &AcquirePolicy,
        cancel: &CancellationToken,
    ) -> Result<Lease, AcquireError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(AcquireError::Cancelled { attempts });
            }
            attempts += 1;

            let outcome = tokio::select! {
                outcome = self.request_cookie() => outcome,
                _ = cancel.cancelled() => return Err(AcquireError::Cancelled { attempts }),
            };

            match outcome {
                Ok(Some(resource_id)) => {
                    info!("Acquired cookie {} (attempt {})", resource_id, attempts);
                    return Ok(Lease { resource_id });
                }
                Ok(None) => info!(
                    "No cookie available (attempt {}), retrying in {:?}",
                    attempts, policy.poll_interval
                ),
                Err(e) => warn!(
                    "Error contacting cookie server (attempt {}), retrying in {:?}: {:#}",
                    attempts, policy.poll_interval, e
                ),
            }

            if let Some(max) = policy.max_attempts {
                if attempts >= max {
                    return Err(AcquireError::AttemptsExhausted { attempts });
                }
            }
            if let Some(deadline) = policy.deadline {
                if started.elapsed() + policy.poll_interval > deadline {
                    return Err(AcquireError::DeadlineExceeded { deadline, attempts });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(policy.poll_interval) => {}
                _ = cancel.cancelled() => return Err(AcquireError::Cancelled { attempts }),
            }
        }
    }

    /// Hand a cookie back to the coordinator. One request, no retry, never
    /// fails: if the request is lost the cookie stays leased on the server
    /// until someone releases it by hand.
    pub async fn release(&self, lease: Lease) {
        match self.return_cookie(&lease.resource_id).await {
            Ok(reply) => info!("Released cookie {}, server says: {}", lease.resource_id, reply),
            Err(e) => warn!(
                "Failed to release cookie {}, it may stay leased on the server: {:#}",
                lease.resource_id, e
            ),
        }
    }

    async fn request_cookie(&self) -> Result<Option<String>> {
        let response = self
            .http
            .post(format!("{}/start", self.base_url))
            .send()
            .await
            .context("POST /start failed")?;

        let body: StartResponse = response
            .json()
            .await
            .context("Invalid /start response")?;

        Ok(body.cookie_file.filter(|c| !c.is_empty()))
    }

    async fn return_cookie(&self, resource_id: &str) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}/end", self.base_url))
            .json(&json!({ "cookie_file": resource_id }))
            .send()
            .await
            .context("POST /end failed")?;

        response.json().await.context("Invalid /end response")
    }
}
