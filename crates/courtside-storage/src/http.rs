use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_in_flight: usize,
    /// `None` sends requests as fast as `max_in_flight` allows.
    pub rate_limit: Option<RateLimit>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            max_in_flight: 4,
            rate_limit: None,
        }
    }
}

/// Steady request rate with a burst allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub per_second: u32,
    pub burst: u32,
}

impl RateLimit {
    fn interval(&self) -> Duration {
        (Duration::from_secs(1) / self.per_second.max(1)).max(Duration::from_nanos(1))
    }
}

/// Token bucket shared by every upstream call made through one fetcher. One token accrues
/// per interval up to `burst`; partial progress towards the next token is kept.
#[derive(Debug)]
pub struct RequestBudget {
    limit: RateLimit,
    state: Mutex<BudgetState>,
}

#[derive(Debug)]
struct BudgetState {
    available: u32,
    accrued_at: Instant,
}

impl RequestBudget {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            state: Mutex::new(BudgetState {
                available: limit.burst.max(1),
                accrued_at: Instant::now(),
            }),
        }
    }

    /// Waits until a request may go out, then spends one token.
    pub async fn acquire(&self) {
        let interval = self.limit.interval();
        let cap = self.limit.burst.max(1);
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let earned = now.saturating_duration_since(state.accrued_at).as_nanos()
                    / interval.as_nanos();
                if earned > 0 {
                    let earned = u32::try_from(earned).unwrap_or(u32::MAX);
                    state.available = state.available.saturating_add(earned).min(cap);
                    state.accrued_at = if state.available == cap {
                        now
                    } else {
                        state.accrued_at + interval * earned
                    };
                }
                if state.available > 0 {
                    state.available -= 1;
                    return;
                }
                (state.accrued_at + interval).saturating_duration_since(now)
            };
            sleep(wait).await;
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("request limiter closed")]
    LimiterClosed,
}

impl FetchError {
    /// Whether a later attempt has a realistic chance of succeeding.
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            Self::Request { source, .. } => classify_reqwest_error(source),
            Self::HttpStatus { status, .. } => StatusCode::from_u16(*status)
                .map(classify_status)
                .unwrap_or(RetryDisposition::NonRetryable),
            Self::Decode { .. } | Self::LimiterClosed => RetryDisposition::NonRetryable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub status: StatusCode,
    pub final_url: String,
    pub body: String,
}

/// Single-shot upstream fetcher. It bounds concurrent and per-interval load but never
/// retries: retry policy belongs to the caller's cadence.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    in_flight: Arc<Semaphore>,
    budget: Option<RequestBudget>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            budget: config.rate_limit.map(RequestBudget::new),
        })
    }

    pub async fn get_text(
        &self,
        label: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<FetchedBody, FetchError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;

        if let Some(budget) = &self.budget {
            budget.acquire().await;
        }

        let started = Instant::now();
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let body = resp.text().await.map_err(|source| FetchError::Request {
            url: final_url.clone(),
            source,
        })?;
        debug!(
            label,
            url = %final_url,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream fetch complete"
        );
        Ok(FetchedBody {
            status,
            final_url,
            body,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        label: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let fetched = self.get_text(label, url, query).await?;
        serde_json::from_str(&fetched.body).map_err(|source| FetchError::Decode {
            url: fetched.final_url,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn fetch_error_disposition_follows_status() {
        let err = FetchError::HttpStatus {
            status: 502,
            url: "https://example.invalid".into(),
        };
        assert_eq!(err.disposition(), RetryDisposition::Retryable);
        let err = FetchError::HttpStatus {
            status: 403,
            url: "https://example.invalid".into(),
        };
        assert_eq!(err.disposition(), RetryDisposition::NonRetryable);
    }

    fn budget(per_second: u32, burst: u32) -> RequestBudget {
        RequestBudget::new(RateLimit { per_second, burst })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_spent_immediately_then_requests_are_spaced() {
        let budget = budget(2, 3);
        let started = Instant::now();
        for _ in 0..3 {
            budget.acquire().await;
        }
        assert_eq!(started.elapsed(), Duration::ZERO);

        budget.acquire().await;
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        budget.acquire().await;
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_refills_only_up_to_the_burst() {
        let budget = budget(10, 2);
        budget.acquire().await;
        budget.acquire().await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let started = Instant::now();
        budget.acquire().await;
        budget.acquire().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        budget.acquire().await;
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_progress_towards_a_token_is_kept() {
        let budget = budget(1, 1);
        budget.acquire().await;
        tokio::time::advance(Duration::from_millis(600)).await;
        let started = Instant::now();
        budget.acquire().await;
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[test]
    fn fetcher_builds_with_defaults() {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            user_agent: Some("courtside-test/0.1".into()),
            rate_limit: Some(RateLimit {
                per_second: 5,
                burst: 2,
            }),
            ..Default::default()
        });
        assert!(fetcher.unwrap().budget.is_some());
    }
}
