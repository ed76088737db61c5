use std::time::Duration;

use pm_types::QuotaHint;
use pm_types::Result;
use pm_types::ServiceError;
use reqwest::Client;
use reqwest::ClientBuilder;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tracing::debug;

/// Configuration for the report transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the project-management service API
    pub base_url: String,

    /// API token sent as a bearer credential
    pub api_token: String,

    /// Connection establishment timeout (default: 10s)
    pub connect_timeout: Duration,

    /// Total request timeout (default: 30s)
    pub request_timeout: Duration,

    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com".to_string(),
            api_token: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
        }
    }
}

/// Thin HTTP adapter for the remote project-management service
///
/// Performs a single request per call and maps the raw response into the
/// shared error taxonomy; it never retries internally. All retry, caching
/// and rate-limit policy lives above it in the invoker.
pub struct ReportTransport {
    client: Client,
    config: TransportConfig,
}

impl ReportTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(ServiceError::Configuration("base_url must not be empty".to_string()));
        }

        let client = ClientBuilder::new()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .use_rustls_tls()
            .build()
            .map_err(|err| ServiceError::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { client, config })
    }

    /// Fetch one JSON document from the service
    ///
    /// Returns the body together with any quota hint the server attached to
    /// the response headers.
    pub async fn fetch_json(&self, path: &str) -> Result<(serde_json::Value, Option<QuotaHint>)> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'));

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let quota = quota_from_headers(response.headers());

        if let Some(error) = classify_status(status, response.headers()) {
            debug!(path, status = status.as_u16(), "service call failed");
            return Err(error);
        }

        // A body the service cannot serialize consistently is treated as a
        // transport-level fault and retried like any connection problem
        let body = response.json::<serde_json::Value>().await.map_err(|err| ServiceError::Connection(format!("invalid response body: {err}")))?;

        Ok((body, quota))
    }
}

/// Map an HTTP status into the taxonomy; None means success
fn classify_status(status: StatusCode, headers: &HeaderMap) -> Option<ServiceError> {
    if status.is_success() {
        return None;
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let quota = quota_from_headers(headers);
        return Some(ServiceError::RateLimited {
            retry_after: retry_after(headers),
            reset_in: quota.and_then(|hint| hint.reset_in),
            remaining: quota.and_then(|hint| hint.remaining),
            limit: quota.and_then(|hint| hint.limit),
        });
    }

    if status.is_server_error() {
        return Some(ServiceError::Transient { status: status.as_u16() });
    }

    Some(ServiceError::Permanent { status: status.as_u16() })
}

/// Quota details from X-RateLimit-* headers, when the server sends them
///
/// `X-RateLimit-Reset` is interpreted as seconds until the window resets.
fn quota_from_headers(headers: &HeaderMap) -> Option<QuotaHint> {
    let remaining = header_u32(headers, "x-ratelimit-remaining");
    let limit = header_u32(headers, "x-ratelimit-limit");
    let reset_in = header_u32(headers, "x-ratelimit-reset").map(|secs| Duration::from_secs(u64::from(secs)));

    if remaining.is_none() && limit.is_none() && reset_in.is_none() {
        return None;
    }
    Some(QuotaHint { remaining, limit, reset_in })
}

/// Delay-seconds form of the Retry-After header
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_u32(headers, "retry-after").map(|secs| Duration::from_secs(u64::from(secs)))
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if let Some(status) = err.status() {
        if status.is_server_error() {
            return ServiceError::Transient { status: status.as_u16() };
        }
        return ServiceError::Permanent { status: status.as_u16() };
    }
    // Connect failures, DNS errors and timeouts all land here
    ServiceError::Connection(err.to_string())
}
