//! Rate-limited GitHub REST client
//!
//! Every request passes, in order, through the response cache (when the
//! request is cacheable), the client-side window limiter and the
//! server-reported quota tracker before it reaches the transport.

use chrono::{DateTime, Utc};
use repopulse_shared::utils::retry::{retry_with_backoff, RetryPolicy};
use repopulse_shared::utils::time::from_epoch_secs;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::cache::ApiCache;
use super::limiter::ResourceLimiter;
use super::quota::{QuotaHeaders, QuotaTracker};
use super::types::ApiErrorBody;
use crate::config::{GitHubConfig, LimitsConfig};
use crate::error::FetchError;
use crate::http::{HttpError, HttpHeaders, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::metrics;

const ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = "repopulse";
const API_VERSION: &str = "2022-11-28";

/// Wait assumed when a rate-limited response carries no reset hint.
const DEFAULT_RATE_LIMIT_WAIT_SECS: i64 = 60;

/// Quota bucket a request is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiResource {
    Core,
    Search,
}

impl ApiResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiResource::Core => "core",
            ApiResource::Search => "search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: String,
    pub resource: ApiResource,
    /// Serve from and store into the response cache
    pub cacheable: bool,
}

impl ApiRequest {
    pub fn new(url: impl Into<String>, resource: ApiResource) -> Self {
        Self {
            url: url.into(),
            resource,
            cacheable: false,
        }
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub headers: HttpHeaders,
    pub from_cache: bool,
}

pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    token: Option<String>,
    quota: Arc<QuotaTracker>,
    limiter: ResourceLimiter,
    cache: ApiCache<HttpResponse>,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Client over the real network.
    pub fn new(github: &GitHubConfig, limits: &LimitsConfig) -> Result<Self, HttpError> {
        let transport = ReqwestTransport::with_timeout(github.timeout())?;
        Ok(Self::with_transport(Arc::new(transport), github, limits))
    }

    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        github: &GitHubConfig,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            transport,
            api_url: github.api_url.trim_end_matches('/').to_string(),
            token: github.token.clone().filter(|t| !t.is_empty()),
            quota: Arc::new(QuotaTracker::new()),
            limiter: limits.build_limiter(),
            cache: ApiCache::new(github.cache_capacity, github.cache_ttl()),
            retry: github.retry_policy(),
        }
    }

    pub fn quota(&self) -> &Arc<QuotaTracker> {
        &self.quota
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Absolute URL for an API path with query parameters encoded.
    pub fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<String, FetchError> {
        let base = format!("{}{}", self.api_url, path);
        let url = if params.is_empty() {
            reqwest::Url::parse(&base)
        } else {
            reqwest::Url::parse_with_params(&base, params)
        };
        url.map(String::from).map_err(|e| FetchError::InvalidUrl {
            url: base,
            message: e.to_string(),
        })
    }

    fn request_headers(&self) -> HttpHeaders {
        let mut headers = vec![
            ("Accept".to_string(), ACCEPT.to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
        ];
        if let Some(token) = &self.token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        headers
    }

    /// Issue one GET and decode the JSON body. No retries.
    pub async fn get<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<ApiResponse<T>, FetchError> {
        if request.cacheable {
            if let Some(cached) = self.cache.get(&request.url).await {
                debug!("Cache hit for {}", request.url);
                return Ok(ApiResponse {
                    data: decode(&request.url, &cached.body)?,
                    headers: cached.headers,
                    from_cache: true,
                });
            }
        }

        let response = self.send(request).await?;
        let data = decode(&request.url, &response.body)?;
        if request.cacheable {
            self.cache.insert(request.url.clone(), response.clone()).await;
        }
        Ok(ApiResponse {
            data,
            headers: response.headers,
            from_cache: false,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, FetchError> {
        Ok(self.get(request).await?.data)
    }

    /// [`get`](Self::get) with bounded retries for transient failures.
    pub async fn get_with_retry<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<ApiResponse<T>, FetchError> {
        let operation = format!("GET {}", request.url);
        retry_with_backoff(&operation, self.retry, || self.get(request)).await
    }

    pub async fn get_json_with_retry<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, FetchError> {
        Ok(self.get_with_retry(request).await?.data)
    }

    async fn send(&self, request: &ApiRequest) -> Result<HttpResponse, FetchError> {
        let resource = request.resource.as_str();
        let _permits = self.limiter.acquire(resource).await;
        self.quota.acquire(resource).await;

        debug!("GET {}", request.url);
        let started = Instant::now();
        let result = self
            .transport
            .send(HttpRequest {
                url: request.url.clone(),
                headers: self.request_headers(),
            })
            .await;
        metrics::HTTP_DURATION
            .with_label_values(&[resource])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::HTTP_REQUESTS
                    .with_label_values(&[resource, "error"])
                    .inc();
                return Err(FetchError::Transient {
                    url: request.url.clone(),
                    message: e.to_string(),
                });
            }
        };
        metrics::HTTP_REQUESTS
            .with_label_values(&[resource, &response.status.to_string()])
            .inc();

        if let Some(report) = QuotaHeaders::parse(&response.headers) {
            let reported = report.resource.as_deref().unwrap_or(resource);
            self.quota.update(reported, report.quota).await;
        }

        match check_status(&request.url, resource, &response, Utc::now()) {
            Ok(()) => Ok(response),
            Err(FetchError::RateLimited { resource, reset_at }) => {
                self.quota.mark_exhausted(&resource, reset_at).await;
                Err(FetchError::RateLimited { resource, reset_at })
            }
            Err(e) => Err(e),
        }
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Map a response status to the error taxonomy.
///
/// 429, and 403 with either an exhausted quota or a `retry-after` header, are
/// rate limits. Other 4xx are permanent, 5xx transient.
pub(crate) fn check_status(
    url: &str,
    resource: &str,
    response: &HttpResponse,
    now: DateTime<Utc>,
) -> Result<(), FetchError> {
    if response.is_success() {
        return Ok(());
    }
    if let Some(reset_at) = rate_limit_reset(response, now) {
        return Err(FetchError::RateLimited {
            resource: response
                .header("x-ratelimit-resource")
                .unwrap_or(resource)
                .to_string(),
            reset_at,
        });
    }

    let message = serde_json::from_slice::<ApiErrorBody>(&response.body)
        .map(|body| body.message)
        .unwrap_or_else(|_| format!("HTTP {}", response.status));
    if response.status >= 500 {
        Err(FetchError::Transient {
            url: url.to_string(),
            message: format!("{}: {}", response.status, message),
        })
    } else {
        Err(FetchError::Permanent {
            status: response.status,
            message,
            url: url.to_string(),
        })
    }
}

fn rate_limit_reset(response: &HttpResponse, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let exhausted = response
        .header("x-ratelimit-remaining")
        .is_some_and(|v| v.trim() == "0");
    let retry_after = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<i64>().ok());

    match response.status {
        429 => {}
        403 if exhausted || retry_after.is_some() => {}
        _ => return None,
    }

    if let Some(secs) = retry_after {
        return Some(now + chrono::Duration::seconds(secs.max(0)));
    }
    let reset = response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok());
    Some(match reset {
        Some(epoch) => from_epoch_secs(epoch),
        None => now + chrono::Duration::seconds(DEFAULT_RATE_LIMIT_WAIT_SECS),
    })
}
