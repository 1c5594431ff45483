//! HTTP transport boundary
//!
//! All network I/O goes through [`HttpTransport`] so the client logic can be
//! exercised against scripted responses.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Header name/value pairs. Lookups are case-insensitive.
pub type HttpHeaders = Vec<(String, String)>;

/// A GET request. The collector never sends a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HttpHeaders,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no scripted response for {url}")]
    NoMockResponse { url: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// First header value matching `name`, ignoring case.
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Production transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers: HttpHeaders = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
pub use mock::MockTransport;

#[cfg(test)]
mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Scripted responses keyed by URL, returned in FIFO order.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Mutex<Inner>>,
    }

    #[derive(Default)]
    struct Inner {
        routes: HashMap<String, VecDeque<Result<HttpResponse, String>>>,
        requests: Vec<HttpRequest>,
        latency: Duration,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&self, url: impl Into<String>, response: HttpResponse) {
            let mut inner = self.inner.lock().expect("mock transport lock");
            inner
                .routes
                .entry(url.into())
                .or_default()
                .push_back(Ok(response));
        }

        pub fn push_json(&self, url: impl Into<String>, status: u16, body: serde_json::Value) {
            self.push_response(
                url,
                HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.to_string().into_bytes(),
                },
            );
        }

        pub fn push_network_error(&self, url: impl Into<String>, message: &str) {
            let mut inner = self.inner.lock().expect("mock transport lock");
            inner
                .routes
                .entry(url.into())
                .or_default()
                .push_back(Err(message.to_string()));
        }

        /// Delay every response by `latency` (tokio time).
        pub fn set_latency(&self, latency: Duration) {
            self.inner.lock().expect("mock transport lock").latency = latency;
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.inner.lock().expect("mock transport lock").requests.clone()
        }

        pub fn request_count(&self, url: &str) -> usize {
            self.requests().iter().filter(|r| r.url == url).count()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let url = request.url.clone();
            let (scripted, latency) = {
                let mut inner = self.inner.lock().expect("mock transport lock");
                inner.requests.push(request);
                let scripted = inner.routes.get_mut(&url).and_then(|q| q.pop_front());
                (scripted, inner.latency)
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match scripted {
                Some(Ok(resp)) => Ok(resp),
                Some(Err(message)) => Err(HttpError::Transport(message)),
                None => Err(HttpError::NoMockResponse { url }),
            }
        }
    }
}
