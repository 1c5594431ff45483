//! Page-by-page traversal of list endpoints
//!
//! The next page comes from the `Link: <...>; rel="next"` header when the
//! server sends one. Without it, a full page implies `page + 1` and a short
//! page is the last. The cursor only ever moves forward: a continuation that
//! points back to a page already fetched ends the traversal.

use repopulse_shared::utils::clamp_logged;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use super::client::{ApiRequest, ApiResource, GitHubClient};
use super::types::Page;
use crate::error::FetchError;
use crate::http::{header_get, HttpHeaders};

/// Largest page size the API accepts.
pub const MAX_PER_PAGE: usize = 100;

/// Links from a `Link` response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkHeader {
    pub next: Option<String>,
    pub last: Option<String>,
}

pub fn parse_link_header(header: &str) -> LinkHeader {
    let mut links = LinkHeader::default();

    for part in header.split(',') {
        let mut url = None;
        let mut rel = None;
        for segment in part.split(';').map(str::trim) {
            if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                url = Some(inner);
            } else if let Some(value) = segment.strip_prefix("rel=") {
                rel = Some(value.trim_matches('"'));
            }
        }

        match (url, rel) {
            (Some(url), Some("next")) => links.next = Some(url.to_string()),
            (Some(url), Some("last")) => links.last = Some(url.to_string()),
            _ => {}
        }
    }

    links
}

/// The `page` query parameter of `url`, if any.
pub fn page_param(url: &str) -> Option<u32> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let page = parsed
        .query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok());
    page
}

/// `base` with `per_page` and `page` appended.
pub fn page_url(base: &str, per_page: usize, page: u32) -> Result<String, FetchError> {
    let mut url = reqwest::Url::parse(base).map_err(|e| FetchError::InvalidUrl {
        url: base.to_string(),
        message: e.to_string(),
    })?;
    url.query_pairs_mut()
        .append_pair("per_page", &per_page.to_string())
        .append_pair("page", &page.to_string());
    Ok(url.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Page(u32),
    Url(String),
}

/// Lazy sequence of pages from one list endpoint.
pub struct Paginator<P> {
    client: Arc<GitHubClient>,
    base_url: String,
    resource: ApiResource,
    per_page: usize,
    max_pages: Option<usize>,
    next: Option<Cursor>,
    /// Highest page number fetched so far
    last_page: u32,
    visited: HashSet<String>,
    fetched: usize,
    _page: PhantomData<fn() -> P>,
}

impl<P> Paginator<P>
where
    P: Page + DeserializeOwned,
{
    /// Start at page 1 of `base_url`, which must not carry `page` or
    /// `per_page` parameters itself.
    pub fn new(client: Arc<GitHubClient>, base_url: impl Into<String>, resource: ApiResource) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            resource,
            per_page: MAX_PER_PAGE,
            max_pages: None,
            next: Some(Cursor::Page(1)),
            last_page: 0,
            visited: HashSet::new(),
            fetched: 0,
            _page: PhantomData,
        }
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = clamp_logged("per_page", per_page, 1, MAX_PER_PAGE);
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }

    /// Fetch the next page. `Ok(None)` once the sequence is exhausted; it
    /// stays exhausted afterwards.
    pub async fn next_page(&mut self) -> Result<Option<Vec<P::Item>>, FetchError> {
        let Some(cursor) = self.next.take() else {
            return Ok(None);
        };
        if let Some(max) = self.max_pages {
            if self.fetched >= max {
                debug!("Stopping after {} pages of {}", max, self.base_url);
                return Ok(None);
            }
        }

        let (url, page) = match cursor {
            Cursor::Page(n) => (page_url(&self.base_url, self.per_page, n)?, Some(n)),
            Cursor::Url(url) => {
                let page = page_param(&url);
                (url, page)
            }
        };
        if !self.visited.insert(url.clone()) {
            warn!("Pagination returned to {}, stopping", url);
            return Ok(None);
        }

        let response = self
            .client
            .get_with_retry::<P>(&ApiRequest::new(url.as_str(), self.resource))
            .await?;
        self.fetched += 1;
        if let Some(n) = page {
            self.last_page = self.last_page.max(n);
        }

        let items = response.data.into_items();
        if items.is_empty() {
            return Ok(None);
        }
        self.next = self.advance(page, &response.headers, items.len());
        Ok(Some(items))
    }

    fn advance(&self, page: Option<u32>, headers: &HttpHeaders, count: usize) -> Option<Cursor> {
        if let Some(link) = header_get(headers, "link") {
            let links = parse_link_header(link);
            if let Some(last) = links.last.as_deref().and_then(page_param) {
                debug!("{} has {} pages", self.base_url, last);
            }
            let next = links.next?;
            if let Some(n) = page_param(&next) {
                if n <= self.last_page {
                    warn!(
                        "Next page {} does not advance past page {}, stopping",
                        n, self.last_page
                    );
                    return None;
                }
            }
            return Some(Cursor::Url(next));
        }

        match page {
            Some(n) if count >= self.per_page => Some(Cursor::Page(n + 1)),
            _ => None,
        }
    }

    /// Drain every remaining page into one list.
    pub async fn collect_all(mut self) -> Result<Vec<P::Item>, FetchError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}
