//! Scripted GitHub API for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use repopulse_collector::config::{GitHubConfig, IngestConfig, LimitsConfig};
use repopulse_collector::github::pagination::page_url;
use repopulse_collector::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use repopulse_collector::GitHubClient;
use repopulse_shared::utils::time::{day_start_utc, to_api_timestamp};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const API_URL: &str = "https://api.test";

#[derive(Clone, Default)]
pub struct ScriptedApi {
    routes: Arc<Mutex<HashMap<String, VecDeque<HttpResponse>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedApi {
    pub fn respond(&self, url: impl Into<String>, status: u16, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string().into_bytes(),
            });
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn client(&self) -> Arc<GitHubClient> {
        let github = GitHubConfig {
            api_url: API_URL.to_string(),
            token: Some("test-token".to_string()),
            ..GitHubConfig::default()
        };
        Arc::new(GitHubClient::with_transport(
            Arc::new(self.clone()),
            &github,
            &LimitsConfig::default(),
        ))
    }
}

#[async_trait]
impl HttpTransport for ScriptedApi {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().unwrap().push(request.url.clone());
        let next = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|q| q.pop_front());
        next.ok_or(HttpError::NoMockResponse { url: request.url })
    }
}

pub fn repo_item(owner: &str, name: &str, stars: i64, language: Option<&str>) -> Value {
    json!({
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "owner": {"login": owner},
        "stargazers_count": stars,
        "watchers_count": stars,
        "forks_count": stars / 10,
        "language": language
    })
}

pub fn search_page(items: Vec<Value>) -> Value {
    json!({"total_count": items.len(), "incomplete_results": false, "items": items})
}

pub fn commit(author: &str) -> Value {
    json!({"sha": "abc", "commit": {"author": {"name": author, "email": "dev@example.com"}}})
}

pub fn listing_url(client: &GitHubClient, config: &IngestConfig) -> String {
    let query = match config.language() {
        Some(language) => format!("language:{}", language),
        None => "stars:>1".to_string(),
    };
    let base = client
        .endpoint(
            "/search/repositories",
            &[
                ("q", query),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
            ],
        )
        .unwrap();
    let per_page = config.per_page.min(config.top_n);
    page_url(&base, per_page, 1).unwrap()
}

pub fn commits_url(client: &GitHubClient, owner: &str, name: &str) -> String {
    let since = day_start_utc(Utc::now(), 0);
    let base = client
        .endpoint(
            &format!("/repos/{}/{}/commits", owner, name),
            &[("since", to_api_timestamp(since))],
        )
        .unwrap();
    page_url(&base, 100, 1).unwrap()
}

pub fn leaderboard_url(client: &GitHubClient, language: &str) -> String {
    client
        .endpoint(
            "/search/repositories",
            &[
                ("q", format!("language:{}", language)),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
                ("per_page", "100".to_string()),
                ("page", "1".to_string()),
            ],
        )
        .unwrap()
}
