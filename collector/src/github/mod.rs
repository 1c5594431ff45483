//! GitHub REST API access

pub mod cache;
pub mod client;
pub mod limiter;
pub mod pagination;
pub mod quota;
pub mod types;

pub use client::{ApiRequest, ApiResource, ApiResponse, GitHubClient};
pub use pagination::Paginator;
