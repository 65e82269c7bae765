//! HTTP Entity Statement Provider
//!
//! Fetches statements from well-known configuration URLs and fetch endpoints,
//! caching the parsed result for a bounded time.

use async_trait::async_trait;
use moka::future::Cache;
use oidfed_core::EntityStatement;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{configuration_url, EntityStatementProvider};
use crate::error::{ResolveError, Result};

/// Configuration for the HTTP provider
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Request timeout
    pub timeout: Duration,
    /// How long fetched statements stay cached
    pub cache_ttl: Duration,
    /// Maximum number of cached statements
    pub cache_capacity: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
            user_agent: format!("oidfed-resolver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpProviderConfig {
    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// Provider fetching statements over HTTP(S)
pub struct HttpProvider {
    /// Parsed statements by request URL
    cache: Cache<String, EntityStatement>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpProvider {
    /// Create a provider with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(HttpProviderConfig::default())
    }

    /// Create a provider with the given settings
    pub fn with_config(config: HttpProviderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            cache: Cache::builder()
                .time_to_live(config.cache_ttl)
                .max_capacity(config.cache_capacity)
                .build(),
            http_client,
        })
    }

    /// Fetch and parse a statement (with caching)
    async fn fetch(&self, url: &str) -> Result<EntityStatement> {
        if let Some(cached) = self.cache.get(url).await {
            debug!(url = %url, "Using cached statement");
            return Ok(cached);
        }

        debug!(url = %url, "Fetching statement");
        let response = self.http_client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolveError::NotFound(url.to_string()));
        }
        let body = response.error_for_status()?.text().await?;

        let statement = EntityStatement::parse(body)?;
        self.cache.insert(url.to_string(), statement.clone()).await;

        Ok(statement)
    }
}

#[async_trait]
impl EntityStatementProvider for HttpProvider {
    async fn entity_configuration(&self, entity_id: &str) -> Result<EntityStatement> {
        self.fetch(&configuration_url(entity_id)).await
    }

    async fn subordinate_statement(
        &self,
        fetch_endpoint: &str,
        subject: &str,
        _issuer: &str,
    ) -> Result<EntityStatement> {
        let url = Url::parse_with_params(fetch_endpoint, &[("sub", subject)])?;
        self.fetch(url.as_str()).await
    }

    fn description(&self) -> &str {
        "HTTP entity statement provider"
    }
}
