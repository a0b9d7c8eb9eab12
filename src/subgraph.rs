//! Subgraph transport.
//!
//! Scrapers depend on `SubgraphSource` only, so the network can be
//! replaced by canned responses in tests.

use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[async_trait::async_trait]
pub trait SubgraphSource: Send + Sync {
    /// POSTs a GraphQL query and returns the raw response body.
    async fn post_query(&self, query: &str) -> anyhow::Result<String>;
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
}

/// HTTP client for a single subgraph endpoint.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    client: Client,
    endpoint: String,
}

impl SubgraphClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl SubgraphSource for SubgraphClient {
    async fn post_query(&self, query: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&QueryBody { query })
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?
            .error_for_status()
            .with_context(|| format!("subgraph {} returned an error status", self.endpoint))?;

        response
            .text()
            .await
            .with_context(|| format!("reading response body from {}", self.endpoint))
    }
}

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Deserialize, Clone)]
pub struct GraphQlError {
    pub message: String,
}

/// Standard GraphQL response envelope.
///
/// A missing `data` decodes to `T::default()`; a non-empty `errors`
/// array is turned into an error by `into_data`.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,

    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl<T: Default> GraphQlResponse<T> {
    pub fn into_data(self) -> anyhow::Result<T> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            anyhow::bail!("subgraph returned errors: {}", messages.join("; "));
        }
        Ok(self.data.unwrap_or_default())
    }
}
