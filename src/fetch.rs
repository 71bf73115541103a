//! Source fetching.
//!
//! Every upstream request carries `User-Agent: NINA-importer/1.0`. Some of
//! the artsdatabanken.no endpoints reject generic client user agents, so the
//! header value must stay exactly as it is.
//!
//! There are no retries and no backoff. A failed fetch aborts the dataset,
//! and with it the run.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{ImportError, Result};

/// User agent sent with every request.
pub const USER_AGENT: &str = "NINA-importer/1.0";

/// Retrieves the raw body behind a literal URL.
///
/// Recipes only see this trait, so a pipeline can run against canned
/// bodies as well as the network.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetcher backed by a shared [`reqwest::Client`].
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ImportError::transport("<client>", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        info!("Fetching {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImportError::transport(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ImportError::transport(url, format!("HTTP {}", status)));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ImportError::transport(url, e))?;
        debug!(url, bytes = body.len(), "response received");
        Ok(body.to_vec())
    }
}
