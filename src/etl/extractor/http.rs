//! HTTP fetcher for the NFT transfers API.
//!
//! Range scopes hit `/networks/{network}/nfts/transfers` and single-block scopes
//! hit `/networks/{network}/nfts/block/transfers`. Authentication is HTTP basic
//! auth with the API key/secret pair.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;

use super::TransferFetcher;
use crate::etl::error::FetchError;
use crate::etl::transfer::{Page, QueryScope};

pub const DEFAULT_API_URL: &str = "https://nft.api.infura.io";

/// API key/secret pair. The secret never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// HTTP fetcher configuration
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Base URL of the API (no trailing path)
    pub api_url: String,

    /// Chain identifier used in the request path (e.g. "1" for mainnet)
    pub network: String,

    pub credentials: Credentials,

    /// Timeout for one round trip, body included
    pub request_timeout: Duration,
}

impl FetcherConfig {
    pub fn new(network: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            network: network.into(),
            credentials,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransferFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpTransferFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, scope: &QueryScope) -> String {
        let base = self.config.api_url.trim_end_matches('/');
        match scope {
            QueryScope::BlockRange { .. } => {
                format!("{base}/networks/{}/nfts/transfers", self.config.network)
            }
            QueryScope::Block { .. } => {
                format!("{base}/networks/{}/nfts/block/transfers", self.config.network)
            }
        }
    }
}

fn scope_query(scope: &QueryScope) -> Vec<(&'static str, String)> {
    match scope {
        QueryScope::BlockRange {
            from_block,
            to_block,
        } => vec![
            ("fromBlock", from_block.to_string()),
            ("toBlock", to_block.to_string()),
        ],
        QueryScope::Block { block_number } => vec![("blockHashNumber", block_number.to_string())],
    }
}

#[async_trait]
impl TransferFetcher for HttpTransferFetcher {
    async fn fetch(&self, scope: &QueryScope, cursor: Option<&str>) -> Result<Page, FetchError> {
        let mut request = self
            .client
            .get(self.endpoint(scope))
            .query(&scope_query(scope))
            .header(CONTENT_TYPE, "application/json")
            .basic_auth(
                &self.config.credentials.key,
                Some(&self.config.credentials.secret),
            );

        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        match status {
            StatusCode::OK => {
                serde_json::from_slice::<Page>(&body).map_err(|e| FetchError::Decode(e.to_string()))
            }
            StatusCode::BAD_REQUEST => Err(FetchError::RetryableStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            _ => Err(FetchError::FatalStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }
}
