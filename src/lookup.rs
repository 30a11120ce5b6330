//! Token display-name lookup.
//!
//! Lookups never fail from the caller's point of view: any error,
//! timeout, or empty answer yields [`UNKNOWN_TOKEN`].

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::TokenLookupConfig;
use crate::error::redact_sensitive_detail;

/// Display name used when a token cannot be resolved.
pub const UNKNOWN_TOKEN: &str = "Unknown Token";

/// Resolves a contract address to a human-readable token name.
#[async_trait]
pub trait TokenLookup: Send + Sync {
    async fn display_name(&self, address: &str) -> String;
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    base_token: BaseToken,
}

#[derive(Debug, Deserialize)]
struct BaseToken {
    name: String,
}

/// Lookup backed by the DexScreener token endpoint.
pub struct DexScreenerLookup {
    http: reqwest::Client,
    base_url: String,
}

impl DexScreenerLookup {
    pub fn new(config: &TokenLookupConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_name(&self, address: &str) -> Result<Option<String>, String> {
        let url = format!(
            "{}/latest/dex/tokens/{}",
            self.base_url,
            urlencoding::encode(address)
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let body: TokensResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body
            .pairs
            .and_then(|pairs| pairs.into_iter().next())
            .map(|pair| pair.base_token.name)
            .filter(|name| !name.trim().is_empty()))
    }
}

#[async_trait]
impl TokenLookup for DexScreenerLookup {
    async fn display_name(&self, address: &str) -> String {
        match self.fetch_name(address).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                tracing::debug!(address, "No trading pairs for token");
                UNKNOWN_TOKEN.to_string()
            }
            Err(reason) => {
                tracing::warn!(
                    address,
                    error = %redact_sensitive_detail(&reason),
                    "Token lookup failed"
                );
                UNKNOWN_TOKEN.to_string()
            }
        }
    }
}
