use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::de::DeserializeOwned;

use crate::address::WalletAddress;
use crate::datasource::types::{Envelope, ProtocolList, TimeRange, TokenDetails, ValuePoint};
use crate::datasource::{check_response, PortfolioSource};
use crate::error::FetchError;

const PROTOCOLS_PATH: &str = "/portfolio/portfolio/v4/overview/protocols/details";
const ERC20_PATH: &str = "/portfolio/portfolio/v4/overview/erc20/details";
const VALUE_CHART_PATH: &str = "/portfolio/portfolio/v4/general/value_chart";

/// Client for the 1inch portfolio API, bearer-token authenticated.
#[derive(Clone)]
pub struct OneInchPortfolioClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OneInchPortfolioClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| FetchError::Validation(format!("invalid portfolio API url: {}", e)))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }

    /// Shared query for the per-chain overview endpoints.
    fn chain_params(chain_id: u64, address: &WalletAddress) -> Vec<(&'static str, String)> {
        vec![
            ("addresses", address.as_str().to_string()),
            ("chain_id", chain_id.to_string()),
            ("closed", "true".to_string()),
            ("closed_threshold", "1".to_string()),
            ("use_cache", "true".to_string()),
        ]
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json");
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = check_response(request.send().await?).await?;
        let envelope: Envelope<T> = response.json().await?;
        if let Some(cached_at) = envelope.meta.as_ref().and_then(|m| m.cached_at) {
            tracing::trace!("portfolio API served cached result from {}", cached_at);
        }
        Ok(envelope.result)
    }
}

#[async_trait]
impl PortfolioSource for OneInchPortfolioClient {
    async fn get_protocols(
        &self,
        chain_id: u64,
        address: &WalletAddress,
    ) -> Result<ProtocolList, FetchError> {
        let url = self.url(PROTOCOLS_PATH, &Self::chain_params(chain_id, address))?;
        self.get(url).await
    }

    async fn get_tokens(
        &self,
        chain_id: u64,
        address: &WalletAddress,
    ) -> Result<Vec<TokenDetails>, FetchError> {
        let url = self.url(ERC20_PATH, &Self::chain_params(chain_id, address))?;
        self.get(url).await
    }

    async fn get_value_chart(
        &self,
        chain_id: u64,
        address: &WalletAddress,
        timerange: TimeRange,
    ) -> Result<Vec<ValuePoint>, FetchError> {
        let params = vec![
            ("addresses", address.to_string()),
            ("chain_id", chain_id.to_string()),
            ("timerange", timerange.as_str().to_string()),
            ("use_cache", "true".to_string()),
        ];
        let url = self.url(VALUE_CHART_PATH, &params)?;
        self.get(url).await
    }
}
