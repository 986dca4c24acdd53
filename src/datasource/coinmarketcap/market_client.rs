use async_trait::async_trait;
use reqwest::{header, Client, Url};

use crate::datasource::types::{MarketListing, MarketResponse};
use crate::datasource::{check_response, MarketDataSource};
use crate::error::FetchError;

const INFO_PATH: &str = "/v2/cryptocurrency/info";
const QUOTES_PATH: &str = "/v2/cryptocurrency/quotes/latest";

/// Client for the CoinMarketCap pro API.
#[derive(Clone)]
pub struct CoinMarketCapClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CoinMarketCapClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn lookup(
        &self,
        path: &str,
        key: &str,
        value: &str,
    ) -> Result<MarketResponse, FetchError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| FetchError::Validation(format!("invalid market API url: {}", e)))?;
        url.query_pairs_mut().append_pair(key, value);

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .header("X-CMC_PRO_API_KEY", &self.api_key)
            .send()
            .await?;
        let result: MarketResponse = check_response(response).await?.json().await?;
        Ok(result)
    }
}

#[async_trait]
impl MarketDataSource for CoinMarketCapClient {
    async fn token_info(
        &self,
        contract_address: &str,
    ) -> Result<Option<MarketListing>, FetchError> {
        let response = self.lookup(INFO_PATH, "address", contract_address).await?;
        Ok(response.into_first())
    }

    async fn latest_quote(&self, id: u64) -> Result<Option<MarketListing>, FetchError> {
        let response = self.lookup(QUOTES_PATH, "id", &id.to_string()).await?;
        Ok(response.into_first())
    }
}
