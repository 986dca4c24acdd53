use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::address::WalletAddress;
use crate::datasource::types::{NativeBalance, OwnedToken, Page, TokenTransfer};
use crate::datasource::{check_response, ChainIndexSource};
use crate::error::FetchError;

/// Client for the Nodit web3 data API. Every call is a JSON `POST` to
/// `{base}/{network}/mainnet/{resource}`, authenticated with `X-API-KEY`.
#[derive(Clone)]
pub struct NoditClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NoditClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn post<B, T>(&self, network: &str, resource: &str, body: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}/mainnet/{}", self.base_url, network, resource);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .header("X-API-KEY", &self.api_key)
            .json(body)
            .send()
            .await?;
        let result: T = check_response(response).await?.json().await?;
        Ok(result)
    }
}

#[async_trait]
impl ChainIndexSource for NoditClient {
    async fn native_balance(
        &self,
        network: &str,
        address: &WalletAddress,
    ) -> Result<NativeBalance, FetchError> {
        self.post(
            network,
            "native/getNativeBalanceByAccount",
            &json!({ "accountAddress": address }),
        )
        .await
    }

    async fn tokens_owned(
        &self,
        network: &str,
        address: &WalletAddress,
    ) -> Result<Page<OwnedToken>, FetchError> {
        self.post(
            network,
            "token/getTokensOwnedByAccount",
            &json!({ "accountAddress": address, "withCount": false }),
        )
        .await
    }

    async fn token_transfers(
        &self,
        network: &str,
        address: &WalletAddress,
        contracts: &[String],
    ) -> Result<Page<TokenTransfer>, FetchError> {
        self.post(
            network,
            "token/getTokenTransfersByAccount",
            &json!({
                "accountAddress": address,
                "contractAddresses": contracts,
                "fromBlock": "0",
                "toBlock": "latest",
                "withCount": false,
                "withZeroValue": false,
            }),
        )
        .await
    }
}
