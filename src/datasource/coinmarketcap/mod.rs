mod market_client;

pub use market_client::CoinMarketCapClient;
