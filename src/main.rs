use axum::http::{header, Method};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod address;
mod chains;
mod config;
mod datasource;
mod error;
mod handlers;
mod services;

use address::WalletAddress;
use config::AppConfig;
use datasource::backend::BackendGatewayClient;
use datasource::coinmarketcap::CoinMarketCapClient;
use datasource::nodit::NoditClient;
use datasource::oneinch::OneInchPortfolioClient;
use datasource::Upstreams;
use services::aggregator::ChainAggregator;
use services::backend_poll::BackendPoller;
use services::balances::BalanceService;
use services::history::HistoryService;
use services::market::MarketService;
use services::metrics::PortfolioMetrics;
use services::processor::ProtocolProcessor;
use services::queue::RateLimitedQueue;
use services::tokens::TokenService;
use services::webhooks::WebhookService;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<ChainAggregator>,
    pub token_service: Arc<TokenService>,
    pub history_service: Arc<HistoryService>,
    pub backend_poller: Arc<BackendPoller>,
    pub balance_service: Arc<BalanceService>,
    pub market_service: Arc<MarketService>,
    pub webhook_service: Arc<WebhookService>,
    pub processor: Arc<ProtocolProcessor>,
    pub metrics: Arc<PortfolioMetrics>,
    /// Background refresh still running per address, keyed to its run id
    pub refresh: Arc<Mutex<HashMap<WalletAddress, (Uuid, CancellationToken)>>>,
}

impl AppState {
    pub fn new(upstreams: Upstreams, config: &AppConfig) -> Self {
        // every portfolio API call in the process shares this one queue;
        // the indexer and market APIs are paced by their own
        let queue = Arc::new(RateLimitedQueue::new(config.queue_delay));
        let index_queue = Arc::new(RateLimitedQueue::new(config.index_queue_delay));
        let market_queue = Arc::new(RateLimitedQueue::new(config.market_queue_delay));

        let aggregator = Arc::new(ChainAggregator::new(
            upstreams.portfolio.clone(),
            queue.clone(),
            config.indexer_retry.clone(),
            chains::registry(),
            config.inter_chain_delay,
        ));
        let token_service = Arc::new(TokenService::new(
            upstreams.portfolio.clone(),
            queue.clone(),
            config.indexer_retry.clone(),
        ));
        let history_service = Arc::new(HistoryService::new(
            upstreams.portfolio,
            queue,
            config.history_retry.clone(),
            chains::registry(),
        ));
        let backend_poller = Arc::new(BackendPoller::new(
            upstreams.backend.clone(),
            config.indexer_retry.clone(),
            config.poll_retry.clone(),
        ));
        let balance_service = Arc::new(BalanceService::new(
            upstreams.index,
            index_queue,
            config.indexer_retry.clone(),
            chains::INDEXED_NETWORKS.to_vec(),
        ));
        let market_service = Arc::new(MarketService::new(
            upstreams.market,
            market_queue,
            config.indexer_retry.clone(),
        ));

        Self {
            aggregator,
            token_service,
            history_service,
            backend_poller,
            balance_service,
            market_service,
            webhook_service: Arc::new(WebhookService::new(upstreams.backend)),
            processor: Arc::new(ProtocolProcessor::new()),
            metrics: Arc::new(PortfolioMetrics::new()),
            refresh: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goker_portfolio=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    for (key, value) in [
        ("INCH_API_KEY", &config.inch_api_key),
        ("NODIT_API_KEY", &config.nodit_api_key),
        ("CMC_API_KEY", &config.cmc_api_key),
    ] {
        if value.is_empty() {
            tracing::warn!("{} is not set, those upstream calls will be unauthenticated", key);
        }
    }

    // Initialize data sources
    let upstreams = Upstreams {
        portfolio: Arc::new(OneInchPortfolioClient::new(
            &config.inch_api_url,
            &config.inch_api_key,
        )),
        backend: Arc::new(BackendGatewayClient::new(&config.backend_url)),
        index: Arc::new(NoditClient::new(&config.nodit_api_url, &config.nodit_api_key)),
        market: Arc::new(CoinMarketCapClient::new(&config.cmc_api_url, &config.cmc_api_key)),
    };

    let state = AppState::new(upstreams, &config);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let app = handlers::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    // Start server
    let addr = config.bind_addr();
    tracing::info!(
        "Starting portfolio API server on {} (queue delay {}ms, {} chains)",
        addr,
        config.queue_delay.as_millis(),
        chains::SUPPORTED_CHAINS.len()
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
