pub mod aggregator;
pub mod backend_poll;
pub mod balances;
pub mod export;
pub mod history;
pub mod market;
pub mod merger;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod tokens;
pub mod webhooks;
