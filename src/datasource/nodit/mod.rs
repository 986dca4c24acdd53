mod indexer_client;

pub use indexer_client::NoditClient;
