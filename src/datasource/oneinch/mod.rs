mod portfolio_client;

pub use portfolio_client::OneInchPortfolioClient;
