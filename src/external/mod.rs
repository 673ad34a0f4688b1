pub mod market_backend;
pub mod backend;
pub mod alphavantage;

pub use market_backend::{
    AuthStatus, BrokerCredentials, BrokerSession, FailureKind, FetchError, MarketBackend, NewsProvider,
};
