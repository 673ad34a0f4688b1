//! Stock market dashboard service: live quote screener, multi-chart view,
//! brokerage portfolio, sentiment news and analyst recommendations, served as
//! JSON view snapshots over a REST market-data backend.

pub mod app;
pub mod config;
pub mod errors;
pub mod external;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod views;
