use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::services::PollPolicy;

pub const DEFAULT_NEWS_API_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_BROKER_LOGIN_URL: &str = "https://kite.zerodha.com/connect/login";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
    #[error("{name} has invalid value {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Always ends with '/', so relative endpoints join under it.
    pub backend_api_url: Url,
    pub news_api_url: Url,
    pub news_api_key: Option<String>,
    pub poll_interval: Duration,
    /// `None` when `POLL_WINDOW_SECS=0`: poll until the view goes away.
    pub poll_window: Option<Duration>,
    /// Views not looked up for this long are unmounted. `None` when
    /// `VIEW_IDLE_TTL_SECS=0`.
    pub view_idle_ttl: Option<Duration>,
    pub max_graphs: usize,
    pub news_feed_limit: usize,
    pub recommendations_file: Option<PathBuf>,
    pub broker_login_url: Url,
    pub bind_addr: SocketAddr,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which returns `None` for unset names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend_raw = var("BACKEND_API_URL").ok_or(ConfigError::Missing("BACKEND_API_URL"))?;
        let backend_api_url = parse_url("BACKEND_API_URL", &with_trailing_slash(&backend_raw))?;

        let news_api_url = parse_url(
            "NEWS_API_URL",
            &var("NEWS_API_URL").unwrap_or_else(|| DEFAULT_NEWS_API_URL.to_string()),
        )?;
        let broker_login_url = parse_url(
            "BROKER_LOGIN_URL",
            &var("BROKER_LOGIN_URL").unwrap_or_else(|| DEFAULT_BROKER_LOGIN_URL.to_string()),
        )?;

        let poll_interval_ms: u64 = parse_or("POLL_INTERVAL_MS", var("POLL_INTERVAL_MS"), 3000)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "POLL_INTERVAL_MS",
                value: "0".to_string(),
            });
        }
        let poll_window_secs: u64 = parse_or("POLL_WINDOW_SECS", var("POLL_WINDOW_SECS"), 20)?;
        let view_idle_ttl_secs: u64 = parse_or("VIEW_IDLE_TTL_SECS", var("VIEW_IDLE_TTL_SECS"), 600)?;
        let max_graphs: usize = parse_or("MAX_GRAPHS", var("MAX_GRAPHS"), 6)?;
        let news_feed_limit: usize = parse_or("NEWS_FEED_LIMIT", var("NEWS_FEED_LIMIT"), 6)?;
        let bind_addr: SocketAddr = parse_or(
            "BIND_ADDR",
            var("BIND_ADDR"),
            SocketAddr::from(([0, 0, 0, 0], 3000)),
        )?;

        Ok(Self {
            backend_api_url,
            news_api_url,
            news_api_key: var("NEWS_API_KEY"),
            poll_interval: Duration::from_millis(poll_interval_ms),
            poll_window: (poll_window_secs > 0).then(|| Duration::from_secs(poll_window_secs)),
            view_idle_ttl: (view_idle_ttl_secs > 0).then(|| Duration::from_secs(view_idle_ttl_secs)),
            max_graphs,
            news_feed_limit,
            recommendations_file: var("RECOMMENDATIONS_FILE").map(PathBuf::from),
            broker_login_url,
            bind_addr,
        })
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(self.poll_interval, self.poll_window)
    }
}

fn with_trailing_slash(raw: &str) -> String {
    if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}
