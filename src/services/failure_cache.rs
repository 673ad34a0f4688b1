use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::external::FetchError;
use crate::models::Ticker;

/// A remembered failed lookup for a ticker
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub failed_at: DateTime<Utc>,
    pub error_type: FailureType,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureType {
    NotFound,    // Backend has no quote for the ticker
    RateLimited, // Temporary throttle
}

impl FailureType {
    /// Only failures worth remembering map to a type; network blips are retried.
    pub fn from_fetch_error(e: &FetchError) -> Option<Self> {
        match e {
            FetchError::RateLimited => Some(FailureType::RateLimited),
            _ => None,
        }
    }
}

/// Thread-safe cache of ticker lookups that recently failed.
/// Stops the screener from re-verifying a symbol the backend just rejected.
#[derive(Clone, Default)]
pub struct FailureCache {
    cache: Arc<DashMap<Ticker, FailureInfo>>,
}

impl FailureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a ticker failed recently and the entry is still valid
    pub fn is_failed(&self, ticker: &Ticker) -> Option<FailureInfo> {
        if let Some(entry) = self.cache.get(ticker) {
            let info = entry.value().clone();
            let expiry = info.failed_at + Duration::minutes(info.ttl_minutes);

            if Utc::now() < expiry {
                return Some(info);
            }
            drop(entry); // Release the read lock before removing
            self.cache.remove(ticker);
        }
        None
    }

    pub fn record_failure(&self, ticker: &Ticker, error_type: FailureType) {
        let ttl_minutes = match error_type {
            FailureType::NotFound => 60,   // Unknown symbols rarely appear within the hour
            FailureType::RateLimited => 1, // Retry throttled lookups after a minute
        };

        self.cache.insert(
            ticker.clone(),
            FailureInfo {
                failed_at: Utc::now(),
                error_type,
                ttl_minutes,
            },
        );
    }

    /// Clear a ticker (e.g. after a successful lookup)
    pub fn clear(&self, ticker: &Ticker) {
        self.cache.remove(ticker);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    #[test]
    fn test_cache_records_and_retrieves_failures() {
        let cache = FailureCache::new();
        cache.record_failure(&t("NOPE.NS"), FailureType::NotFound);

        let result = cache.is_failed(&t("nope.ns"));
        assert!(result.is_some());
        assert_eq!(result.unwrap().error_type, FailureType::NotFound);
    }

    #[test]
    fn test_cache_clears_ticker() {
        let cache = FailureCache::new();
        cache.record_failure(&t("TEST"), FailureType::NotFound);
        cache.clear(&t("TEST"));
        assert!(cache.is_failed(&t("TEST")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_different_ttls_for_error_types() {
        let cache = FailureCache::new();
        cache.record_failure(&t("GONE"), FailureType::NotFound);
        cache.record_failure(&t("BUSY"), FailureType::RateLimited);

        assert_eq!(cache.is_failed(&t("GONE")).unwrap().ttl_minutes, 60);
        assert_eq!(cache.is_failed(&t("BUSY")).unwrap().ttl_minutes, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_only_throttles_are_remembered_from_errors() {
        assert_eq!(
            FailureType::from_fetch_error(&FetchError::RateLimited),
            Some(FailureType::RateLimited)
        );
        assert_eq!(FailureType::from_fetch_error(&FetchError::Network("x".into())), None);
    }
}
