//! Rate Limiter — named token-bucket scheduler for external HTTP APIs
//! (aggregator quote/assemble endpoints, pairs listing, token markets,
//! token security).

use crate::bucket::TokenBucket;
use crate::config::ApiRateLimit;
use dashmap::DashMap;
use std::time::Duration;

/// Registry of named per-service rate limiters, built once at startup from
/// `apiRateLimits.<service>.requestsPerMinute`.
pub struct RateLimiterRegistry {
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiterRegistry {
    pub fn new(limits: &[ApiRateLimit]) -> Self {
        let buckets = DashMap::new();
        for limit in limits {
            buckets.insert(
                limit.service.clone(),
                TokenBucket::new(limit.requests_per_minute, Duration::from_secs(60), 4),
            );
        }
        Self { buckets }
    }

    /// Acquire a slot for `service`, registering a default bucket (60 rpm) the
    /// first time an unconfigured service is seen.
    pub async fn acquire(&self, service: &str) {
        if !self.buckets.contains_key(service) {
            self.buckets.insert(
                service.to_string(),
                TokenBucket::new(60, Duration::from_secs(60), 4),
            );
        }
        // DashMap guard must be dropped before the await to avoid holding
        // the shard lock across a possibly-long wait.
        let needs_release = {
            let entry = self.buckets.get(service).expect("just inserted");
            entry.acquire().await;
            true
        };
        debug_assert!(needs_release);
    }

    pub async fn release(&self, service: &str) {
        if let Some(entry) = self.buckets.get(service) {
            entry.release().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_service_gets_default_bucket() {
        let registry = RateLimiterRegistry::new(&[]);
        registry.acquire("unknown-service").await;
        registry.release("unknown-service").await;
        assert!(registry.buckets.contains_key("unknown-service"));
    }

    #[tokio::test]
    async fn configured_service_uses_its_budget() {
        let registry = RateLimiterRegistry::new(&[ApiRateLimit {
            service: "oneinch".into(),
            requests_per_minute: 5,
        }]);
        registry.acquire("oneinch").await;
        assert!(registry.buckets.contains_key("oneinch"));
    }
}
