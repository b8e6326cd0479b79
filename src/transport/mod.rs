//! RPC Transport — a pool of chain endpoints, each rate-limited by a
//! per-second and a per-minute token bucket, with a health state machine.

use crate::bucket::TokenBucket;
use crate::config::RpcSettings;
use crate::error::EngineError;
use crate::types::{now_secs, EndpointHealth, RpcEndpointMeta};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};

struct EndpointSlot {
    meta: RwLock<RpcEndpointMeta>,
    minute_bucket: TokenBucket,
    second_bucket: TokenBucket,
    provider: RootProvider,
}

/// A pool of RPC endpoints with round-robin selection, health tracking, and
/// per-endpoint rate limiting.
pub struct RpcTransport {
    endpoints: Vec<EndpointSlot>,
    cursor: AtomicUsize,
    settings: RpcSettings,
}

impl RpcTransport {
    /// Build a transport from a list of HTTP(S) RPC URLs. Invalid URLs are a
    /// `ConfigInvalid` error — the caller should treat that as fatal at
    /// startup.
    pub fn new(urls: &[String], settings: RpcSettings) -> Result<Self, EngineError> {
        if urls.is_empty() {
            return Err(EngineError::ConfigInvalid("rpcNodes is empty".into()));
        }
        let mut endpoints = Vec::with_capacity(urls.len());
        for url in urls {
            let parsed = url
                .parse()
                .map_err(|e| EngineError::ConfigInvalid(format!("bad RPC URL {url}: {e}")))?;
            let provider = ProviderBuilder::new()
                .disable_recommended_fillers()
                .connect_http(parsed);
            endpoints.push(EndpointSlot {
                meta: RwLock::new(RpcEndpointMeta::new(url.clone())),
                minute_bucket: TokenBucket::new(
                    settings.max_requests_per_minute,
                    Duration::from_secs(60),
                    1,
                ),
                second_bucket: TokenBucket::new(
                    settings.max_requests_per_second,
                    Duration::from_secs(1),
                    settings.max_requests_per_second.min(4).max(1),
                ),
                provider,
            });
        }
        Ok(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
            settings,
        })
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn url(&self, idx: usize) -> String {
        self.endpoints[idx].meta.read().unwrap().url.clone()
    }

    pub fn is_healthy(&self, idx: usize) -> bool {
        self.endpoints[idx].meta.read().unwrap().health == EndpointHealth::Healthy
    }

    /// Round-robin cursor: advance until a healthy endpoint is found, or
    /// fall back to returning whatever the cursor lands on ("fallback:
    /// return any endpoint and log").
    pub fn select_endpoint(&self) -> usize {
        let n = self.endpoints.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
        for offset in 0..n {
            let idx = (start + offset) % n;
            if self.is_healthy(idx) {
                return idx;
            }
        }
        warn!("no healthy RPC endpoint available, falling back to {start}");
        start
    }

    /// Route a call through both token buckets (minute then second), invoke
    /// it against the selected endpoint's provider, and update health state.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(RootProvider) -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        let idx = self.select_endpoint();
        let slot = &self.endpoints[idx];
        slot.minute_bucket.acquire().await;
        slot.second_bucket.acquire().await;
        let result = f(slot.provider.clone()).await;
        slot.minute_bucket.release().await;
        slot.second_bucket.release().await;

        match &result {
            Ok(_) => self.record_success(idx),
            Err(_) => self.record_failure(idx),
        }
        result
    }

    fn record_success(&self, idx: usize) {
        let mut meta = self.endpoints[idx].meta.write().unwrap();
        meta.consecutive_failures = 0;
        if meta.health == EndpointHealth::Unhealthy {
            info!(url = %meta.url, "endpoint restored to healthy");
        }
        meta.health = EndpointHealth::Healthy;
        meta.last_checked = now_secs();
    }

    fn record_failure(&self, idx: usize) {
        let mut meta = self.endpoints[idx].meta.write().unwrap();
        meta.consecutive_failures += 1;
        meta.last_checked = now_secs();
        if meta.consecutive_failures >= 3 && meta.health == EndpointHealth::Healthy {
            meta.health = EndpointHealth::Unhealthy;
            warn!(url = %meta.url, failures = meta.consecutive_failures, "endpoint marked unhealthy");
        }
    }

    /// Lightweight health probe: a block-number read. Success restores
    /// health. Intended to be called on a timer after `unhealthyTimeoutMs`.
    pub async fn probe(&self, idx: usize) {
        let slot = &self.endpoints[idx];
        match slot.provider.get_block_number().await {
            Ok(_) => self.record_success(idx),
            Err(e) => {
                debug!(url = %self.url(idx), error = %e, "health probe failed");
                self.record_failure(idx);
            }
        }
    }

    /// Runs the periodic health-check loop for unhealthy endpoints. Intended
    /// to be spawned as one of the long-lived cooperative tasks.
    pub async fn run_health_check_loop(&self) {
        let interval = Duration::from_millis(self.settings.health_check_interval_ms);
        loop {
            tokio::time::sleep(interval).await;
            for idx in 0..self.endpoints.len() {
                if !self.is_healthy(idx) {
                    let elapsed_ms = {
                        let meta = self.endpoints[idx].meta.read().unwrap();
                        now_secs().saturating_sub(meta.last_checked) * 1000
                    };
                    if elapsed_ms >= self.settings.unhealthy_timeout_ms {
                        self.probe(idx).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(urls: &[&str]) -> RpcTransport {
        let urls: Vec<String> = urls.iter().map(|s| s.to_string()).collect();
        RpcTransport::new(&urls, RpcSettings::default()).unwrap()
    }

    #[test]
    fn empty_urls_is_config_invalid() {
        let result = RpcTransport::new(&[], RpcSettings::default());
        assert!(matches!(result, Err(EngineError::ConfigInvalid(_))));
    }

    #[test]
    fn round_robin_visits_each_endpoint() {
        let t = transport(&["http://a", "http://b", "http://c"]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            seen.insert(t.select_endpoint());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn three_consecutive_failures_marks_unhealthy() {
        let t = transport(&["http://a"]);
        assert!(t.is_healthy(0));
        t.record_failure(0);
        t.record_failure(0);
        assert!(t.is_healthy(0));
        t.record_failure(0);
        assert!(!t.is_healthy(0));
    }

    #[test]
    fn success_resets_failure_counter_and_health() {
        let t = transport(&["http://a"]);
        t.record_failure(0);
        t.record_failure(0);
        t.record_failure(0);
        assert!(!t.is_healthy(0));
        t.record_success(0);
        assert!(t.is_healthy(0));
        assert_eq!(t.endpoints[0].meta.read().unwrap().consecutive_failures, 0);
    }

    #[test]
    fn unhealthy_endpoint_is_skipped_by_selection() {
        let t = transport(&["http://a", "http://b"]);
        t.record_failure(0);
        t.record_failure(0);
        t.record_failure(0);
        assert!(!t.is_healthy(0));
        for _ in 0..4 {
            assert_eq!(t.select_endpoint(), 1);
        }
    }
}
