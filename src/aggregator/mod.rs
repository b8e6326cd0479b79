//! Aggregator Client — fans a quote request out across direct DEX routers
//! and HTTP swap aggregators, caches responses briefly, and picks the best
//! route.

pub mod dex_sources;
pub mod http_sources;

use crate::transport::RpcTransport;
use crate::types::{now_secs, RoutingSource};
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// TTL for cached quotes: roughly 5 seconds.
pub const QUOTE_CACHE_TTL_SECS: u64 = 5;

/// A single route's quote for a fixed input amount.
#[derive(Debug, Clone)]
pub struct RouteQuote {
    pub source: RoutingSource,
    pub amount_in: U256,
    pub amount_out: U256,
    pub gas_estimate: u64,
    pub routing_payload: Vec<u8>,
    pub price_impact: f64,
}

#[derive(Clone)]
struct CachedQuote {
    quote: RouteQuote,
    fetched_at: u64,
}

/// Fetches and caches quotes across every configured routing source for a
/// token pair and amount.
pub struct AggregatorClient {
    cache: DashMap<(Address, Address, RoutingSource), CachedQuote>,
    sources: Vec<RoutingSource>,
    http_timeout: Duration,
    transport: Arc<RpcTransport>,
    http: reqwest::Client,
}

impl AggregatorClient {
    pub fn new(sources: Vec<RoutingSource>, http_timeout: Duration, transport: Arc<RpcTransport>) -> Self {
        Self {
            cache: DashMap::new(),
            sources,
            http_timeout,
            transport,
            http: reqwest::Client::new(),
        }
    }

    fn cached(&self, from: Address, to: Address, source: RoutingSource) -> Option<RouteQuote> {
        let key = (from, to, source);
        let entry = self.cache.get(&key)?;
        if now_secs().saturating_sub(entry.fetched_at) <= QUOTE_CACHE_TTL_SECS {
            Some(entry.quote.clone())
        } else {
            None
        }
    }

    fn store(&self, from: Address, to: Address, source: RoutingSource, quote: RouteQuote) {
        self.cache.insert(
            (from, to, source),
            CachedQuote {
                quote,
                fetched_at: now_secs(),
            },
        );
    }

    /// Quote one specific source, honoring the 5s cache.
    pub async fn quote(
        &self,
        from: Address,
        to: Address,
        amount_in: U256,
        source: RoutingSource,
    ) -> Option<RouteQuote> {
        if let Some(cached) = self.cached(from, to, source) {
            return Some(cached);
        }
        let quote = if source.is_direct_dex() {
            dex_sources::quote(&self.transport, source, from, to, amount_in).await
        } else {
            http_sources::quote(&self.http, source, from, to, amount_in, self.http_timeout).await
        }?;
        self.store(from, to, source, quote.clone());
        Some(quote)
    }

    /// Quote every configured source concurrently and return the best by
    /// `amount_out` among sources that returned a quote.
    pub async fn best_quote(
        &self,
        from: Address,
        to: Address,
        amount_in: U256,
    ) -> Option<RouteQuote> {
        let futs = self
            .sources
            .iter()
            .map(|source| self.quote(from, to, amount_in, *source));
        let quotes = futures::future::join_all(futs).await;
        quotes.into_iter().flatten().max_by_key(|q| q.amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn test_transport() -> Arc<RpcTransport> {
        Arc::new(
            RpcTransport::new(
                &["http://localhost:8545".to_string()],
                crate::config::RpcSettings::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn cache_expires_after_ttl() {
        let client = AggregatorClient::new(
            vec![RoutingSource::UniswapV3],
            Duration::from_secs(1),
            test_transport(),
        );
        let quote = RouteQuote {
            source: RoutingSource::UniswapV3,
            amount_in: U256::from(1u64),
            amount_out: U256::from(2u64),
            gas_estimate: 100_000,
            routing_payload: vec![],
            price_impact: 0.0,
        };
        client.store(addr(1), addr(2), RoutingSource::UniswapV3, quote);
        assert!(client.cached(addr(1), addr(2), RoutingSource::UniswapV3).is_some());
    }

    #[test]
    fn best_quote_picks_highest_amount_out() {
        let quotes = vec![
            RouteQuote {
                source: RoutingSource::UniswapV3,
                amount_in: U256::from(1u64),
                amount_out: U256::from(90u64),
                gas_estimate: 100_000,
                routing_payload: vec![],
                price_impact: 0.01,
            },
            RouteQuote {
                source: RoutingSource::OneInch,
                amount_in: U256::from(1u64),
                amount_out: U256::from(95u64),
                gas_estimate: 150_000,
                routing_payload: vec![],
                price_impact: 0.005,
            },
        ];
        let best = quotes.into_iter().max_by_key(|q| q.amount_out).unwrap();
        assert_eq!(best.source, RoutingSource::OneInch);
    }
}
