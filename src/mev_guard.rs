//! MEV Guard — watches the mempool for adversarial activity and vetoes
//! opportunities that look unsafe to submit.
//!
//! A single dedicated task owns the pending-transaction subscription and
//! reconnects on drop, fanning decoded transactions out over a bounded
//! channel rather than having each consumer subscribe independently.

use crate::error::EngineError;
use crate::transport::RpcTransport;
use crate::types::{now_secs, Opportunity};
use alloy::consensus::Transaction as TransactionTrait;
use alloy::network::TransactionResponse;
use alloy::primitives::Address;
use alloy::providers::Provider;
use dashmap::DashSet;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How long a pending transaction stays in the sliding window before it is
/// assumed mined or dropped.
const WINDOW_RETENTION_SECS: u64 = 30;

/// Observed pending transaction, decoded just enough to classify it.
#[derive(Debug, Clone)]
pub struct ObservedTx {
    pub hash: String,
    pub from: Address,
    pub touches: Vec<Address>,
    pub gas_price_gwei: f64,
    pub seen_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Sandwich,
    Frontrun,
    Backrun,
    Unrelated,
}

fn classify(tx: &ObservedTx, opportunity_tokens: &[Address]) -> Classification {
    let overlap = tx
        .touches
        .iter()
        .filter(|t| opportunity_tokens.contains(t))
        .count();
    if overlap == 0 {
        Classification::Unrelated
    } else if overlap >= 2 {
        Classification::Sandwich
    } else {
        Classification::Frontrun
    }
}

/// Sliding window of recently observed pending transactions, consumed by the
/// veto checks below. Populated by the single dedicated mempool subscriber
/// task via [`MevGuard::ingest`].
pub struct MevGuard {
    window: RwLock<VecDeque<ObservedTx>>,
    blacklist: DashSet<Address>,
}

impl MevGuard {
    pub fn new() -> Self {
        Self {
            window: RwLock::new(VecDeque::new()),
            blacklist: DashSet::new(),
        }
    }

    pub fn blacklist(&self, address: Address) {
        warn!(%address, "address blacklisted by MEV guard");
        self.blacklist.insert(address);
    }

    /// Record one observed transaction and evict anything past retention.
    pub fn ingest(&self, tx: ObservedTx) {
        let mut window = self.window.write().unwrap();
        let now = now_secs();
        while let Some(front) = window.front() {
            if now.saturating_sub(front.seen_at) > WINDOW_RETENTION_SECS {
                window.pop_front();
            } else {
                break;
            }
        }
        window.push_back(tx);
    }

    fn tokens_in_window_touching(&self, tokens: &[Address]) -> Vec<ObservedTx> {
        self.window
            .read()
            .unwrap()
            .iter()
            .filter(|tx| tx.touches.iter().any(|t| tokens.contains(t)))
            .cloned()
            .collect()
    }

    /// Run the four vetoes (mempool competition, gas safety, sandwich
    /// vulnerability, timing) against an opportunity. Returns the first veto
    /// triggered, if any.
    pub fn check(&self, opportunity: &Opportunity, own_gas_price_gwei: f64) -> Result<(), EngineError> {
        let tokens: Vec<Address> = opportunity
            .hops
            .iter()
            .flat_map(|h| [h.from_token, h.to_token])
            .collect();

        if tokens
            .iter()
            .any(|t| self.blacklist.contains(t))
        {
            return Err(EngineError::MevVeto("route touches blacklisted address".into()));
        }

        let competing = self.tokens_in_window_touching(&tokens);

        // Veto 1: mempool competition — another pending tx on the same pair.
        if competing.len() >= 3 {
            return Err(EngineError::MevVeto(format!(
                "{} competing pending transactions on this route",
                competing.len()
            )));
        }

        // Veto 2: gas safety — someone else is already bidding above us.
        if competing.iter().any(|tx| tx.gas_price_gwei > own_gas_price_gwei) {
            return Err(EngineError::MevVeto(
                "competing transaction outbids our gas price".into(),
            ));
        }

        // Veto 3: sandwich vulnerability — classify each competitor.
        for tx in &competing {
            if classify(tx, &tokens) == Classification::Sandwich {
                return Err(EngineError::MevVeto(format!(
                    "sandwich-shaped transaction {} detected on route",
                    tx.hash
                )));
            }
        }

        // Veto 4: timing — opportunity too close to its own deadline to be
        // safely raced against mempool competitors.
        let now = now_secs();
        if opportunity.deadline.saturating_sub(now) < 2 {
            return Err(EngineError::MevVeto("opportunity too close to deadline".into()));
        }

        Ok(())
    }
}

impl Default for MevGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconnect backoff between subscription attempts.
const RECONNECT_DELAY_SECS: u64 = 5;

/// Spawns the single dedicated mempool subscriber task: subscribes to
/// pending transaction hashes via the RPC transport's pubsub-capable
/// provider, decodes just enough of each transaction to classify it, and
/// fans the result out over `tx`. Reconnects with a fixed backoff whenever
/// the provider or the subscription itself drops.
pub async fn run_mempool_subscriber(
    transport: Arc<RpcTransport>,
    tx: mpsc::Sender<ObservedTx>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        info!("mempool subscriber (re)connecting");

        let provider = match transport.call(|provider| async move { Ok(provider) }).await {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "mempool subscriber could not acquire a provider");
                if wait_or_shutdown(&mut shutdown).await {
                    return;
                }
                continue;
            }
        };

        let poller = match provider.watch_pending_transactions().await {
            Ok(poller) => poller,
            Err(e) => {
                warn!(error = %e, "pending transaction subscription failed");
                if wait_or_shutdown(&mut shutdown).await {
                    return;
                }
                continue;
            }
        };

        let mut hashes = poller.into_stream().flat_map(futures::stream::iter);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                next = hashes.next() => {
                    let Some(hash) = next else {
                        warn!("pending transaction stream ended, reconnecting");
                        break;
                    };
                    let Ok(Some(pending)) = provider.get_transaction_by_hash(hash).await else {
                        continue;
                    };
                    let observed = ObservedTx {
                        hash: format!("{:#x}", pending.tx_hash()),
                        from: pending.from(),
                        touches: pending.to().into_iter().collect(),
                        gas_price_gwei: TransactionTrait::gas_price(&pending)
                            .map(|gp| gp as f64 / 1e9)
                            .unwrap_or(0.0),
                        seen_at: now_secs(),
                    };
                    if tx.send(observed).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Waits out the reconnect backoff, or returns `true` if shutdown fired
/// first.
async fn wait_or_shutdown(shutdown: &mut tokio::sync::watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Hop, OpportunityKind, RoutingSource};
    use alloy::primitives::U256;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn opp(from: Address, to: Address) -> Opportunity {
        Opportunity {
            kind: OpportunityKind::Triangular,
            hops: vec![Hop {
                from_token: from,
                to_token: to,
                amount_in: U256::from(1u64),
                min_amount_out: U256::from(1u64),
                source: RoutingSource::UniswapV3,
                routing_payload: vec![],
                gas_estimate: 100_000,
                price_impact: 0.0,
            }],
            input_amount: U256::from(1u64),
            expected_output: U256::from(1u64),
            expected_gross_profit_usd: 10.0,
            deadline: now_secs() + 30,
            z_score: None,
            created_at: now_secs(),
        }
    }

    #[test]
    fn blacklisted_token_is_vetoed() {
        let guard = MevGuard::new();
        let (a, b) = (addr(1), addr(2));
        guard.blacklist(a);
        assert!(guard.check(&opp(a, b), 1.0).is_err());
    }

    #[test]
    fn clean_opportunity_passes() {
        let guard = MevGuard::new();
        let (a, b) = (addr(1), addr(2));
        assert!(guard.check(&opp(a, b), 1.0).is_ok());
    }

    #[test]
    fn outbid_by_competitor_is_vetoed() {
        let guard = MevGuard::new();
        let (a, b) = (addr(1), addr(2));
        guard.ingest(ObservedTx {
            hash: "0xabc".into(),
            from: addr(9),
            touches: vec![a],
            gas_price_gwei: 100.0,
            seen_at: now_secs(),
        });
        assert!(guard.check(&opp(a, b), 1.0).is_err());
    }

    #[test]
    fn timing_veto_near_deadline() {
        let guard = MevGuard::new();
        let (a, b) = (addr(1), addr(2));
        let mut o = opp(a, b);
        o.deadline = now_secs();
        assert!(guard.check(&o, 1.0).is_err());
    }
}
