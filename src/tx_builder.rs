//! Transaction Builder — assembles, signs, broadcasts, and tracks the
//! EIP-1559 transaction that calls the flash-loan arbitrage entry point.
//!
//! Dry-run-then-broadcast flow with an in-memory nonce counter, built on
//! `alloy`'s local signer.

use crate::contracts::IFlashArbExecutor;
use crate::error::EngineError;
use crate::gas_oracle::GasParameters;
use crate::transport::RpcTransport;
use crate::types::{now_secs, Opportunity, OpportunityKind, PendingTx};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// A broadcast is assumed stalled after this many seconds without a receipt.
const CONFIRMATION_TIMEOUT_SECS: u64 = 60;

pub struct TxBuilder {
    transport: std::sync::Arc<RpcTransport>,
    wallet: EthereumWallet,
    signer_address: Address,
    executor_contract: Address,
    chain_id: u64,
    max_gas_price_gwei: u64,
    next_nonce: AtomicU64,
    pending: DashMap<String, PendingTx>,
}

impl TxBuilder {
    pub fn new(
        transport: std::sync::Arc<RpcTransport>,
        signer: PrivateKeySigner,
        executor_contract: Address,
        chain_id: u64,
        max_gas_price_gwei: u64,
        starting_nonce: u64,
    ) -> Self {
        let signer_address = signer.address();
        Self {
            transport,
            wallet: EthereumWallet::from(signer),
            signer_address,
            executor_contract,
            chain_id,
            max_gas_price_gwei,
            next_nonce: AtomicU64::new(starting_nonce),
            pending: DashMap::new(),
        }
    }

    fn encode_call(&self, opportunity: &Opportunity, flash_loan_amount: U256, min_profit: U256) -> Bytes {
        let mut tokens = Vec::new();
        let mut aggregators = Vec::new();
        let mut amounts = Vec::new();
        let mut swap_payloads = Vec::new();
        for hop in &opportunity.hops {
            tokens.push(hop.from_token);
            amounts.push(hop.amount_in);
            aggregators.push(hop.to_token);
            swap_payloads.push(Bytes::from(hop.routing_payload.clone()));
        }
        let call = IFlashArbExecutor::executeArbitrageCall {
            tokens,
            amounts,
            aggregators,
            swapPayloads: swap_payloads,
            flashLoanAmount: flash_loan_amount,
            minProfit: min_profit,
        };
        Bytes::from(call.abi_encode())
    }

    /// `maxFeePerGas` must never exceed the configured ceiling,
    /// regardless of what the Gas Oracle recommends upstream.
    fn clamp_gas(&self, gas: GasParameters) -> Result<(u128, u128), EngineError> {
        if gas.max_fee_per_gas_gwei > self.max_gas_price_gwei as f64 {
            return Err(EngineError::GasTooHigh {
                actual_gwei: gas.max_fee_per_gas_gwei as u64,
                max_gwei: self.max_gas_price_gwei,
            });
        }
        let max_fee_wei = (gas.max_fee_per_gas_gwei * 1e9) as u128;
        let priority_fee_wei = (gas.max_priority_fee_per_gas_gwei * 1e9) as u128;
        Ok((max_fee_wei, priority_fee_wei))
    }

    /// Build and sign a transaction for `opportunity`, claiming the next
    /// nonce. Does not broadcast.
    pub async fn build_arbitrage(
        &self,
        opportunity: &Opportunity,
        gas: GasParameters,
        min_profit: U256,
    ) -> Result<(String, Vec<u8>, u64), EngineError> {
        let (max_fee_wei, priority_fee_wei) = self.clamp_gas(gas)?;
        let flash_loan_amount = opportunity.input_amount;
        let calldata = self.encode_call(opportunity, flash_loan_amount, min_profit);

        let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
        let gas_limit = gas.gas_limit;

        let request = TransactionRequest::default()
            .with_chain_id(self.chain_id)
            .with_from(self.signer_address)
            .with_to(self.executor_contract)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(max_fee_wei)
            .with_max_priority_fee_per_gas(priority_fee_wei)
            .with_input(calldata);

        let envelope = request
            .build(&self.wallet)
            .await
            .map_err(|e| EngineError::Internal(format!("signing failed: {e}")))?;
        let raw = envelope.encoded_2718();
        let tx_hash = format!("{:#x}", envelope.tx_hash());

        Ok((tx_hash, raw, nonce))
    }

    /// Broadcast a previously built transaction and register it in the
    /// pending set.
    pub async fn broadcast(
        &self,
        tx_hash: String,
        raw: Vec<u8>,
        nonce: u64,
        kind: OpportunityKind,
    ) -> Result<String, EngineError> {
        let raw_clone = raw.clone();
        self.transport
            .call(|provider| {
                let raw = raw_clone.clone();
                async move {
                    use alloy::providers::Provider;
                    provider
                        .send_raw_transaction(&raw)
                        .await
                        .map(|_| ())
                        .map_err(|e| EngineError::BroadcastFailed(e.to_string()))
                }
            })
            .await?;

        info!(%tx_hash, nonce, "broadcast arbitrage transaction");
        self.pending.insert(
            tx_hash.clone(),
            PendingTx {
                tx_hash: tx_hash.clone(),
                nonce,
                signed_payload: raw,
                opportunity_kind: kind,
                submit_time: now_secs(),
            },
        );
        Ok(tx_hash)
    }

    /// Re-broadcast a pending transaction at `multiplier`x the original gas
    /// price, reusing the same nonce.
    pub async fn replace(&self, old_hash: &str, multiplier: f64, gas: GasParameters) -> Result<String, EngineError> {
        let old = self
            .pending
            .get(old_hash)
            .map(|e| e.clone())
            .ok_or_else(|| EngineError::Internal(format!("no pending tx {old_hash} to replace")))?;

        let bumped = GasParameters {
            max_fee_per_gas_gwei: gas.max_fee_per_gas_gwei * multiplier,
            max_priority_fee_per_gas_gwei: gas.max_priority_fee_per_gas_gwei * multiplier,
            gas_limit: gas.gas_limit,
        };
        let (max_fee_wei, priority_fee_wei) = self.clamp_gas(bumped)?;

        let request = TransactionRequest::default()
            .with_chain_id(self.chain_id)
            .with_from(self.signer_address)
            .with_to(self.executor_contract)
            .with_nonce(old.nonce)
            .with_max_fee_per_gas(max_fee_wei)
            .with_max_priority_fee_per_gas(priority_fee_wei)
            .with_input(Bytes::new());

        let envelope = request
            .build(&self.wallet)
            .await
            .map_err(|e| EngineError::Internal(format!("re-signing failed: {e}")))?;
        let raw = envelope.encoded_2718();
        let new_hash = format!("{:#x}", envelope.tx_hash());

        self.pending.remove(old_hash);
        self.broadcast(new_hash.clone(), raw, old.nonce, old.opportunity_kind)
            .await?;
        Ok(new_hash)
    }

    /// Sweep pending transactions older than the confirmation timeout.
    /// Returns the hashes that timed out so the caller can decide to
    /// `replace` them.
    pub fn sweep_timeouts(&self) -> Vec<String> {
        let now = now_secs();
        let mut timed_out = Vec::new();
        for entry in self.pending.iter() {
            if now.saturating_sub(entry.submit_time) >= CONFIRMATION_TIMEOUT_SECS {
                timed_out.push(entry.tx_hash.clone());
            }
        }
        for hash in &timed_out {
            warn!(tx_hash = %hash, "pending transaction timed out");
        }
        timed_out
    }

    pub fn confirm(&self, tx_hash: &str) {
        self.pending.remove(tx_hash);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_gas_rejects_over_ceiling() {
        let transport = std::sync::Arc::new(
            RpcTransport::new(
                &["http://localhost:8545".to_string()],
                crate::config::RpcSettings::default(),
            )
            .unwrap(),
        );
        let signer = PrivateKeySigner::random();
        let builder = TxBuilder::new(transport, signer, Address::ZERO, 8453, 50, 0);
        let result = builder.clamp_gas(GasParameters {
            max_fee_per_gas_gwei: 100.0,
            max_priority_fee_per_gas_gwei: 2.0,
            gas_limit: 300_000,
        });
        assert!(matches!(result, Err(EngineError::GasTooHigh { .. })));
    }

    #[test]
    fn clamp_gas_accepts_within_ceiling() {
        let transport = std::sync::Arc::new(
            RpcTransport::new(
                &["http://localhost:8545".to_string()],
                crate::config::RpcSettings::default(),
            )
            .unwrap(),
        );
        let signer = PrivateKeySigner::random();
        let builder = TxBuilder::new(transport, signer, Address::ZERO, 8453, 50, 0);
        assert!(builder
            .clamp_gas(GasParameters {
                max_fee_per_gas_gwei: 10.0,
                max_priority_fee_per_gas_gwei: 1.0,
                gas_limit: 300_000,
            })
            .is_ok());
    }
}
