//! Token Registry — catalog of known tokens with price, decimals, and
//! liquidity estimates, plus a scam filter with advisory/strict enforcement
//! modes.

use crate::types::Token;
use alloy::primitives::Address;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::{info, warn};

/// Minimum aggregate liquidity (USD) for a token to be considered non-scam.
const MIN_LIQUIDITY_USD: f64 = 10_000.0;

/// Enforcement mode for the scam filter: "strict" rejects outright,
/// "advisory" flags but still admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScamFilterMode {
    /// Reject anything not explicitly known-good or passing the liquidity bar.
    Strict,
    /// Only reject tokens on the explicit blacklist.
    Advisory,
}

pub struct TokenRegistry {
    tokens: DashMap<Address, Token>,
    blacklist: DashMap<Address, String>,
    mode: ScamFilterMode,
}

impl TokenRegistry {
    pub fn new(mode: ScamFilterMode) -> Self {
        Self {
            tokens: DashMap::new(),
            blacklist: DashMap::new(),
            mode,
        }
    }

    /// Discover (or re-register) a token. Never destroys entries within a
    /// session lifecycle.
    pub fn upsert(&self, token: Token) {
        if !self.tokens.contains_key(&token.address) {
            info!(symbol = %token.symbol, address = %token.address, "discovered token");
        }
        self.tokens.insert(token.address, token);
    }

    pub fn get(&self, address: &Address) -> Option<Token> {
        self.tokens.get(address).map(|t| t.clone())
    }

    /// Refresh price/liquidity in place without touching other fields.
    pub fn refresh_market_data(&self, address: &Address, price_usd: f64, liquidity_usd: f64) {
        if let Some(mut entry) = self.tokens.get_mut(address) {
            entry.last_price_usd = price_usd;
            entry.last_liquidity_usd = liquidity_usd;
        }
    }

    pub fn blacklist(&self, address: Address, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%address, %reason, "token blacklisted");
        self.blacklist.insert(address, reason);
    }

    /// True iff the token is safe to route through, per the configured mode.
    pub fn is_safe(&self, address: &Address) -> bool {
        if self.blacklist.contains_key(address) {
            return false;
        }
        match self.mode {
            ScamFilterMode::Advisory => true,
            ScamFilterMode::Strict => self
                .tokens
                .get(address)
                .map(|t| t.is_base || t.is_stable || t.last_liquidity_usd >= MIN_LIQUIDITY_USD)
                .unwrap_or(false),
        }
    }

    pub fn base_tokens(&self) -> Vec<Token> {
        self.tokens
            .iter()
            .filter(|t| t.is_base)
            .map(|t| t.clone())
            .collect()
    }

    /// Top-N alt tokens by liquidity, deduplicated, above `min_liquidity_usd`.
    pub fn top_alt_tokens_by_liquidity(&self, n: usize, min_liquidity_usd: f64) -> Vec<Token> {
        let mut seen = HashSet::new();
        let mut alts: Vec<Token> = self
            .tokens
            .iter()
            .filter(|t| !t.is_base && t.last_liquidity_usd >= min_liquidity_usd)
            .filter(|t| seen.insert(t.address))
            .map(|t| t.clone())
            .collect();
        alts.sort_by(|a, b| {
            b.last_liquidity_usd
                .partial_cmp(&a.last_liquidity_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        alts.truncate(n);
        alts
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

    #[test]
    fn strict_mode_rejects_low_liquidity_token() {
        let registry = TokenRegistry::new(ScamFilterMode::Strict);
        let mut token = Token::new(addr(1), "SCAM", 18);
        token.last_liquidity_usd = 100.0;
        registry.upsert(token);
        assert!(!registry.is_safe(&addr(1)));
    }

    #[test]
    fn strict_mode_accepts_base_token_regardless_of_liquidity() {
        let registry = TokenRegistry::new(ScamFilterMode::Strict);
        let mut token = Token::new(addr(1), "WETH", 18);
        token.is_base = true;
        token.last_liquidity_usd = 0.0;
        registry.upsert(token);
        assert!(registry.is_safe(&addr(1)));
    }

    #[test]
    fn blacklist_always_wins() {
        let registry = TokenRegistry::new(ScamFilterMode::Advisory);
        let mut token = Token::new(addr(1), "OK", 18);
        token.is_base = true;
        registry.upsert(token);
        assert!(registry.is_safe(&addr(1)));
        registry.blacklist(addr(1), "rugpull reported");
        assert!(!registry.is_safe(&addr(1)));
    }

    #[test]
    fn top_alt_tokens_sorted_and_deduped() {
        let registry = TokenRegistry::new(ScamFilterMode::Advisory);
        for (i, liq) in [(1u8, 50_000.0), (2, 200_000.0), (3, 5_000.0)] {
            let mut t = Token::new(addr(i), format!("T{i}"), 18);
            t.last_liquidity_usd = liq;
            registry.upsert(t);
        }
        let top = registry.top_alt_tokens_by_liquidity(2, 10_000.0);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].symbol, "T2");
        assert_eq!(top[1].symbol, "T1");
    }
}
