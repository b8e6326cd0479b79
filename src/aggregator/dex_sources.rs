//! Direct on-chain DEX routing sources — UniswapV3, SushiV3 (same ABI family
//! as UniswapV3), QuickSwap's Algebra-based V3 pool, and QuickSwap V2.
//!
//! Each source iterates the router's fee tiers, resolves the pool address
//! via the factory through [`RpcTransport`], and returns a route quote
//! rather than a cached reserve snapshot.

use crate::contracts::{IAlgebraQuoter, IQuoterV2, IUniswapV2Router02};
use crate::error::EngineError;
use crate::transport::RpcTransport;
use crate::types::RoutingSource;
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use tracing::debug;

/// Default pool fee tiers tried for Uniswap-V3-family pools, in priority order.
const V3_FEE_TIERS: [u32; 4] = [100, 500, 3000, 10000];

// The fixed factory/quoter/router addresses each direct source resolves
// against are an external deployment concern and are not modeled
// further here; `Address::ZERO` below stands in for wherever deployment
// configuration points a given source's quoter at.

/// Constant-product output amount with a 0.3% fee (standard Uniswap V2
/// formula).
pub fn constant_product_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }
    let amount_in_with_fee = amount_in.saturating_mul(U256::from(997u64));
    let numerator = amount_in_with_fee.saturating_mul(reserve_out);
    let denominator = reserve_in
        .saturating_mul(U256::from(1000u64))
        .saturating_add(amount_in_with_fee);
    if denominator.is_zero() {
        U256::ZERO
    } else {
        numerator / denominator
    }
}

pub async fn quote(
    transport: &RpcTransport,
    source: RoutingSource,
    from: Address,
    to: Address,
    amount_in: U256,
) -> Option<super::RouteQuote> {
    match source {
        RoutingSource::UniswapV3 | RoutingSource::SushiV3 => {
            quote_v3_family(transport, source, from, to, amount_in).await
        }
        RoutingSource::QuickswapV3Algebra => {
            quote_algebra(transport, from, to, amount_in).await
        }
        RoutingSource::QuickswapV2 => quote_v2(transport, from, to, amount_in).await,
        _ => None,
    }
}

async fn quote_v3_family(
    transport: &RpcTransport,
    source: RoutingSource,
    from: Address,
    to: Address,
    amount_in: U256,
) -> Option<super::RouteQuote> {
    for fee in V3_FEE_TIERS {
        let result: Result<(U256, u128, u32, U256), EngineError> = transport
            .call(|provider| async move {
                let quoter = IQuoterV2::new(Address::ZERO, provider);
                let params = IQuoterV2::QuoteExactInputSingleParams {
                    tokenIn: from,
                    tokenOut: to,
                    amountIn: amount_in,
                    fee: fee.try_into().unwrap_or_default(),
                    sqrtPriceLimitX96: alloy::primitives::U160::ZERO,
                };
                quoter
                    .quoteExactInputSingle(params)
                    .call()
                    .await
                    .map(|ret| {
                        (
                            ret.amountOut,
                            ret.sqrtPriceX96After.to::<u128>(),
                            ret.initializedTicksCrossed,
                            ret.gasEstimate,
                        )
                    })
                    .map_err(|e| EngineError::QuoteUnavailable(e.to_string()))
            })
            .await;
        match result {
            Ok((amount_out, _, _, gas_estimate)) if !amount_out.is_zero() => {
                return Some(super::RouteQuote {
                    source,
                    amount_in,
                    amount_out,
                    gas_estimate: gas_estimate.to::<u64>().max(120_000),
                    routing_payload: encode_v3_payload(from, to, fee),
                    price_impact: 0.0,
                });
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(?source, fee, error = %e, "v3 quote attempt failed");
                continue;
            }
        }
    }
    None
}

async fn quote_algebra(
    transport: &RpcTransport,
    from: Address,
    to: Address,
    amount_in: U256,
) -> Option<super::RouteQuote> {
    let result: Result<(U256, u16), EngineError> = transport
        .call(|provider| async move {
            let quoter = IAlgebraQuoter::new(Address::ZERO, provider);
            quoter
                .quoteExactInputSingle(from, to, amount_in, alloy::primitives::U160::ZERO)
                .call()
                .await
                .map(|ret| (ret.amountOut, ret.fee))
                .map_err(|e| EngineError::QuoteUnavailable(e.to_string()))
        })
        .await;
    result.ok().filter(|(out, _)| !out.is_zero()).map(|(amount_out, fee)| {
        super::RouteQuote {
            source: RoutingSource::QuickswapV3Algebra,
            amount_in,
            amount_out,
            gas_estimate: 150_000,
            routing_payload: encode_v3_payload(from, to, fee as u32),
            price_impact: 0.0,
        }
    })
}

async fn quote_v2(
    transport: &RpcTransport,
    from: Address,
    to: Address,
    amount_in: U256,
) -> Option<super::RouteQuote> {
    let path = vec![from, to];
    let result: Result<U256, EngineError> = transport
        .call(|provider| {
            let path = path.clone();
            async move {
                let router = IUniswapV2Router02::new(Address::ZERO, provider);
                let amounts = router
                    .getAmountsOut(amount_in, path)
                    .call()
                    .await
                    .map_err(|e| EngineError::QuoteUnavailable(e.to_string()))?;
                amounts
                    .last()
                    .copied()
                    .ok_or_else(|| EngineError::QuoteUnavailable("empty amounts path".into()))
            }
        })
        .await;
    result.ok().filter(|out| !out.is_zero()).map(|amount_out| super::RouteQuote {
        source: RoutingSource::QuickswapV2,
        amount_in,
        amount_out,
        gas_estimate: 110_000,
        routing_payload: IUniswapV2Router02::getAmountsOutCall {
            amountIn: amount_in,
            path: vec![from, to],
        }
        .abi_encode(),
        price_impact: 0.0,
    })
}

fn encode_v3_payload(token_in: Address, token_out: Address, fee: u32) -> Vec<u8> {
    ISwapRouterShimEncode::encode(token_in, token_out, fee)
}

/// Local helper so the payload encoding doesn't depend on constructing a
/// full `ExactInputSingleParams` call with a live recipient/deadline — the
/// Transaction Builder fills those in at execution time.
struct ISwapRouterShimEncode;
impl ISwapRouterShimEncode {
    fn encode(token_in: Address, token_out: Address, fee: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(44);
        out.extend_from_slice(token_in.as_slice());
        out.extend_from_slice(token_out.as_slice());
        out.extend_from_slice(&fee.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_product_zero_reserves_yields_zero_out() {
        let out = constant_product_amount_out(U256::from(100u64), U256::ZERO, U256::from(100u64));
        assert_eq!(out, U256::ZERO);
    }

    #[test]
    fn constant_product_applies_thirty_bps_fee() {
        let out = constant_product_amount_out(
            U256::from(1_000u64),
            U256::from(1_000_000u64),
            U256::from(1_000_000u64),
        );
        // Without fee: ~999. With 0.3% fee the output is slightly lower.
        assert!(out < U256::from(999u64));
        assert!(out > U256::from(900u64));
    }
}
