//! HTTP swap-aggregator routing sources: 1inch, Paraswap, Odos.
//!
//! These are external collaborators — only their quote-request shape lives
//! here, translated into a uniform [`RouteQuote`](super::RouteQuote) via
//! `reqwest` + `serde`.

use crate::types::RoutingSource;
use alloy::primitives::{Address, U256};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct OneInchQuoteResponse {
    #[serde(rename = "dstAmount")]
    dst_amount: String,
    gas: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ParaswapPriceRoute {
    #[serde(rename = "destAmount")]
    dest_amount: String,
    #[serde(rename = "gasCost")]
    gas_cost: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParaswapQuoteResponse {
    #[serde(rename = "priceRoute")]
    price_route: ParaswapPriceRoute,
}

#[derive(Debug, Deserialize)]
struct OdosQuoteResponse {
    #[serde(rename = "outAmounts")]
    out_amounts: Vec<String>,
    #[serde(rename = "gasEstimate")]
    gas_estimate: Option<f64>,
    #[serde(rename = "pathId")]
    path_id: Option<String>,
}

pub async fn quote(
    client: &reqwest::Client,
    source: RoutingSource,
    from: Address,
    to: Address,
    amount_in: U256,
    timeout: Duration,
) -> Option<super::RouteQuote> {
    let result = match source {
        RoutingSource::OneInch => quote_oneinch(client, from, to, amount_in, timeout).await,
        RoutingSource::Paraswap => quote_paraswap(client, from, to, amount_in, timeout).await,
        RoutingSource::Odos => quote_odos(client, from, to, amount_in, timeout).await,
        _ => None,
    };
    if result.is_none() {
        debug!(?source, %from, %to, "http aggregator quote unavailable");
    }
    result
}

async fn quote_oneinch(
    client: &reqwest::Client,
    from: Address,
    to: Address,
    amount_in: U256,
    timeout: Duration,
) -> Option<super::RouteQuote> {
    let url = format!(
        "https://api.1inch.dev/swap/v6.0/8453/quote?src={from}&dst={to}&amount={amount_in}"
    );
    let resp: OneInchQuoteResponse = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()?;
    let amount_out = U256::from_str_radix(&resp.dst_amount, 10).ok()?;
    Some(super::RouteQuote {
        source: RoutingSource::OneInch,
        amount_in,
        amount_out,
        gas_estimate: resp.gas.unwrap_or(200_000),
        routing_payload: Vec::new(),
        price_impact: 0.0,
    })
}

async fn quote_paraswap(
    client: &reqwest::Client,
    from: Address,
    to: Address,
    amount_in: U256,
    timeout: Duration,
) -> Option<super::RouteQuote> {
    let url = format!(
        "https://apiv5.paraswap.io/prices?srcToken={from}&destToken={to}&amount={amount_in}&network=8453"
    );
    let resp: ParaswapQuoteResponse = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()?;
    let amount_out = U256::from_str_radix(&resp.price_route.dest_amount, 10).ok()?;
    let gas_estimate = resp
        .price_route
        .gas_cost
        .and_then(|g| g.parse::<u64>().ok())
        .unwrap_or(220_000);
    Some(super::RouteQuote {
        source: RoutingSource::Paraswap,
        amount_in,
        amount_out,
        gas_estimate,
        routing_payload: Vec::new(),
        price_impact: 0.0,
    })
}

async fn quote_odos(
    client: &reqwest::Client,
    from: Address,
    to: Address,
    amount_in: U256,
    timeout: Duration,
) -> Option<super::RouteQuote> {
    let body = serde_json::json!({
        "chainId": 8453,
        "inputTokens": [{"tokenAddress": from.to_string(), "amount": amount_in.to_string()}],
        "outputTokens": [{"tokenAddress": to.to_string(), "proportion": 1}],
    });
    let resp: OdosQuoteResponse = client
        .post("https://api.odos.xyz/sor/quote/v2")
        .timeout(timeout)
        .json(&body)
        .send()
        .await
        .ok()?
        .json()
        .await
        .ok()?;
    let amount_out = U256::from_str_radix(resp.out_amounts.first()?, 10).ok()?;
    Some(super::RouteQuote {
        source: RoutingSource::Odos,
        amount_in,
        amount_out,
        gas_estimate: resp.gas_estimate.unwrap_or(250_000.0) as u64,
        routing_payload: resp.path_id.unwrap_or_default().into_bytes(),
        price_impact: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oneinch_response_parses_dst_amount() {
        let raw = r#"{"dstAmount":"123456","gas":180000}"#;
        let parsed: OneInchQuoteResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.dst_amount, "123456");
        assert_eq!(parsed.gas, Some(180_000));
    }

    #[test]
    fn odos_response_parses_out_amounts() {
        let raw = r#"{"outAmounts":["999"],"gasEstimate":210000.0,"pathId":"abc"}"#;
        let parsed: OdosQuoteResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.out_amounts[0], "999");
        assert_eq!(parsed.path_id.as_deref(), Some("abc"));
    }
}
