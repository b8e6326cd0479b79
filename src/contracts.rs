//! Centralized Contract Definitions
//!
//! Solidity interfaces for the direct-DEX routing sources and the
//! on-chain flash-loan arbitrage entry point, defined with alloy's
//! `sol!` macro. Each interface is annotated with `#[sol(rpc)]` so it can
//! make RPC calls via any alloy `Provider`.
//!
//! The arbitrage contract itself — and everything it does once called — is
//! an external collaborator; only its call signature lives here.

use alloy::sol;

// ── Uniswap V2 ───────────────────────────────────────────────────────
//
// Only the router is needed: direct-source quoting goes through
// `getAmountsOut` rather than reading factory/pair reserves and computing
// the constant-product formula locally.

sol! {
    #[sol(rpc)]
    interface IUniswapV2Router02 {
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
    }
}

// ── Uniswap V3 ───────────────────────────────────────────────────────
//
// Quoting goes through QuoterV2 only; swap execution calldata is built as a
// raw payload for the flash-loan executor contract rather than through
// ISwapRouter's own bindings (the executor's internals are out of scope).

sol! {
    #[sol(rpc)]
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params) external returns (uint256 amountOut, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate);
    }
}

// ── QuickSwap V3 (Algebra) ───────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface AlgebraPool {
        function globalState() external view returns (uint160 price, int24 tick, uint16 fee, uint16 timepointIndex, uint8 communityFeeToken0, uint8 communityFeeToken1, bool unlocked);
        function liquidity() external view returns (uint128);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    #[sol(rpc)]
    interface IAlgebraSwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 limitSqrtPrice;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }
}

sol! {
    #[sol(rpc)]
    interface IAlgebraQuoter {
        function quoteExactInputSingle(address tokenIn, address tokenOut, uint256 amountIn, uint160 limitSqrtPrice) external returns (uint256 amountOut, uint16 fee);
    }
}

// ── Flash-loan arbitrage entry point ──────────────────────────
//
// Signature matches the Transaction Builder's documented call shape:
// (tokens[], amounts[], aggregator addresses[], opaque swap payloads[],
// flashLoanAmount, minProfit). The receiving contract and its internal
// accounting are out of scope.

sol! {
    #[sol(rpc)]
    interface IFlashArbExecutor {
        function executeArbitrage(
            address[] calldata tokens,
            uint256[] calldata amounts,
            address[] calldata aggregators,
            bytes[] calldata swapPayloads,
            uint256 flashLoanAmount,
            uint256 minProfit
        ) external returns (uint256 profit);
    }
}
