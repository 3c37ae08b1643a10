//! ERC-20 token queries
//!
//! Decimals lookups feed the amount-matching tolerance band in the direct
//! monitor (spec §4.D.1): "decimals come from the token's on-chain
//! `decimals()`, defaulting to 6 on failure."

use crate::evm::contracts::ERC20;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use eyre::Result;
use tracing::warn;

/// The documented fallback when `decimals()` cannot be read.
pub const DEFAULT_DECIMALS: u8 = 6;

/// Get the ERC20 token balance of an address
pub async fn get_token_balance<P: Provider>(
    provider: &P,
    token_address: Address,
    account: Address,
) -> Result<U256> {
    let contract = ERC20::new(token_address, provider);
    let balance = contract.balanceOf(account).call().await?;
    Ok(balance._0)
}

/// Get token decimals, never failing: falls back to [`DEFAULT_DECIMALS`] on
/// any RPC or ABI error, logging a warning so the fallback is visible.
pub async fn get_decimals_or_default<P: Provider>(provider: &P, token_address: Address) -> u8 {
    let contract = ERC20::new(token_address, provider);
    match contract.decimals().call().await {
        Ok(result) => result._0,
        Err(err) => {
            warn!(
                token = %token_address,
                error = %err,
                default = DEFAULT_DECIMALS,
                "decimals() call failed, using default"
            );
            DEFAULT_DECIMALS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_decimals_is_six() {
        assert_eq!(DEFAULT_DECIMALS, 6);
    }
}
