//! Common types for cross-chain operations
//!
//! Shared primitives used across the EVM and Solana adapters and by the
//! orchestrator's amount-matching logic.

#![allow(dead_code)]

use eyre::{eyre, Result};
use std::fmt;

/// EVM address (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EvmAddress(pub [u8; 20]);

impl EvmAddress {
    /// Create from hex string (with or without 0x prefix)
    ///
    /// Accepts both 20-byte addresses (40 hex chars) and 32-byte padded addresses
    /// (64 hex chars). For 32-byte addresses, the first 12 bytes must be zeros
    /// and the last 20 bytes are extracted.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;

        match bytes.len() {
            20 => {
                let mut result = [0u8; 20];
                result.copy_from_slice(&bytes);
                Ok(EvmAddress(result))
            }
            32 => {
                if bytes[..12].iter().any(|&b| b != 0) {
                    return Err(eyre!(
                        "32-byte address has non-zero padding: expected 12 leading zero bytes"
                    ));
                }
                let mut result = [0u8; 20];
                result.copy_from_slice(&bytes[12..]);
                Ok(EvmAddress(result))
            }
            len => Err(eyre!(
                "EvmAddress must be 20 or 32 bytes, got {} bytes",
                len
            )),
        }
    }

    /// Convert to hex string with 0x prefix
    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Convert to bytes32 (left-padded with zeros)
    pub fn as_bytes32(&self) -> [u8; 32] {
        let mut result = [0u8; 32];
        result[12..].copy_from_slice(&self.0);
        result
    }

    /// Create from bytes32 (extract last 20 bytes)
    pub fn from_bytes32(bytes: &[u8; 32]) -> Self {
        let mut result = [0u8; 20];
        result.copy_from_slice(&bytes[12..]);
        EvmAddress(result)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

/// A token amount scaled by on-chain decimals, with the matching-tolerance
/// checks the direct and bridge monitors rely on (spec §4.D.1, §4.D.2).
///
/// `raw` is the base-unit amount (e.g. the `uint256` a `Transfer` log carries);
/// `decimals` is how many of those units make up one display unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScaledAmount {
    pub raw: u128,
    pub decimals: u8,
}

impl ScaledAmount {
    /// Parse a human-readable decimal amount string into base units.
    ///
    /// Mirrors `parse_units`: `"100.5"` at 6 decimals becomes `100_500_000`.
    /// Fractional digits beyond `decimals` are truncated, not rounded.
    pub fn parse_units(amount: &str, decimals: u8) -> Result<Self> {
        let (int_part, frac_part) = match amount.split_once('.') {
            Some((i, f)) => (i, f),
            None => (amount, ""),
        };

        let int_part = if int_part.is_empty() { "0" } else { int_part };
        let int_value: u128 = int_part
            .parse()
            .map_err(|_| eyre!("invalid integer part in amount {:?}", amount))?;

        let scale = decimals as usize;
        let mut frac_digits: String = frac_part.chars().take(scale).collect();
        while frac_digits.len() < scale {
            frac_digits.push('0');
        }
        let frac_value: u128 = if frac_digits.is_empty() {
            0
        } else {
            frac_digits
                .parse()
                .map_err(|_| eyre!("invalid fractional part in amount {:?}", amount))?
        };

        let base: u128 = 10u128
            .checked_pow(decimals as u32)
            .ok_or_else(|| eyre!("decimals {} too large", decimals))?;
        let raw = int_value
            .checked_mul(base)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(|| eyre!("amount {:?} overflows u128 at {} decimals", amount, decimals))?;

        Ok(Self { raw, decimals })
    }

    /// Build from an already-scaled raw amount.
    pub fn from_raw(raw: u128, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// `true` if `observed` falls within `[self.raw * low, self.raw * high]`.
    ///
    /// `low`/`high` are fractional multipliers, e.g. `(0.99, 1.10)` for the
    /// direct-payment tolerance band.
    pub fn observed_within(&self, observed: u128, low: f64, high: f64) -> bool {
        let lower = (self.raw as f64 * low).floor() as u128;
        let upper = (self.raw as f64 * high).ceil() as u128;
        observed >= lower && observed <= upper
    }
}

impl fmt::Display for ScaledAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (decimals={})", self.raw, self.decimals)
    }
}
