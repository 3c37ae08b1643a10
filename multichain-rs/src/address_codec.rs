//! EVM address parsing and formatting
//!
//! Addresses on the settlement side of Railclaw are always 20-byte EVM
//! addresses; this module is the single place that turns hex strings into
//! raw bytes and back.

use eyre::{eyre, Result};

/// Parse a 0x-prefixed hex EVM address to 20 bytes
pub fn parse_evm_address(addr: &str) -> Result<[u8; 20]> {
    let hex_str = addr.strip_prefix("0x").unwrap_or(addr);

    if hex_str.len() != 40 {
        return Err(eyre!(
            "Invalid EVM address length: expected 40 hex chars, got {}",
            hex_str.len()
        ));
    }

    let bytes = hex::decode(hex_str)?;

    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);
    Ok(result)
}

/// Encode 20 bytes to EVM hex string with 0x prefix
pub fn encode_evm_address(bytes: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(bytes))
}
