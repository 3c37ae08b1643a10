//! EVM log decoding
//!
//! Schema-aware decoders for the two event shapes the monitors care about:
//! ERC-20 `Transfer` (direct payments) and Across SpokePool `FilledRelay`
//! (bridge fills, bytes32 variant — spec §4.C, §6).

use crate::hash::unpad_address;
use crate::types::EvmAddress;
use alloy::primitives::U256;
use alloy::rpc::types::Log;
use tracing::warn;

/// A decoded ERC-20 `Transfer(address indexed from, address indexed to, uint256 value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20Transfer {
    pub from: EvmAddress,
    pub to: EvmAddress,
    pub value: u128,
    pub block_number: u64,
    pub tx_hash: [u8; 32],
    pub log_index: u64,
}

/// Parse a log as an ERC-20 `Transfer` event.
///
/// `topics[1]` and `topics[2]` are 32-byte left-padded addresses (spec §6);
/// `value` is the sole non-indexed field.
pub fn parse_erc20_transfer(log: &Log) -> Option<Erc20Transfer> {
    let topics = log.topics();
    if topics.len() != 3 {
        return None;
    }

    let from = unpad_address(&topics[1].0);
    let to = unpad_address(&topics[2].0);

    let data = log.data().data.as_ref();
    if data.len() < 32 {
        return None;
    }
    let value = U256::from_be_slice(&data[..32]).try_into().unwrap_or_else(|_| {
        warn!("Transfer value exceeds u128::MAX, clamping");
        u128::MAX
    });

    Some(Erc20Transfer {
        from: EvmAddress(from),
        to: EvmAddress(to),
        value,
        block_number: log.block_number?,
        tx_hash: log.transaction_hash?.0,
        log_index: log.log_index?,
    })
}

/// A decoded Across v3 `FilledRelay` (bytes32 variant).
///
/// Address-shaped fields (`output_token`, `recipient`, `exclusive_relayer`,
/// `depositor`) are carried as bytes32 on-chain and right-aligned (spec §6);
/// only the 20-byte tail is meaningful for EVM-side comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledRelay {
    pub input_token: [u8; 32],
    pub output_token: [u8; 32],
    pub input_amount: u128,
    pub output_amount: u128,
    pub repayment_chain_id: u64,
    pub origin_chain_id: u64,
    pub deposit_id: U256,
    pub fill_deadline: u32,
    pub exclusivity_deadline: u32,
    pub exclusive_relayer: [u8; 32],
    pub relayer: [u8; 32],
    pub depositor: [u8; 32],
    pub recipient: [u8; 32],
    pub message_hash: [u8; 32],
    pub block_number: u64,
    pub tx_hash: [u8; 32],
    pub log_index: u64,
}

impl FilledRelay {
    pub fn recipient_evm_address(&self) -> EvmAddress {
        EvmAddress(unpad_address(&self.recipient))
    }

    pub fn output_token_evm_address(&self) -> EvmAddress {
        EvmAddress(unpad_address(&self.output_token))
    }
}

/// Parse a log as a SpokePool `FilledRelay` event (bytes32 variant).
///
/// Layout: `topics[1] = originChainId`, `topics[2] = depositId`,
/// `topics[3] = relayer`; all other fields are ABI-encoded in `data` in
/// declaration order (`inputToken, outputToken, inputAmount, outputAmount,
/// repaymentChainId, fillDeadline, exclusivityDeadline, exclusiveRelayer,
/// depositor, recipient, messageHash`, then the `relayExecutionInfo` tuple,
/// which this decoder does not need and ignores).
pub fn parse_spokepool_filled_relay(log: &Log) -> Option<FilledRelay> {
    let topics = log.topics();
    if topics.len() != 4 {
        return None;
    }

    let origin_chain_id: u64 = U256::from_be_slice(&topics[1].0).try_into().ok()?;
    let deposit_id = U256::from_be_slice(&topics[2].0);
    let relayer = topics[3].0;

    let data = log.data().data.as_ref();
    // 8 fixed 32-byte words before the fillDeadline/exclusivityDeadline pair,
    // which are each right-aligned uint32 in their own 32-byte word.
    if data.len() < 32 * 11 {
        return None;
    }

    let word = |i: usize| -> [u8; 32] {
        let mut b = [0u8; 32];
        b.copy_from_slice(&data[i * 32..(i + 1) * 32]);
        b
    };

    let input_token = word(0);
    let output_token = word(1);
    let input_amount: u128 = U256::from_be_bytes(word(2)).try_into().unwrap_or(u128::MAX);
    let output_amount: u128 = U256::from_be_bytes(word(3)).try_into().unwrap_or(u128::MAX);
    let repayment_chain_id: u64 = U256::from_be_bytes(word(4)).try_into().unwrap_or(u64::MAX);
    let fill_deadline_word = word(5);
    let fill_deadline = u32::from_be_bytes(fill_deadline_word[28..32].try_into().ok()?);
    let exclusivity_deadline_word = word(6);
    let exclusivity_deadline = u32::from_be_bytes(exclusivity_deadline_word[28..32].try_into().ok()?);
    let exclusive_relayer = word(7);
    let depositor = word(8);
    let recipient = word(9);
    let message_hash = word(10);

    Some(FilledRelay {
        input_token,
        output_token,
        input_amount,
        output_amount,
        repayment_chain_id,
        origin_chain_id,
        deposit_id,
        fill_deadline,
        exclusivity_deadline,
        exclusive_relayer,
        relayer,
        depositor,
        recipient,
        message_hash,
        block_number: log.block_number?,
        tx_hash: log.transaction_hash?.0,
        log_index: log.log_index?,
    })
}

/// The set of the current `FilledRelay(bytes32,...)` signature's topic0. Kept
/// as a canary per the bridge event-schema drift noted in the design notes:
/// the older `FilledV3Relay(address,...)` variant must never match this.
pub const FILLED_RELAY_TOPIC0_PREFIX: &str = "0x44b559f1";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::contracts::SpokePool;
    use alloy::sol_types::SolEvent;

    #[test]
    fn test_filled_relay_topic0_matches_canary() {
        let topic0 = SpokePool::FilledRelay::SIGNATURE_HASH;
        let hex = format!("0x{}", hex::encode(topic0.0));
        assert!(
            hex.starts_with(FILLED_RELAY_TOPIC0_PREFIX),
            "FilledRelay topic0 {} does not match expected canary {}",
            hex,
            FILLED_RELAY_TOPIC0_PREFIX
        );
    }

    #[test]
    fn test_word_extraction_is_32_byte_aligned() {
        // Sanity check on the manual ABI-word walk used by the decoder: 11
        // fixed words before the relayExecutionInfo tuple means the data
        // section must be at least 352 bytes for a well-formed event.
        assert_eq!(32 * 11, 352);
    }
}
