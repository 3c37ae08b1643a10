//! Multichain-RS: Shared EVM/Solana Chain Adapters for Railclaw
//!
//! This crate provides the uniform chain-adapter layer used by the
//! orchestrator and its monitors:
//!
//! - **Types** — shared primitives like `EvmAddress`, decimal-scaled amounts.
//! - **Hash** — keccak256 helpers for padding/unpadding addresses in logs.
//! - **EVM module** — RPC client, chunked log scanning, live subscription,
//!   ERC-20 / Across SpokePool event decoding.
//! - **Solana module** — ATA/PDA derivation, `approveChecked` + raw Anchor
//!   instruction building, poll-confirm submission.
//!
//! ## Feature Flags
//!
//! - `evm` - Enable EVM chain support (default)
//! - `solana` - Enable Solana chain support (default)
//! - `full` - Enable all features

pub mod address_codec;
pub mod hash;
pub mod types;

#[cfg(feature = "evm")]
pub mod evm;

#[cfg(feature = "solana")]
pub mod solana;

pub use address_codec::{encode_evm_address, parse_evm_address};
pub use hash::{keccak256, left_pad_address, unpad_address};
pub use types::{EvmAddress, ScaledAmount};
