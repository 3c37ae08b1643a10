//! EVM chain adapter
//!
//! Read-only RPC access to EVM chains: block height, chunked log scans, a
//! live log subscription, and schema-aware decoders for the two event
//! shapes the monitors watch (spec §4.C).
//!
//! ## Submodules
//!
//! - `client` - chunked `get_logs`, receipts, live subscription with
//!   polling fallback
//! - `contracts` - ERC-20 and Across SpokePool bindings via alloy's `sol!`
//! - `events` - `Transfer` / `FilledRelay` decoders
//! - `tokens` - decimals lookup with the spec's default-6 fallback

pub mod client;
pub mod contracts;
pub mod events;
pub mod tokens;
pub mod watcher;

pub use client::{EvmClient, LogFilterParams, NativeTransfer};
pub use contracts::{ERC20, SpokePool};
pub use events::{parse_erc20_transfer, parse_spokepool_filled_relay, Erc20Transfer, FilledRelay};
pub use watcher::{EvmWatcher, HistoricalSweepOutcome};
