//! Solana chain adapter
//!
//! Everything the bridge pipeline monitor needs on the Solana side (spec
//! §4.C, §4.D.2): deposit-account balance polling, ATA/PDA derivation, the
//! `approveChecked` + raw Anchor instruction pair that make up the Across
//! `deposit` call, and poll-confirm submission.
//!
//! ## Submodules
//!
//! - `client` - `RpcClient` wrapper: token-account balance, poll-confirm send
//! - `pda` - ATA derivation and the `["delegate", keccak256(borsh(params))]` PDA
//! - `deposit` - the raw Anchor `deposit` instruction body and its discriminator

pub mod client;
pub mod deposit;
pub mod instructions;
pub mod pda;

pub use client::{SolanaClient, TokenAccountBalance, TxError};
pub use deposit::{build_deposit_instruction, deposit_discriminator, DepositAccounts, DepositParams};
pub use instructions::{build_approve, build_raw_instruction};
pub use pda::{derive_ata, derive_delegate_pda, derive_pda};
