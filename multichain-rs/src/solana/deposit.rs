//! Across-protocol Solana `deposit` instruction
//!
//! The Solana SpokePool program exposes a non-standard Anchor instruction:
//! an 8-byte discriminator (spec §6: `sha256("global:deposit")[..8]`)
//! followed by the raw Borsh-encoded [`DepositParams`]. Account order is
//! exact and is not inferred from an IDL (spec §4.D.2).

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

/// Anchor discriminator for the `deposit` instruction: first 8 bytes of
/// `sha256("global:deposit")` (spec §6).
pub fn deposit_discriminator() -> [u8; 8] {
    let digest = Sha256::digest(b"global:deposit");
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// The exact parameter tuple carried by the `deposit` instruction and fed
/// into the delegate-PDA derivation (spec §4.D.2, §9).
///
/// Amount and EVM-address fields are kept as their on-wire byte shapes
/// rather than native integers so this struct's Borsh encoding is
/// byte-identical to what the on-chain program expects: `input_amount` /
/// `output_amount` are big-endian `uint256` (matching the EVM-side Across
/// representation), EVM address fields are 32-byte left-padded, and the two
/// deadlines plus `quote_timestamp` are little-endian `u32` (Borsh's native
/// integer encoding already matches this, so they stay as `u32`).
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DepositParams {
    pub depositor: [u8; 32],
    pub recipient: [u8; 32],
    pub input_token: [u8; 32],
    pub output_token: [u8; 32],
    pub input_amount: [u8; 32],
    pub output_amount: [u8; 32],
    pub destination_chain_id: u64,
    pub exclusive_relayer: [u8; 32],
    pub quote_timestamp: u32,
    pub fill_deadline: u32,
    pub exclusivity_deadline: u32,
    pub message: Vec<u8>,
}

impl DepositParams {
    /// Encode a `u128` amount as the big-endian 32-byte field the on-chain
    /// program expects.
    pub fn amount_bytes(amount: u128) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[16..].copy_from_slice(&amount.to_be_bytes());
        out
    }

    /// Left-pad a 20-byte EVM address into the 32-byte field layout.
    pub fn evm_address_bytes(addr: &[u8; 20]) -> [u8; 32] {
        crate::hash::left_pad_address(addr)
    }
}

/// Account metas for the raw `deposit` instruction, in the exact order the
/// program expects (spec §4.D.2):
/// `signer(w), state(w), delegate, depositor_ata(w), vault(w), mint,
/// token_program, associated_token_program, system_program,
/// event_authority, program`.
#[derive(Debug, Clone)]
pub struct DepositAccounts {
    pub signer: Pubkey,
    pub state: Pubkey,
    pub delegate: Pubkey,
    pub depositor_token_account: Pubkey,
    pub vault: Pubkey,
    pub mint: Pubkey,
    pub token_program: Pubkey,
    pub associated_token_program: Pubkey,
    pub system_program: Pubkey,
    pub event_authority: Pubkey,
    pub program: Pubkey,
}

/// Build the raw `deposit` instruction: 8-byte Anchor discriminator
/// followed by the Borsh-encoded [`DepositParams`], with accounts in the
/// exact order `DepositAccounts` dictates.
pub fn build_deposit_instruction(
    accounts: &DepositAccounts,
    params: &DepositParams,
) -> eyre::Result<Instruction> {
    let mut data = Vec::with_capacity(8 + 256);
    data.extend_from_slice(&deposit_discriminator());
    data.extend_from_slice(&borsh::to_vec(params)?);

    let account_metas = vec![
        AccountMeta::new(accounts.signer, true),
        AccountMeta::new(accounts.state, false),
        AccountMeta::new_readonly(accounts.delegate, false),
        AccountMeta::new(accounts.depositor_token_account, false),
        AccountMeta::new(accounts.vault, false),
        AccountMeta::new_readonly(accounts.mint, false),
        AccountMeta::new_readonly(accounts.token_program, false),
        AccountMeta::new_readonly(accounts.associated_token_program, false),
        AccountMeta::new_readonly(accounts.system_program, false),
        AccountMeta::new_readonly(accounts.event_authority, false),
        AccountMeta::new_readonly(accounts.program, false),
    ];

    Ok(Instruction {
        program_id: accounts.program,
        accounts: account_metas,
        data,
    })
}
