//! Generic instruction builders named directly after the spec's adapter
//! contract (§4.C): `build_approve` for the SPL `approveChecked` call, and
//! `build_raw_instruction` for the bridge's non-standard Anchor instruction
//! body (used instead of a generated binding since the program has no
//! published IDL this crate consumes).

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

/// Build an SPL Token `approveChecked` instruction granting `delegate`
/// authority to spend `amount` of `mint` (at `decimals`) from `source`, on
/// `owner`'s behalf.
pub fn build_approve(
    source: &Pubkey,
    mint: &Pubkey,
    delegate: &Pubkey,
    owner: &Pubkey,
    amount: u64,
    decimals: u8,
) -> eyre::Result<Instruction> {
    let ix = spl_token::instruction::approve_checked(
        &spl_token::id(),
        source,
        mint,
        delegate,
        owner,
        &[],
        amount,
        decimals,
    )?;
    Ok(ix)
}

/// Build an arbitrary instruction from a raw account list and data payload.
/// Every account is passed through as given; callers decide signer/writable
/// flags up front since this helper has no schema to infer them from.
pub fn build_raw_instruction(program: Pubkey, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Instruction {
    Instruction {
        program_id: program,
        accounts,
        data,
    }
}
