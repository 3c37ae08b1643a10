//! ATA and PDA derivation
//!
//! `derive_ata` is a pure function of `(owner, mint)` (spec §8 invariant 6);
//! `derive_delegate_pda` must match the on-chain program's derivation for
//! the same `DepositParams` tuple (spec §9: test against a published vector
//! before integration).

use crate::solana::deposit::DepositParams;
use eyre::Result;
use solana_sdk::pubkey::Pubkey;

/// Derive the associated token account for `(owner, mint)`. Works off-curve
/// for PDA owners (e.g. the deposit account owned by a disposable keypair is
/// still a normal on-curve wallet, but the SpokePool `state`/`vault` ATAs are
/// owned by PDAs).
pub fn derive_ata(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(owner, mint)
}

/// Generic `find_program_address` wrapper.
pub fn derive_pda(program: &Pubkey, seeds: &[&[u8]]) -> (Pubkey, u8) {
    Pubkey::find_program_address(seeds, program)
}

/// Derive the delegate PDA that is granted `approveChecked` authority over
/// the depositor's input token account.
///
/// Seeds: `["delegate", keccak256(borsh(deposit_params))]` (spec §4.D.2,
/// §9). `deposit_params` must be byte-identical to what the deposit
/// instruction itself carries, or the two derivations diverge silently.
pub fn derive_delegate_pda(program: &Pubkey, params: &DepositParams) -> Result<(Pubkey, u8)> {
    let encoded = borsh::to_vec(params)?;
    let digest = crate::hash::keccak256(&encoded);
    Ok(derive_pda(program, &[b"delegate", &digest]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_derive_ata_is_pure() {
        let owner = Pubkey::from_str("11111111111111111111111111111111").unwrap();
        let mint = Pubkey::from_str("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v").unwrap();
        let a = derive_ata(&owner, &mint);
        let b = derive_ata(&owner, &mint);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_ata_differs_per_owner() {
        let owner1 = Pubkey::from_str("11111111111111111111111111111111").unwrap();
        let owner2 = Pubkey::new_unique();
        let mint = Pubkey::from_str("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v").unwrap();
        assert_ne!(derive_ata(&owner1, &mint), derive_ata(&owner2, &mint));
    }

    fn sample_params() -> DepositParams {
        DepositParams {
            depositor: [1u8; 32],
            recipient: [2u8; 32],
            input_token: [3u8; 32],
            output_token: [4u8; 32],
            input_amount: DepositParams::amount_bytes(1_000_000),
            output_amount: DepositParams::amount_bytes(990_000),
            destination_chain_id: 42161,
            exclusive_relayer: [0u8; 32],
            quote_timestamp: 1_700_000_000,
            fill_deadline: 1_700_020_000,
            exclusivity_deadline: 0,
            message: vec![],
        }
    }

    #[test]
    fn test_delegate_pda_deterministic() {
        let program = Pubkey::new_unique();
        let params = sample_params();
        let (a, bump_a) = derive_delegate_pda(&program, &params).unwrap();
        let (b, bump_b) = derive_delegate_pda(&program, &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(bump_a, bump_b);
    }

    #[test]
    fn test_delegate_pda_sensitive_to_output_amount() {
        let program = Pubkey::new_unique();
        let mut params = sample_params();
        let (a, _) = derive_delegate_pda(&program, &params).unwrap();
        params.output_amount = DepositParams::amount_bytes(990_001);
        let (b, _) = derive_delegate_pda(&program, &params).unwrap();
        assert_ne!(a, b);
    }
}
