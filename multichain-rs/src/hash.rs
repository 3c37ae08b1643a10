//! Keccak hashing and EVM address padding helpers
//!
//! Shared by the delegate-PDA derivation (spec §4.D.2, §9) and the ERC-20 /
//! SpokePool log decoders in [`crate::evm::events`].

use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Left-pad a 20-byte EVM address into a 32-byte log topic / bytes32 field.
pub fn left_pad_address(addr: &[u8; 20]) -> [u8; 32] {
    let mut result = [0u8; 32];
    result[12..32].copy_from_slice(addr);
    result
}

/// Extract the right-aligned 20-byte address from a 32-byte topic or field.
///
/// Across v3's `FilledRelay` (bytes32 variant) and ERC-20 `Transfer` topics
/// both right-align addresses this way (spec §6).
pub fn unpad_address(bytes: &[u8; 32]) -> [u8; 20] {
    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes[12..32]);
    result
}

/// Convert 32 bytes to a hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_known_vector() {
        let result = keccak256(b"hello");
        assert_eq!(
            bytes32_to_hex(&result),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_pad_unpad_roundtrip() {
        let addr: [u8; 20] = [
            0xf3, 0x9F, 0xd6, 0xe5, 0x1a, 0xad, 0x88, 0xF6, 0xF4, 0xce, 0x6a, 0xB8, 0x82, 0x72,
            0x79, 0xcf, 0xfF, 0xb9, 0x22, 0x66,
        ];

        let padded = left_pad_address(&addr);
        assert_eq!(&padded[0..12], &[0u8; 12]);
        assert_eq!(unpad_address(&padded), addr);
    }
}
