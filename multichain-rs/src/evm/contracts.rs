//! EVM contract ABI definitions
//!
//! Uses alloy's `sol!` macro to generate type-safe bindings for the two
//! contracts Railclaw watches: the ERC-20 standard (direct payments) and the
//! Across v3 SpokePool (bridge fills, bytes32 variant — spec §6, §9).

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Standard ERC20 interface
    #[sol(rpc)]
    contract ERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }

    /// Across Protocol v3 SpokePool, "bytes32" event variant.
    ///
    /// Only the `FilledRelay` event is watched; Railclaw never calls into
    /// the SpokePool on the EVM side, it only observes fills.
    #[sol(rpc)]
    contract SpokePool {
        struct V3RelayExecutionEventInfo {
            bytes32 updatedRecipient;
            bytes32 updatedMessageHash;
            uint256 updatedOutputAmount;
            uint8 fillType;
        }

        event FilledRelay(
            bytes32 inputToken,
            bytes32 outputToken,
            uint256 inputAmount,
            uint256 outputAmount,
            uint256 repaymentChainId,
            uint256 indexed originChainId,
            uint256 indexed depositId,
            uint32 fillDeadline,
            uint32 exclusivityDeadline,
            bytes32 exclusiveRelayer,
            bytes32 indexed relayer,
            bytes32 depositor,
            bytes32 recipient,
            bytes32 messageHash,
            V3RelayExecutionEventInfo relayExecutionInfo
        );
    }
}
