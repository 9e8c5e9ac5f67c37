//! Wire types and contract ABI for the ERC-3009 `exact` payment scheme.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

/// The scheme-specific payload carried in `PaymentPayload.payload`: the
/// EIP-712 signature plus the structured authorization it covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Payload {
    /// 65-byte EOA signature, hex-encoded with `0x` prefix.
    pub signature: String,
    /// The structured authorization that was signed.
    pub authorization: Eip3009Authorization,
}

/// EIP-712 structured data for an ERC-3009 `transferWithAuthorization` call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// The authorizing token owner.
    pub from: Address,
    /// The transfer recipient.
    pub to: Address,
    /// Amount in the token's smallest unit.
    pub value: U256,
    /// The authorization is not valid before this unix timestamp.
    pub valid_after: u64,
    /// The authorization expires at this unix timestamp.
    pub valid_before: u64,
    /// A unique 32-byte nonce preventing replay.
    pub nonce: B256,
}

/// Scheme-specific `extra` metadata attached to `PaymentRequirements`: the
/// EIP-712 domain parameters a client needs to sign correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    /// EIP-712 domain `name` (the token's on-chain name, usually).
    pub name: String,
    /// EIP-712 domain `version`.
    pub version: String,
}

sol!(
    /// Solidity-compatible struct mirroring the EIP-712 `TransferWithAuthorization`
    /// type; reconstructed identically on both client and facilitator so the
    /// signing hash and the verification hash agree.
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

#[cfg(feature = "facilitator")]
sol! {
    /// Minimal ERC-3009 + ERC-20 interface for USDC-style tokens. Only the
    /// functions the facilitator actually calls are declared.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEip3009Token {
        function name() external view returns (string);
        function version() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external;
    }
}
