//! Wire types for the Solana `exact` scheme's payload and requirement extras.

use serde::{Deserialize, Serialize};

#[cfg(any(feature = "client", feature = "facilitator"))]
use solana_signature::Signature;
#[cfg(any(feature = "client", feature = "facilitator"))]
use solana_signer::Signer;
#[cfg(any(feature = "client", feature = "facilitator"))]
use solana_transaction::versioned::VersionedTransaction;

/// `PaymentPayload.payload` for the Solana `exact` scheme: a base64-encoded,
/// payer-signed `VersionedTransaction` awaiting the facilitator's fee-payer
/// signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmExactPayload {
    /// Base64-encoded, bincode-serialized `VersionedTransaction`.
    pub transaction: String,
}

/// `PaymentRequirements.extra` for the Solana `exact` scheme: the
/// facilitator's fee-payer address, so the client knows whose signature
/// slot to leave open and which account to exclude funds-transfer checks
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    /// Base58-encoded fee-payer public key.
    pub fee_payer: String,
}

/// Signs `tx` with `signer`, placing the signature at the required-signer
/// slot matching `signer`'s pubkey and leaving every other slot as the
/// default (all-zero) signature.
///
/// Lets the payer and the fee payer sign the same transaction independently
/// of each other and in either order, which is how the payer's signature
/// survives the facilitator co-signing at settlement time.
///
/// # Errors
///
/// Returns an error string if `signer` is not one of the transaction's
/// required signers.
#[cfg(any(feature = "client", feature = "facilitator"))]
pub fn partial_sign(mut tx: VersionedTransaction, signer: &impl Signer) -> Result<VersionedTransaction, String> {
    let num_required = tx.message.header().num_required_signatures as usize;
    let static_keys = tx.message.static_account_keys();
    let position = static_keys[..num_required.min(static_keys.len())]
        .iter()
        .position(|key| *key == signer.pubkey())
        .ok_or("signer is not among this transaction's required signers")?;

    if tx.signatures.len() < num_required {
        tx.signatures.resize(num_required, Signature::default());
    }
    let message_bytes = tx.message.serialize();
    let signature = signer.try_sign_message(&message_bytes).map_err(|e| e.to_string())?;
    tx.signatures[position] = signature;
    Ok(tx)
}

/// `true` once every required-signer slot carries a non-default signature.
#[cfg(any(feature = "client", feature = "facilitator"))]
#[must_use]
pub fn is_fully_signed(tx: &VersionedTransaction) -> bool {
    let num_required = tx.message.header().num_required_signatures as usize;
    if tx.signatures.len() < num_required {
        return false;
    }
    tx.signatures.iter().take(num_required).all(|sig| *sig != Signature::default())
}
