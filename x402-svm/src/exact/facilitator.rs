//! Facilitator-side verification and settlement for the Solana `exact` scheme.
//!
//! The payer pre-signs a `TransferChecked` transaction naming the
//! facilitator as fee payer; the facilitator validates its shape against
//! `requirements`, co-signs as fee payer, and broadcasts it.

use solana_compute_budget_interface::ID as COMPUTE_BUDGET_PROGRAM_ID;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use x402_core::chain::ChainId;
use x402_core::hooks::{BoxFuture, PayloadView, RequirementsView};
use x402_core::proto::{PaymentVerificationError, SettleResponse, VerifyResponse};
use x402_core::scheme::{FacilitatorScheme, SchemeError};

use crate::chain::{SvmConnection, associated_token_address};
use crate::chain_reference;
use crate::exact::types::{PaymentRequirementsExtra, SvmExactPayload, is_fully_signed, partial_sign};

#[cfg(feature = "telemetry")]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => { tracing::$level!($($arg)*) };
}
#[cfg(not(feature = "telemetry"))]
macro_rules! traced {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// Maximum number of instructions allowed in a submitted transaction:
/// `SetComputeUnitLimit`, `SetComputeUnitPrice`, `TransferChecked`, memo.
const MAX_INSTRUCTION_COUNT: usize = 4;

/// `FacilitatorScheme` for Solana SPL Token `TransferChecked` payments.
///
/// Holds one `(connection, fee payer)` pair per chain this facilitator
/// services.
pub struct SolanaExactFacilitator {
    chains: Vec<(SvmConnection, Keypair)>,
}

impl std::fmt::Debug for SolanaExactFacilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaExactFacilitator").finish_non_exhaustive()
    }
}

impl SolanaExactFacilitator {
    /// Builds a facilitator scheme from its chain connections and fee payers.
    #[must_use]
    pub fn new(chains: Vec<(SvmConnection, Keypair)>) -> Self {
        Self { chains }
    }

    fn chain_for(&self, requirements: &RequirementsView) -> Option<&(SvmConnection, Keypair)> {
        let reference = chain_reference(&requirements.network())?;
        self.chains.iter().find(|(connection, _)| connection.chain_reference() == reference)
    }

    fn decode_transaction(payload: &PayloadView) -> Result<VersionedTransaction, SchemeError> {
        let wire: SvmExactPayload = match payload {
            PayloadView::V2(payload) => serde_json::from_value(payload.payload.clone())?,
            PayloadView::V1(payload) => serde_json::from_value(payload.payload.clone())?,
        };
        let bytes = x402_core::encoding::Base64Bytes::from(wire.transaction.as_bytes())
            .decode()
            .map_err(|e| format!("transaction is not valid base64: {e}"))?;
        bincode::deserialize(&bytes).map_err(|e| format!("failed to decode transaction: {e}").into())
    }

    async fn do_verify(&self, payload: &PayloadView, requirements: &RequirementsView) -> Result<VerifyResponse, SchemeError> {
        let Some((connection, fee_payer)) = self.chain_for(requirements) else {
            return Ok(PaymentVerificationError::UnsupportedChain.into());
        };
        let tx = Self::decode_transaction(payload)?;

        let instructions = tx.message.instructions();
        if instructions.len() < 3 || instructions.len() > MAX_INSTRUCTION_COUNT {
            return Ok(PaymentVerificationError::InvalidFormat("unexpected instruction count".into()).into());
        }
        let account_keys = tx.message.static_account_keys();
        let Some(&tx_fee_payer) = account_keys.first() else {
            return Ok(PaymentVerificationError::InvalidFormat("transaction names no fee payer".into()).into());
        };
        if tx_fee_payer != fee_payer.pubkey() {
            return Ok(PaymentVerificationError::InvalidFormat("fee payer does not match facilitator".into()).into());
        }

        if let Err(reason) = verify_compute_budget_instructions(&tx, connection) {
            return Ok(PaymentVerificationError::InvalidFormat(reason).into());
        }

        let Ok(pay_to) = requirements.pay_to().parse::<Pubkey>() else {
            return Ok(PaymentVerificationError::InvalidFormat("payTo is not a valid address".into()).into());
        };
        let Ok(mint) = requirements.asset().parse::<Pubkey>() else {
            return Ok(PaymentVerificationError::InvalidFormat("asset is not a valid address".into()).into());
        };
        let Ok(required_amount) = requirements.amount().parse::<u64>() else {
            return Ok(PaymentVerificationError::InvalidFormat("amount is not a valid integer".into()).into());
        };

        let transfer = match parse_transfer_checked(&tx, 2) {
            Ok(transfer) => transfer,
            Err(reason) => return Ok(PaymentVerificationError::InvalidFormat(reason).into()),
        };
        if transfer.authority == fee_payer.pubkey() {
            return Ok(PaymentVerificationError::InvalidFormat("fee payer may not be the transfer authority".into()).into());
        }
        if transfer.mint != mint {
            return Ok(PaymentVerificationError::AssetMismatch.into());
        }
        let expected_destination = associated_token_address(&pay_to, &mint, &transfer.token_program);
        if transfer.destination != expected_destination {
            return Ok(PaymentVerificationError::RecipientMismatch.into());
        }
        if transfer.amount < required_amount {
            return Ok(PaymentVerificationError::InvalidPaymentAmount.into());
        }

        for instruction in tx.message.instructions() {
            for account_index in &instruction.accounts {
                if account_keys.get(*account_index as usize) == Some(&fee_payer.pubkey()) {
                    return Ok(PaymentVerificationError::InvalidFormat("fee payer present in instruction accounts".into()).into());
                }
            }
        }

        let simulation = connection.rpc().simulate_transaction(&tx).await;
        if let Err(error) = simulation {
            return Ok(PaymentVerificationError::TransactionSimulation(error.to_string()).into());
        }

        Ok(VerifyResponse::Valid { payer: transfer.authority.to_string() })
    }

    async fn do_settle(&self, payload: &PayloadView, requirements: &RequirementsView) -> Result<SettleResponse, SchemeError> {
        let network = ChainId::new("solana", chain_reference(&requirements.network()).unwrap_or_default());
        let Some((connection, fee_payer)) = self.chain_for(requirements) else {
            return Ok(SettleResponse::Error { error_reason: "invalid_network".into(), network });
        };
        let tx = match Self::decode_transaction(payload) {
            Ok(tx) => tx,
            Err(_) => return Ok(SettleResponse::Error { error_reason: "invalid_format".into(), network }),
        };
        let payer = match parse_transfer_checked(&tx, 2) {
            Ok(transfer) => transfer.authority.to_string(),
            Err(_) => return Ok(SettleResponse::Error { error_reason: "invalid_format".into(), network }),
        };

        let signed = match partial_sign(tx, fee_payer) {
            Ok(tx) => tx,
            Err(reason) => return Ok(SettleResponse::Error { error_reason: format!("fee_payer_signing_failed: {reason}"), network }),
        };
        if !is_fully_signed(&signed) {
            return Ok(SettleResponse::Error { error_reason: "undersigned_transaction".into(), network });
        }

        let signature = connection.rpc().send_and_confirm_transaction(&signed).await;
        match signature {
            Ok(signature) => {
                traced!(info, %signature, "settled transferChecked transaction");
                Ok(SettleResponse::Success { payer, transaction: signature.to_string(), network })
            }
            Err(error) => {
                traced!(warn, %error, "transferChecked submission failed");
                Ok(SettleResponse::Error { error_reason: format!("transaction_simulation_failed: {error}"), network })
            }
        }
    }
}

impl FacilitatorScheme for SolanaExactFacilitator {
    fn scheme(&self) -> &str {
        super::SCHEME
    }

    fn caip_family(&self) -> &str {
        "solana"
    }

    fn verify<'a>(
        &'a self,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<VerifyResponse, SchemeError>> {
        Box::pin(self.do_verify(payload, requirements))
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PayloadView,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<SettleResponse, SchemeError>> {
        Box::pin(self.do_settle(payload, requirements))
    }

    fn get_extra(&self, network: &ChainId) -> Option<serde_json::Value> {
        let reference = network.reference();
        let (_, fee_payer) = self.chains.iter().find(|(connection, _)| connection.chain_reference() == reference)?;
        serde_json::to_value(PaymentRequirementsExtra { fee_payer: fee_payer.pubkey().to_string() }).ok()
    }

    fn get_signers(&self, network: &ChainId) -> Vec<String> {
        let reference = network.reference();
        self.chains
            .iter()
            .find(|(connection, _)| connection.chain_reference() == reference)
            .map(|(_, fee_payer)| vec![fee_payer.pubkey().to_string()])
            .unwrap_or_default()
    }
}

fn verify_compute_budget_instructions(tx: &VersionedTransaction, connection: &SvmConnection) -> Result<(), String> {
    let account_keys = tx.message.static_account_keys();
    let instructions = tx.message.instructions();

    let limit_ix = instructions.first().ok_or("missing compute unit limit instruction")?;
    if account_keys.get(limit_ix.program_id_index as usize) != Some(&COMPUTE_BUDGET_PROGRAM_ID)
        || limit_ix.data.first().copied() != Some(2)
        || limit_ix.data.len() != 5
    {
        return Err("invalid compute unit limit instruction".to_string());
    }
    let mut limit_bytes = [0u8; 4];
    limit_bytes.copy_from_slice(&limit_ix.data[1..5]);
    if u32::from_le_bytes(limit_bytes) > connection.max_compute_unit_limit() {
        return Err("compute unit limit exceeds facilitator maximum".to_string());
    }

    let price_ix = instructions.get(1).ok_or("missing compute unit price instruction")?;
    if account_keys.get(price_ix.program_id_index as usize) != Some(&COMPUTE_BUDGET_PROGRAM_ID)
        || price_ix.data.first().copied() != Some(3)
        || price_ix.data.len() != 9
    {
        return Err("invalid compute unit price instruction".to_string());
    }
    let mut price_bytes = [0u8; 8];
    price_bytes.copy_from_slice(&price_ix.data[1..9]);
    if u64::from_le_bytes(price_bytes) > connection.max_compute_unit_price() {
        return Err("compute unit price exceeds facilitator maximum".to_string());
    }
    Ok(())
}

struct TransferChecked {
    amount: u64,
    mint: Pubkey,
    destination: Pubkey,
    authority: Pubkey,
    token_program: Pubkey,
}

fn parse_transfer_checked(tx: &VersionedTransaction, index: usize) -> Result<TransferChecked, String> {
    let account_keys = tx.message.static_account_keys();
    let instruction = tx.message.instructions().get(index).ok_or("missing transferChecked instruction")?;
    let program_id = *account_keys.get(instruction.program_id_index as usize).ok_or("invalid program id index")?;

    let account_at = |position: usize| -> Result<Pubkey, String> {
        let account_index = *instruction.accounts.get(position).ok_or("missing instruction account")?;
        account_keys.get(account_index as usize).copied().ok_or_else(|| "account index out of range".to_string())
    };
    let source_account = account_at(0)?;
    let _ = source_account;
    let mint = account_at(1)?;
    let destination = account_at(2)?;
    let authority = account_at(3)?;

    let amount = if program_id == spl_token::ID {
        match spl_token::instruction::TokenInstruction::unpack(&instruction.data).map_err(|_| "invalid token instruction".to_string())? {
            spl_token::instruction::TokenInstruction::TransferChecked { amount, .. } => amount,
            _ => return Err("expected transferChecked instruction".to_string()),
        }
    } else if program_id == spl_token_2022::ID {
        match spl_token_2022::instruction::TokenInstruction::unpack(&instruction.data).map_err(|_| "invalid token instruction".to_string())? {
            spl_token_2022::instruction::TokenInstruction::TransferChecked { amount, .. } => amount,
            _ => return Err("expected transferChecked instruction".to_string()),
        }
    } else {
        return Err("unrecognized token program".to_string());
    };

    Ok(TransferChecked { amount, mint, destination, authority, token_program: program_id })
}
