//! Client-side transaction building and signing for the Solana `exact` scheme.

use rand::Rng;
use solana_message::VersionedMessage;
use solana_message::v0::Message as MessageV0;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;
use x402_core::hooks::{BoxFuture, RequirementsView};
use x402_core::scheme::{ClientScheme, SchemeError};

use crate::chain::{SvmConnection, associated_token_address};
use crate::chain_reference;
use crate::exact::types::{PaymentRequirementsExtra, SvmExactPayload, partial_sign};

/// Which SPL token program a mint belongs to.
#[derive(Debug, Clone, Copy)]
enum TokenProgram {
    Token,
    Token2022,
}

impl TokenProgram {
    const fn id(self) -> Pubkey {
        match self {
            Self::Token => spl_token::ID,
            Self::Token2022 => spl_token_2022::ID,
        }
    }
}

async fn fetch_mint(connection: &SvmConnection, mint: &Pubkey) -> Result<(TokenProgram, u8), SchemeError> {
    let account = connection.rpc().get_account(mint).await.map_err(|e| format!("failed to fetch mint {mint}: {e}"))?;
    if account.owner == spl_token::ID {
        let parsed = spl_token::state::Mint::unpack(&account.data).map_err(|e| format!("failed to unpack mint {mint}: {e}"))?;
        Ok((TokenProgram::Token, parsed.decimals))
    } else if account.owner == spl_token_2022::ID {
        let parsed =
            spl_token_2022::state::Mint::unpack(&account.data).map_err(|e| format!("failed to unpack mint {mint}: {e}"))?;
        Ok((TokenProgram::Token2022, parsed.decimals))
    } else {
        Err(format!("mint {mint} owned by unrecognized program {}", account.owner).into())
    }
}

/// `ClientScheme` that signs SPL Token `TransferChecked` payments, leaving
/// the fee-payer signature slot open for the facilitator to fill at
/// settlement time.
pub struct SolanaExactClient<S> {
    signer: S,
    connection: SvmConnection,
}

impl<S> SolanaExactClient<S> {
    /// Builds a client scheme from a local signer and RPC connection.
    #[must_use]
    pub fn new(signer: S, connection: SvmConnection) -> Self {
        Self { signer, connection }
    }
}

impl<S> std::fmt::Debug for SolanaExactClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaExactClient").finish_non_exhaustive()
    }
}

impl<S: Signer + Send + Sync> SolanaExactClient<S> {
    async fn sign(&self, requirements: &RequirementsView) -> Result<serde_json::Value, SchemeError> {
        let reference = chain_reference(&requirements.network())
            .ok_or_else(|| format!("unresolvable solana network: {}", requirements.network()))?;
        if reference != self.connection.chain_reference() {
            return Err(format!("connection services {} but requirements name {reference}", self.connection.chain_reference()).into());
        }

        let fee_payer: Pubkey = requirements
            .extra()
            .and_then(|extra| serde_json::from_value::<PaymentRequirementsExtra>(extra.clone()).ok())
            .ok_or("missing feePayer in requirements.extra")?
            .fee_payer
            .parse()
            .map_err(|e| format!("invalid feePayer address: {e}"))?;

        let pay_to: Pubkey = requirements.pay_to().parse().map_err(|e| format!("invalid payTo address: {e}"))?;
        let mint: Pubkey = requirements.asset().parse().map_err(|e| format!("invalid asset address: {e}"))?;
        let amount: u64 = requirements.amount().parse().map_err(|e| format!("invalid amount: {e}"))?;

        let (token_program, decimals) = fetch_mint(&self.connection, &mint).await?;
        let token_program_id = token_program.id();

        let payer = self.signer.pubkey();
        let source = associated_token_address(&payer, &mint, &token_program_id);
        let destination = associated_token_address(&pay_to, &mint, &token_program_id);

        let transfer_ix = match token_program {
            TokenProgram::Token => spl_token::instruction::transfer_checked(
                &token_program_id,
                &source,
                &mint,
                &destination,
                &payer,
                &[],
                amount,
                decimals,
            ),
            TokenProgram::Token2022 => spl_token_2022::instruction::transfer_checked(
                &token_program_id,
                &source,
                &mint,
                &destination,
                &payer,
                &[],
                amount,
                decimals,
            ),
        }
        .map_err(|e| format!("failed to build transferChecked instruction: {e}"))?;

        // A fixed blockhash otherwise produces byte-identical transactions for repeated
        // payments of the same amount, which duplicate-transaction detection would reject.
        let uniqueness: [u8; 16] = rand::rng().random();
        let memo_text: String = uniqueness.iter().map(|b| format!("{b:02x}")).collect();
        let memo_ix = spl_memo::build_memo(memo_text.as_bytes(), &[&payer]);

        let compute_budget_ixs = vec![
            solana_compute_budget_interface::ComputeBudgetInstruction::set_compute_unit_limit(
                self.connection.max_compute_unit_limit(),
            ),
            solana_compute_budget_interface::ComputeBudgetInstruction::set_compute_unit_price(
                self.connection.max_compute_unit_price(),
            ),
        ];

        let instructions: Vec<Instruction> =
            compute_budget_ixs.into_iter().chain(std::iter::once(transfer_ix)).chain(std::iter::once(memo_ix)).collect();

        let recent_blockhash = self.connection.rpc().get_latest_blockhash().await.map_err(|e| format!("failed to fetch recent blockhash: {e}"))?;
        let message = MessageV0::try_compile(&fee_payer, &instructions, &[], recent_blockhash)
            .map_err(|e| format!("failed to compile transaction message: {e:?}"))?;

        let tx = VersionedTransaction { signatures: vec![], message: VersionedMessage::V0(message) };
        let signed = partial_sign(tx, &self.signer)?;

        let bytes = bincode::serialize(&signed).map_err(|e| format!("failed to serialize transaction: {e}"))?;
        let payload = SvmExactPayload { transaction: x402_core::encoding::Base64Bytes::encode(&bytes).to_string() };
        serde_json::to_value(payload).map_err(Into::into)
    }
}

impl<S: Signer + Send + Sync> ClientScheme for SolanaExactClient<S> {
    fn scheme(&self) -> &str {
        super::SCHEME
    }

    fn create_payment_payload<'a>(
        &'a self,
        requirements: &'a RequirementsView,
    ) -> BoxFuture<'a, Result<serde_json::Value, SchemeError>> {
        Box::pin(self.sign(requirements))
    }
}
