//! Transaction skeleton and unsigned-transaction types.

use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_hash::Hash;
use solana_instruction::Instruction;
use solana_message::{Message, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signer::{SignerError, signers::Signers};
use solana_transaction::versioned::VersionedTransaction;
use thiserror::Error;

/// Builder-layer errors.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// Signing failed with signer-level error.
    #[error("failed to sign transaction: {source}")]
    SignTransaction {
        /// Underlying signer error.
        source: SignerError,
    },
    /// Skeleton has no fee payer assigned.
    #[error("transaction has no fee payer")]
    MissingFeePayer,
    /// Skeleton has no recency token assigned.
    #[error("transaction has no recent blockhash")]
    MissingRecencyToken,
}

/// Recent blockhash plus the last block height at which it is still accepted.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct RecencyToken {
    /// Recent blockhash embedded in the message.
    pub blockhash: Hash,
    /// Last block height at which the network accepts `blockhash`.
    pub last_valid_block_height: u64,
}

impl RecencyToken {
    /// Creates a recency token.
    #[must_use]
    pub const fn new(blockhash: Hash, last_valid_block_height: u64) -> Self {
        Self {
            blockhash,
            last_valid_block_height,
        }
    }
}

/// Unsigned transaction wrapper.
#[derive(Debug, Clone)]
pub struct UnsignedTx {
    /// Versioned message ready to sign.
    message: VersionedMessage,
}

impl UnsignedTx {
    /// Returns the message payload.
    #[must_use]
    pub const fn message(&self) -> &VersionedMessage {
        &self.message
    }

    /// Returns the fee payer, which is always the first static account key.
    #[must_use]
    pub fn fee_payer(&self) -> Option<Pubkey> {
        self.message.static_account_keys().first().copied()
    }

    /// Returns the accounts whose signatures the message requires.
    #[must_use]
    pub fn required_signers(&self) -> Vec<Pubkey> {
        let required = usize::from(self.message.header().num_required_signatures);
        self.message
            .static_account_keys()
            .iter()
            .take(required)
            .copied()
            .collect()
    }

    /// Signs the message with provided signers.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::SignTransaction`] when signer validation or signing fails.
    pub fn sign<T>(self, signers: &T) -> Result<VersionedTransaction, BuilderError>
    where
        T: Signers + ?Sized,
    {
        VersionedTransaction::try_new(self.message, signers)
            .map_err(|source| BuilderError::SignTransaction { source })
    }
}

/// Caller-provided transaction skeleton.
///
/// Fee payer and recency token are optional here. The assembler fills whichever is
/// missing before the skeleton is turned into an [`UnsignedTx`].
#[derive(Debug, Clone, Default)]
pub struct TxBuilder {
    /// Fee payer, when the caller already chose one.
    fee_payer: Option<Pubkey>,
    /// Recency token, when the caller already fetched one.
    recency: Option<RecencyToken>,
    /// User-provided instructions.
    instructions: Vec<Instruction>,
    /// Optional compute unit limit.
    compute_unit_limit: Option<u32>,
    /// Optional priority fee (micro-lamports per compute unit).
    priority_fee_micro_lamports: Option<u64>,
}

impl TxBuilder {
    /// Creates an empty skeleton.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fee_payer: None,
            recency: None,
            instructions: Vec::new(),
            compute_unit_limit: None,
            priority_fee_micro_lamports: None,
        }
    }

    /// Sets the fee payer.
    #[must_use]
    pub const fn with_fee_payer(mut self, fee_payer: Pubkey) -> Self {
        self.fee_payer = Some(fee_payer);
        self
    }

    /// Sets the recency token.
    #[must_use]
    pub const fn with_recency(mut self, recency: RecencyToken) -> Self {
        self.recency = Some(recency);
        self
    }

    /// Appends one instruction.
    #[must_use]
    pub fn add_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Appends many instructions.
    #[must_use]
    pub fn add_instructions<I>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        self.instructions.extend(instructions);
        self
    }

    /// Sets compute unit limit.
    #[must_use]
    pub const fn with_compute_unit_limit(mut self, units: u32) -> Self {
        self.compute_unit_limit = Some(units);
        self
    }

    /// Sets priority fee in micro-lamports.
    #[must_use]
    pub const fn with_priority_fee_micro_lamports(mut self, micro_lamports: u64) -> Self {
        self.priority_fee_micro_lamports = Some(micro_lamports);
        self
    }

    /// Returns the fee payer already set on the skeleton.
    #[must_use]
    pub const fn fee_payer(&self) -> Option<Pubkey> {
        self.fee_payer
    }

    /// Returns the recency token already set on the skeleton.
    #[must_use]
    pub const fn recency(&self) -> Option<RecencyToken> {
        self.recency
    }

    /// Returns the user instructions added so far.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Builds the unsigned transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::MissingFeePayer`] or [`BuilderError::MissingRecencyToken`]
    /// when the skeleton was not fully assembled.
    pub fn build_unsigned(self) -> Result<UnsignedTx, BuilderError> {
        let fee_payer = self.fee_payer.ok_or(BuilderError::MissingFeePayer)?;
        let recency = self.recency.ok_or(BuilderError::MissingRecencyToken)?;
        Ok(UnsignedTx {
            message: self.build_message(fee_payer, recency.blockhash),
        })
    }

    /// Builds a legacy message wrapped as a versioned message.
    fn build_message(self, fee_payer: Pubkey, blockhash: Hash) -> VersionedMessage {
        let mut instructions = Vec::new();
        if let Some(units) = self.compute_unit_limit {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(units));
        }
        if let Some(micro_lamports) = self.priority_fee_micro_lamports {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
                micro_lamports,
            ));
        }
        instructions.extend(self.instructions);
        let message = Message::new_with_blockhash(&instructions, Some(&fee_payer), &blockhash);
        VersionedMessage::Legacy(message)
    }
}
