//! Sample counter program: cluster-specific address and instruction helpers.

use std::{fmt, str::FromStr};

use solana_instruction::Instruction;
use solana_pubkey::Pubkey;
use thiserror::Error;

use crate::program::{
    AccountRole, ArgKind, ArgValue, InstructionSchema, ProgramSchema, SchemaError,
};

/// Counter program address on mainnet-beta and local validators.
pub const COUNTER_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("AsjZ3kWAUSQRNt2pZVeJkywhZ6gpLpHZmJjduPmKZDZZ");

/// Counter program address on devnet and testnet.
pub const COUNTER_DEVNET_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("CounNZdmsQmWh7uVngV9FXW2dZ6zAgbJyYsvBpqbykg");

/// Account role names used by the counter instructions.
pub mod roles {
    /// Fee payer and rent recipient.
    pub const PAYER: &str = "payer";
    /// Counter state account.
    pub const COUNTER: &str = "counter";
    /// System program.
    pub const SYSTEM_PROGRAM: &str = "system_program";
}

/// Target cluster.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum Cluster {
    /// Production cluster.
    MainnetBeta,
    /// Developer cluster.
    Devnet,
    /// Test cluster.
    Testnet,
    /// Local validator.
    #[default]
    Localnet,
}

impl Cluster {
    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
            Self::Localnet => "localnet",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized cluster name.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
#[error("unknown cluster `{value}`")]
pub struct ParseClusterError {
    /// Rejected input.
    pub value: String,
}

impl FromStr for Cluster {
    type Err = ParseClusterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet-beta" | "mainnet" => Ok(Self::MainnetBeta),
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            "localnet" | "local" | "localhost" => Ok(Self::Localnet),
            _ => Err(ParseClusterError {
                value: value.to_owned(),
            }),
        }
    }
}

/// Counter program address for `cluster`.
#[must_use]
pub const fn program_id(cluster: Cluster) -> Pubkey {
    match cluster {
        Cluster::Devnet | Cluster::Testnet => COUNTER_DEVNET_PROGRAM_ID,
        Cluster::MainnetBeta | Cluster::Localnet => COUNTER_PROGRAM_ID,
    }
}

/// Declared counter instructions for `program_id`.
#[must_use]
pub fn schema(program_id: Pubkey) -> ProgramSchema {
    ProgramSchema::new(program_id)
        .with_instruction(
            InstructionSchema::new("initialize")
                .account(AccountRole::writable_signer(roles::PAYER))
                .account(AccountRole::writable_signer(roles::COUNTER))
                .account(AccountRole::readonly(roles::SYSTEM_PROGRAM)),
        )
        .with_instruction(
            InstructionSchema::new("close")
                .account(AccountRole::writable_signer(roles::PAYER))
                .account(AccountRole::writable(roles::COUNTER)),
        )
        .with_instruction(
            InstructionSchema::new("increment").account(AccountRole::writable(roles::COUNTER)),
        )
        .with_instruction(
            InstructionSchema::new("decrement").account(AccountRole::writable(roles::COUNTER)),
        )
        .with_instruction(
            InstructionSchema::new("set")
                .account(AccountRole::writable(roles::COUNTER))
                .arg(ArgKind::U8),
        )
}

/// Instruction helpers for one deployment of the counter program.
#[derive(Debug, Clone)]
pub struct CounterProgram {
    /// Declared instructions.
    schema: ProgramSchema,
}

impl CounterProgram {
    /// Counter program deployed on `cluster`.
    #[must_use]
    pub fn new(cluster: Cluster) -> Self {
        Self::at(program_id(cluster))
    }

    /// Counter program deployed at `program_id`.
    #[must_use]
    pub fn at(program_id: Pubkey) -> Self {
        Self {
            schema: schema(program_id),
        }
    }

    /// Program address.
    #[must_use]
    pub const fn program_id(&self) -> Pubkey {
        self.schema.program_id()
    }

    /// Underlying schema.
    #[must_use]
    pub const fn schema(&self) -> &ProgramSchema {
        &self.schema
    }

    /// Creates `counter`, funded by `payer`. Both must sign.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the schema no longer matches this call.
    pub fn initialize(&self, payer: Pubkey, counter: Pubkey) -> Result<Instruction, SchemaError> {
        self.schema
            .operation("initialize")
            .account(roles::PAYER, payer)
            .account(roles::COUNTER, counter)
            .account(roles::SYSTEM_PROGRAM, solana_system_interface::program::ID)
            .build()
    }

    /// Adds one to `counter`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the schema no longer matches this call.
    pub fn increment(&self, counter: Pubkey) -> Result<Instruction, SchemaError> {
        self.update("increment", counter)
    }

    /// Subtracts one from `counter`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the schema no longer matches this call.
    pub fn decrement(&self, counter: Pubkey) -> Result<Instruction, SchemaError> {
        self.update("decrement", counter)
    }

    /// Sets `counter` to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the schema no longer matches this call.
    pub fn set(&self, counter: Pubkey, value: u8) -> Result<Instruction, SchemaError> {
        self.schema
            .operation("set")
            .account(roles::COUNTER, counter)
            .arg(ArgValue::U8(value))
            .build()
    }

    /// Closes `counter` and returns its rent to `payer`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the schema no longer matches this call.
    pub fn close(&self, payer: Pubkey, counter: Pubkey) -> Result<Instruction, SchemaError> {
        self.schema
            .operation("close")
            .account(roles::PAYER, payer)
            .account(roles::COUNTER, counter)
            .build()
    }

    /// Single-account update instruction.
    fn update(&self, name: &str, counter: Pubkey) -> Result<Instruction, SchemaError> {
        self.schema
            .operation(name)
            .account(roles::COUNTER, counter)
            .build()
    }
}
