//! Schema-validated program instruction builder.
//!
//! A [`ProgramSchema`] declares each instruction's account roles and argument layout.
//! [`OperationBuilder`] binds concrete accounts to roles and encodes arguments, so a call that
//! does not match the declared shape fails before it ever reaches the assembler.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use solana_instruction::{AccountMeta, Instruction};
use solana_pubkey::Pubkey;
use thiserror::Error;

/// Instruction discriminator width.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Returns the Anchor-style discriminator: the first 8 bytes of `sha256("global:<name>")`.
#[must_use]
pub fn instruction_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut discriminator = [0_u8; DISCRIMINATOR_LEN];
    for (dst, src) in discriminator.iter_mut().zip(digest.iter()) {
        *dst = *src;
    }
    discriminator
}

/// Operation did not match its declared shape.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum SchemaError {
    /// Program declares no instruction with this name.
    #[error("unknown instruction `{instruction}`")]
    UnknownInstruction {
        /// Requested instruction name.
        instruction: String,
    },
    /// A declared account role was not bound.
    #[error("instruction `{instruction}` is missing account `{role}`")]
    MissingAccount {
        /// Instruction name.
        instruction: String,
        /// Unbound role.
        role: &'static str,
    },
    /// A bound role is not declared by the instruction.
    #[error("instruction `{instruction}` has no account named `{role}`")]
    UnknownAccount {
        /// Instruction name.
        instruction: String,
        /// Undeclared role.
        role: String,
    },
    /// Argument list differs from the declared layout.
    #[error("instruction `{instruction}` expects args {expected:?}, got {actual:?}")]
    ArgsMismatch {
        /// Instruction name.
        instruction: String,
        /// Declared argument kinds.
        expected: Vec<ArgKind>,
        /// Supplied argument kinds.
        actual: Vec<ArgKind>,
    },
}

/// One account slot of an instruction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AccountRole {
    /// Role name used when binding.
    pub name: &'static str,
    /// Account must sign.
    pub signer: bool,
    /// Account is written.
    pub writable: bool,
}

impl AccountRole {
    /// Writable signer, such as a fee payer or a freshly created account.
    #[must_use]
    pub const fn writable_signer(name: &'static str) -> Self {
        Self {
            name,
            signer: true,
            writable: true,
        }
    }

    /// Writable, non-signing account.
    #[must_use]
    pub const fn writable(name: &'static str) -> Self {
        Self {
            name,
            signer: false,
            writable: true,
        }
    }

    /// Read-only, non-signing account such as a program.
    #[must_use]
    pub const fn readonly(name: &'static str) -> Self {
        Self {
            name,
            signer: false,
            writable: false,
        }
    }

    /// Account meta for `pubkey` in this role.
    fn meta(self, pubkey: Pubkey) -> AccountMeta {
        if self.writable {
            AccountMeta::new(pubkey, self.signer)
        } else {
            AccountMeta::new_readonly(pubkey, self.signer)
        }
    }
}

/// Argument kinds, encoded little-endian.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ArgKind {
    /// One byte.
    U8,
    /// Two bytes.
    U16,
    /// Four bytes.
    U32,
    /// Eight bytes.
    U64,
    /// One byte, 0 or 1.
    Bool,
    /// 32-byte public key.
    Pubkey,
}

/// Argument value.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArgValue {
    /// `u8` value.
    U8(u8),
    /// `u16` value.
    U16(u16),
    /// `u32` value.
    U32(u32),
    /// `u64` value.
    U64(u64),
    /// Boolean value.
    Bool(bool),
    /// Public key value.
    Pubkey(Pubkey),
}

impl ArgValue {
    /// Kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ArgKind {
        match self {
            Self::U8(_) => ArgKind::U8,
            Self::U16(_) => ArgKind::U16,
            Self::U32(_) => ArgKind::U32,
            Self::U64(_) => ArgKind::U64,
            Self::Bool(_) => ArgKind::Bool,
            Self::Pubkey(_) => ArgKind::Pubkey,
        }
    }

    /// Appends the little-endian encoding to `out`.
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::U8(value) => out.push(*value),
            Self::U16(value) => out.extend_from_slice(&value.to_le_bytes()),
            Self::U32(value) => out.extend_from_slice(&value.to_le_bytes()),
            Self::U64(value) => out.extend_from_slice(&value.to_le_bytes()),
            Self::Bool(value) => out.push(u8::from(*value)),
            Self::Pubkey(value) => out.extend_from_slice(&value.to_bytes()),
        }
    }
}

/// Declared shape of one instruction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InstructionSchema {
    /// Instruction name; also the discriminator seed.
    pub name: &'static str,
    /// Account slots in wire order.
    pub accounts: Vec<AccountRole>,
    /// Argument layout in wire order.
    pub args: Vec<ArgKind>,
}

impl InstructionSchema {
    /// Creates a schema with no accounts and no args.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            accounts: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Appends an account slot.
    #[must_use]
    pub fn account(mut self, role: AccountRole) -> Self {
        self.accounts.push(role);
        self
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, kind: ArgKind) -> Self {
        self.args.push(kind);
        self
    }
}

/// Declared instructions of one deployed program.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProgramSchema {
    /// Deployed program address.
    program_id: Pubkey,
    /// Declared instructions.
    instructions: Vec<InstructionSchema>,
}

impl ProgramSchema {
    /// Creates an empty schema for `program_id`.
    #[must_use]
    pub const fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            instructions: Vec::new(),
        }
    }

    /// Declares an instruction. A later declaration with the same name replaces the earlier.
    #[must_use]
    pub fn with_instruction(mut self, instruction: InstructionSchema) -> Self {
        self.instructions
            .retain(|existing| existing.name != instruction.name);
        self.instructions.push(instruction);
        self
    }

    /// Program address.
    #[must_use]
    pub const fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Looks up an instruction by name.
    #[must_use]
    pub fn instruction(&self, name: &str) -> Option<&InstructionSchema> {
        self.instructions
            .iter()
            .find(|instruction| instruction.name == name)
    }

    /// Starts building the named operation.
    #[must_use]
    pub fn operation(&self, name: impl Into<String>) -> OperationBuilder<'_> {
        OperationBuilder {
            schema: self,
            name: name.into(),
            accounts: HashMap::new(),
            args: Vec::new(),
        }
    }
}

/// Binds accounts and arguments for one instruction.
#[derive(Debug, Clone)]
pub struct OperationBuilder<'schema> {
    /// Schema the operation is validated against.
    schema: &'schema ProgramSchema,
    /// Requested instruction name.
    name: String,
    /// Role bindings; rebinding a role replaces it.
    accounts: HashMap<String, Pubkey>,
    /// Arguments in call order.
    args: Vec<ArgValue>,
}

impl OperationBuilder<'_> {
    /// Binds `pubkey` to `role`.
    #[must_use]
    pub fn account(mut self, role: impl Into<String>, pubkey: Pubkey) -> Self {
        self.accounts.insert(role.into(), pubkey);
        self
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, value: ArgValue) -> Self {
        self.args.push(value);
        self
    }

    /// Validates bindings and arguments and encodes the instruction.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the instruction is unknown, a role is unbound or
    /// undeclared, or the arguments differ from the declared layout.
    pub fn build(self) -> Result<Instruction, SchemaError> {
        let Some(schema) = self.schema.instruction(&self.name) else {
            return Err(SchemaError::UnknownInstruction {
                instruction: self.name,
            });
        };

        if let Some(role) = self
            .accounts
            .keys()
            .find(|role| !schema.accounts.iter().any(|declared| declared.name == *role))
        {
            return Err(SchemaError::UnknownAccount {
                instruction: self.name.clone(),
                role: role.clone(),
            });
        }

        let mut metas = Vec::with_capacity(schema.accounts.len());
        for role in &schema.accounts {
            let Some(pubkey) = self.accounts.get(role.name) else {
                return Err(SchemaError::MissingAccount {
                    instruction: self.name,
                    role: role.name,
                });
            };
            metas.push(role.meta(*pubkey));
        }

        let actual: Vec<ArgKind> = self.args.iter().map(ArgValue::kind).collect();
        if actual != schema.args {
            return Err(SchemaError::ArgsMismatch {
                instruction: self.name,
                expected: schema.args.clone(),
                actual,
            });
        }

        let mut data = instruction_discriminator(schema.name).to_vec();
        for arg in &self.args {
            arg.encode_into(&mut data);
        }
        Ok(Instruction {
            program_id: self.schema.program_id,
            accounts: metas,
            data,
        })
    }
}
