mod ongoing;
mod storage;

use common::codec::{
    self, CreateAccountArgs, CodecError, CALL_PAYLOAD_OFFSET, PARTIAL_CALL_PAYLOAD_OFFSET,
};
use common::solana_sdk::instruction::{AccountMeta, Instruction};
use common::solana_sdk::program_error::ProgramError;
use common::solana_sdk::pubkey::Pubkey;
use common::solana_sdk::{secp256k1_program, system_instruction, system_program, sysvar};
use common::{spl_associated_token_account, spl_token};
use operator::SignedCall;

pub use self::ongoing::{ExecutionContext, ResolvedCaller, RunState};
pub use self::storage::{storage_seed, StorageAccount};

/// Index of the evm-loader instruction in batches that start with signature verification.
const VERIFIED_CALL_IDX: u8 = 1;

/// Ordered instructions submitted as one Solana transaction.
#[derive(Debug, Clone)]
pub struct InstructionBatch {
    instructions: Vec<Instruction>,
    neon_index: Option<u8>,
}

impl InstructionBatch {
    fn new(instructions: Vec<Instruction>, neon_index: Option<u8>) -> Self {
        Self {
            instructions,
            neon_index,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Position of the evm-loader execution instruction, if the batch has one.
    pub fn neon_index(&self) -> Option<u8> {
        self.neon_index
    }

    fn with_extra_accounts(mut self, extra: &[AccountMeta]) -> Self {
        if let Some(last) = self.instructions.last_mut() {
            last.accounts.extend_from_slice(extra);
        }
        self
    }
}

/// Accounts touched by an Ethereum call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallAccounts {
    pub caller: Pubkey,
    pub caller_token: Pubkey,
    pub contract: Pubkey,
    pub contract_token: Pubkey,
    pub contract_code: Pubkey,
}

#[derive(Debug, Clone)]
pub struct TransactionAssembler {
    program_id: Pubkey,
    token_mint: Pubkey,
    operator: Pubkey,
    operator_token: Pubkey,
    collateral_pool: Pubkey,
    collateral_pool_index: u32,
}

/// ## Utility methods.
impl TransactionAssembler {
    pub fn new(
        program_id: Pubkey,
        token_mint: Pubkey,
        operator: Pubkey,
        operator_token: Pubkey,
        collateral_pool: Pubkey,
        collateral_pool_index: u32,
    ) -> Self {
        Self {
            program_id,
            token_mint,
            operator,
            operator_token,
            collateral_pool,
            collateral_pool_index,
        }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn operator(&self) -> &Pubkey {
        &self.operator
    }

    pub fn collateral_pool(&self) -> &Pubkey {
        &self.collateral_pool
    }

    fn neon_ix(&self, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    /// Trailing accounts shared by every execution instruction.
    fn trailing_accounts(&self) -> [AccountMeta; 4] {
        [
            AccountMeta::new_readonly(self.program_id, false),
            AccountMeta::new_readonly(self.token_mint, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(self.operator, false),
        ]
    }

    fn contract_and_caller(accounts: &CallAccounts) -> [AccountMeta; 5] {
        [
            AccountMeta::new(accounts.contract, false),
            AccountMeta::new(accounts.contract_token, false),
            AccountMeta::new(accounts.contract_code, false),
            AccountMeta::new(accounts.caller, false),
            AccountMeta::new(accounts.caller_token, false),
        ]
    }
}

/// ## Ethereum transaction execution.
impl TransactionAssembler {
    /// `[secp256k1 verify, call-from-raw-tx]`
    pub fn single(
        &self,
        accounts: &CallAccounts,
        call: &SignedCall,
        extra: &[AccountMeta],
    ) -> Result<InstructionBatch, CodecError> {
        let verify = secp256k1_verify_ix(VERIFIED_CALL_IDX, call, CALL_PAYLOAD_OFFSET)?;
        let data = codec::encode_call_from_raw_tx(self.collateral_pool_index, &call.payload());
        let ix = self.neon_ix(self.call_accounts(accounts), data);

        tracing::debug!(?accounts, ?call, "build single execution");
        Ok(InstructionBatch::new(vec![verify, ix], Some(VERIFIED_CALL_IDX)).with_extra_accounts(extra))
    }

    /// `[secp256k1 verify, partial-call]`
    pub fn partial_call(
        &self,
        storage: &Pubkey,
        accounts: &CallAccounts,
        call: &SignedCall,
        step_count: u64,
        extra: &[AccountMeta],
    ) -> Result<InstructionBatch, CodecError> {
        let verify = secp256k1_verify_ix(VERIFIED_CALL_IDX, call, PARTIAL_CALL_PAYLOAD_OFFSET)?;
        let data = codec::encode_partial_call(self.collateral_pool_index, step_count, &call.payload());
        let ix = self.neon_ix(self.partial_call_accounts(storage, accounts), data);

        tracing::debug!(%storage, ?accounts, step_count, "build partial call");
        Ok(InstructionBatch::new(vec![verify, ix], Some(VERIFIED_CALL_IDX)).with_extra_accounts(extra))
    }

    /// `[continue]`
    pub fn continue_call(
        &self,
        storage: &Pubkey,
        accounts: &CallAccounts,
        step_count: u64,
        extra: &[AccountMeta],
    ) -> InstructionBatch {
        let data = codec::encode_continue(step_count);
        let ix = self.neon_ix(self.continue_accounts(storage, accounts), data);
        InstructionBatch::new(vec![ix], Some(0)).with_extra_accounts(extra)
    }

    pub fn call_accounts(&self, accounts: &CallAccounts) -> Vec<AccountMeta> {
        let mut metas = vec![
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
            AccountMeta::new(self.operator, true),
            AccountMeta::new(self.collateral_pool, false),
            AccountMeta::new(self.operator_token, false),
            AccountMeta::new(accounts.caller_token, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ];
        metas.extend(Self::contract_and_caller(accounts));
        metas.extend(self.trailing_accounts());
        metas
    }

    pub fn partial_call_accounts(&self, storage: &Pubkey, accounts: &CallAccounts) -> Vec<AccountMeta> {
        let mut metas = vec![
            AccountMeta::new(*storage, false),
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
            AccountMeta::new(self.operator, true),
            AccountMeta::new(self.collateral_pool, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ];
        metas.extend(Self::contract_and_caller(accounts));
        metas.push(AccountMeta::new_readonly(sysvar::instructions::id(), false));
        metas.extend(self.trailing_accounts());
        metas
    }

    pub fn continue_accounts(&self, storage: &Pubkey, accounts: &CallAccounts) -> Vec<AccountMeta> {
        let mut metas = vec![
            AccountMeta::new(*storage, false),
            AccountMeta::new(self.operator, true),
            AccountMeta::new(self.operator_token, false),
            AccountMeta::new(accounts.caller_token, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ];
        metas.extend(Self::contract_and_caller(accounts));
        metas.push(AccountMeta::new_readonly(sysvar::instructions::id(), false));
        metas.extend(self.trailing_accounts());
        metas
    }
}

/// ## Account creation.
impl TransactionAssembler {
    /// System `create_account_with_seed` for a storage account owned by the evm-loader.
    pub fn create_storage(&self, storage: &StorageAccount, lamports: u64, space: u64) -> InstructionBatch {
        let ix = system_instruction::create_account_with_seed(
            &self.operator,
            &storage.pubkey,
            &self.operator,
            &storage.seed,
            lamports,
            space,
            &self.program_id,
        );
        InstructionBatch::new(vec![ix], None)
    }

    /// evm-loader account creation for `caller`, optionally funding its token account
    /// from the operator's one. `token_funding` is in base units of the mint.
    pub fn create_ether_account(
        &self,
        caller: &ResolvedCaller,
        lamports: u64,
        code_account: Option<Pubkey>,
        token_funding: u64,
        decimals: u8,
    ) -> Result<InstructionBatch, ProgramError> {
        let args = CreateAccountArgs {
            lamports,
            space: 0,
            ether: caller.ether.0 .0,
            nonce: caller.bump,
        };

        let mut accounts = vec![
            AccountMeta::new_readonly(self.operator, true),
            AccountMeta::new(caller.account, false),
            AccountMeta::new(caller.token, false),
        ];
        accounts.extend(code_account.map(|code| AccountMeta::new(code, false)));
        accounts.extend([
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(self.token_mint, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ]);

        let mut instructions = vec![self.neon_ix(accounts, codec::create_account_data(&args))];
        if token_funding > 0 {
            instructions.push(spl_token::instruction::transfer_checked(
                &spl_token::id(),
                &self.operator_token,
                &self.token_mint,
                &caller.token,
                &self.operator,
                &[],
                token_funding,
                decimals,
            )?);
        }

        tracing::debug!(caller = %caller.ether, account = %caller.account, token_funding, "build account creation");
        Ok(InstructionBatch::new(instructions, None))
    }

    /// evm-loader `CreateAccountWithSeed`: `created` is derived from `base` and `seed`.
    pub fn create_account_with_seed(
        &self,
        base: &Pubkey,
        seed: &str,
        created: &Pubkey,
        lamports: u64,
        space: u64,
    ) -> Instruction {
        let data = codec::encode_create_account_with_seed(
            base,
            seed,
            lamports,
            space,
            &self.program_id,
            created,
        );
        let accounts = vec![
            AccountMeta::new_readonly(self.operator, true),
            AccountMeta::new(*created, false),
            AccountMeta::new(*base, false),
            AccountMeta::new(*created, false),
            AccountMeta::new(self.program_id, false),
            AccountMeta::new(self.token_mint, false),
            AccountMeta::new(spl_token::id(), false),
            AccountMeta::new(sysvar::rent::id(), false),
            AccountMeta::new(system_program::id(), false),
        ];
        self.neon_ix(accounts, data)
    }
}

fn secp256k1_verify_ix(
    call_index: u8,
    call: &SignedCall,
    payload_offset: u16,
) -> Result<Instruction, CodecError> {
    let data = codec::encode_secp256k1_verify(call_index, call.message.len(), payload_offset)?;
    Ok(Instruction {
        program_id: secp256k1_program::id(),
        accounts: vec![AccountMeta::new_readonly(secp256k1_program::id(), false)],
        data,
    })
}
