#[cfg(test)]
mod tests;
mod error;
pub mod gateway;
pub mod transactions;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes};
use arc_swap::ArcSwap;
use clap::{Args, ValueEnum};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use common::address::{
    collateral_pool_address, solana_to_ether, AccountResolutionError, AccountResolver,
};
use common::codec::{decode_account_record, is_finalize_marker};
use common::solana_sdk::instruction::AccountMeta;
use common::solana_sdk::program_error::ProgramError;
use common::solana_sdk::pubkey;
use common::solana_sdk::pubkey::Pubkey;
use common::solana_sdk::signature::Signature;
use operator::{NeonCall, Operator, SignedCall};

pub use self::error::Error;
pub use self::gateway::{GatewayError, RpcGateway, SubmissionGateway, SubmitOutcome};
pub use self::transactions::{
    CallAccounts, ExecutionContext, InstructionBatch, ResolvedCaller, RunState, StorageAccount,
    TransactionAssembler,
};

pub const DEFAULT_COLLATERAL_POOL_BASE: Pubkey = pubkey!("4sW3SZDJB7qXUyCYKA7pFL8eCTfm3REr8oSiKkww7MaT");
pub const DEFAULT_COLLATERAL_POOL_INDEX: u32 = 2;
pub const DEFAULT_CHAIN_ID: u64 = 111;
pub const DEFAULT_GAS_LIMIT: u128 = 9_999_999;
pub const DEFAULT_GAS_PRICE: u128 = 1_000_000_000;
pub const DEFAULT_MAX_ITERATIONS: u32 = 1_000;
pub const DEFAULT_STORAGE_LAMPORTS: u64 = 1_000_000_000;
pub const DEFAULT_STORAGE_SPACE: u64 = 128 * 1024;
pub const DEFAULT_ETHER_ACCOUNT_LAMPORTS: u64 = 1_000_000_000;
pub const DEFAULT_CALLER_TOKEN_FUNDING: u64 = 2_000;
pub const DEFAULT_TOKEN_DECIMALS: u8 = 9;
pub const DEFAULT_SEED_VERSION: u8 = 1;
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecuteMode {
    /// One `[verify, call-from-raw-tx]` transaction
    Single,
    /// Partial call followed by continuations over a storage account
    Iterative,
}

#[derive(Args, Clone, Debug)]
#[group(id = "ExecutorConfig")]
pub struct Config {
    #[arg(long, env = "EVM_LOADER")]
    /// evm-loader program id
    pub evm_loader: Pubkey,

    #[arg(long, env = "NEON_TOKEN_MINT")]
    /// NEON token mint
    pub token_mint: Pubkey,

    #[arg(long, default_value_t = DEFAULT_COLLATERAL_POOL_BASE)]
    /// Base key of the collateral pool accounts
    pub collateral_pool_base: Pubkey,

    #[arg(long, default_value_t = DEFAULT_COLLATERAL_POOL_INDEX)]
    /// Collateral pool index used by call instructions
    pub collateral_pool_index: u32,

    #[arg(long, env = "NEON_CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    #[arg(long, default_value_t = DEFAULT_GAS_LIMIT)]
    pub gas_limit: u128,

    #[arg(long, default_value_t = DEFAULT_GAS_PRICE)]
    pub gas_price: u128,

    #[arg(long, value_enum, default_value_t = ExecuteMode::Single)]
    /// Execution mode of `send`
    pub execute_mode: ExecuteMode,

    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    /// Maximum number of submitted steps in iterative mode
    pub max_iterations: u32,

    #[arg(long, default_value_t = DEFAULT_STORAGE_LAMPORTS)]
    /// Lamports transferred to a new storage account
    pub storage_lamports: u64,

    #[arg(long, default_value_t = DEFAULT_STORAGE_SPACE)]
    /// Size of a new storage account
    pub storage_space: u64,

    #[arg(long, default_value_t = DEFAULT_ETHER_ACCOUNT_LAMPORTS)]
    /// Lamports transferred to a new ether account
    pub ether_account_lamports: u64,

    #[arg(long, default_value_t = DEFAULT_CALLER_TOKEN_FUNDING)]
    /// Whole tokens moved from the operator to a newly created caller account
    pub caller_token_funding: u64,

    #[arg(long, default_value_t = DEFAULT_TOKEN_DECIMALS)]
    /// Decimals of the token mint
    pub token_decimals: u8,

    #[arg(long, default_value_t = DEFAULT_SEED_VERSION)]
    /// Version byte of ether account seeds
    pub seed_version: u8,

    #[arg(long, default_value_t = DEFAULT_CONFIRM_TIMEOUT_SECS)]
    /// Seconds to wait for a transaction confirmation
    pub confirm_timeout_secs: u64,
}

impl Config {
    pub fn new(evm_loader: Pubkey, token_mint: Pubkey) -> Self {
        Self {
            evm_loader,
            token_mint,
            collateral_pool_base: DEFAULT_COLLATERAL_POOL_BASE,
            collateral_pool_index: DEFAULT_COLLATERAL_POOL_INDEX,
            chain_id: DEFAULT_CHAIN_ID,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: DEFAULT_GAS_PRICE,
            execute_mode: ExecuteMode::Single,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            storage_lamports: DEFAULT_STORAGE_LAMPORTS,
            storage_space: DEFAULT_STORAGE_SPACE,
            ether_account_lamports: DEFAULT_ETHER_ACCOUNT_LAMPORTS,
            caller_token_funding: DEFAULT_CALLER_TOKEN_FUNDING,
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            seed_version: DEFAULT_SEED_VERSION,
            confirm_timeout_secs: DEFAULT_CONFIRM_TIMEOUT_SECS,
        }
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Caller funding in token base units, `None` on overflow.
    pub fn caller_token_funding_amount(&self) -> Option<u64> {
        10u64
            .checked_pow(self.token_decimals.into())
            .and_then(|scale| self.caller_token_funding.checked_mul(scale))
    }
}

/// Ethereum call to execute through the evm-loader.
#[derive(Debug, Clone)]
pub struct EthereumTransaction {
    pub caller: Address,
    pub contract: Pubkey,
    pub contract_code: Pubkey,
    pub data: Bytes,
    /// Appended to the last instruction of every execution batch.
    pub extra_accounts: Vec<AccountMeta>,
    pub steps: u64,
}

impl EthereumTransaction {
    pub const DEFAULT_STEPS: u64 = 500;

    pub fn new(caller: Address, contract: Pubkey, contract_code: Pubkey, data: impl Into<Bytes>) -> Self {
        Self {
            caller,
            contract,
            contract_code,
            data: data.into(),
            extra_accounts: Vec::new(),
            steps: Self::DEFAULT_STEPS,
        }
    }

    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_extra_accounts(mut self, extra_accounts: Vec<AccountMeta>) -> Self {
        self.extra_accounts = extra_accounts;
        self
    }
}

#[derive(Debug)]
pub struct Executed {
    pub context: ExecutionContext,
}

impl Executed {
    pub fn signatures(&self) -> &[Signature] {
        self.context.signatures()
    }
}

/// Terminal failure of a run with everything needed to clean up after it.
#[derive(Debug, thiserror::Error)]
#[error("execution failed in state {state:?}: {error}")]
pub struct Failed {
    #[source]
    pub error: Error,
    pub state: RunState,
    /// Storage account left allocated by the run.
    pub storage: Option<Pubkey>,
    pub context: ExecutionContext,
}

impl Failed {
    fn new(error: Error, context: ExecutionContext) -> Self {
        Self {
            error,
            state: context.state(),
            storage: context.pending_storage(),
            context,
        }
    }
}

pub struct NeonEvmClient<G, R> {
    config: Config,
    gateway: G,
    resolver: R,
    operator: Arc<Operator>,
    assembler: TransactionAssembler,

    mode: ArcSwap<ExecuteMode>,
    caller_locks: DashMap<Address, Arc<Mutex<()>>>,
}

/// ## Utility methods.
impl<G, R> NeonEvmClient<G, R>
where
    G: SubmissionGateway,
    R: AccountResolver,
{
    pub fn new(config: Config, gateway: G, resolver: R, operator: Arc<Operator>) -> Result<Self, Error> {
        let collateral_pool = collateral_pool_address(
            &config.collateral_pool_base,
            config.collateral_pool_index,
            &config.evm_loader,
        )?;
        let operator_token = resolver.token_account(&operator.pubkey());
        let assembler = TransactionAssembler::new(
            config.evm_loader,
            config.token_mint,
            operator.pubkey(),
            operator_token,
            collateral_pool,
            config.collateral_pool_index,
        );

        tracing::info!(
            program_id = %config.evm_loader,
            %collateral_pool,
            operator = %operator.pubkey(),
            operator_eth = %operator.address(),
            mode = ?config.execute_mode,
            "neon evm client initialized"
        );

        Ok(Self {
            mode: ArcSwap::from_pointee(config.execute_mode),
            config,
            gateway,
            resolver,
            operator,
            assembler,
            caller_locks: DashMap::new(),
        })
    }

    pub fn execute_mode(&self) -> ExecuteMode {
        **self.mode.load()
    }

    /// Mode used by subsequent [`Self::send`] calls of this client.
    pub fn set_execute_mode(&self, mode: ExecuteMode) {
        tracing::debug!(?mode, "execute mode changed");
        self.mode.store(Arc::new(mode));
    }

    pub fn collateral_pool(&self) -> &Pubkey {
        self.assembler.collateral_pool()
    }

    pub fn assembler(&self) -> &TransactionAssembler {
        &self.assembler
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn resolve_caller(&self, ether: &Address) -> Result<ResolvedCaller, Error> {
        let (account, bump) = self.resolver.program_account(&ether.0 .0)?;
        let token = self.resolver.token_account(&account);
        Ok(ResolvedCaller {
            ether: *ether,
            account,
            token,
            bump,
        })
    }

    /// Storage account a run signed with `signature` would use.
    pub fn storage_account(&self, signature: &[u8; 65]) -> Result<StorageAccount, Error> {
        Ok(StorageAccount::derive(
            self.assembler.operator(),
            signature,
            self.assembler.program_id(),
        )?)
    }

    fn caller_lock(&self, caller: &Address) -> Arc<Mutex<()>> {
        self.caller_locks.entry(*caller).or_default().value().clone()
    }
}

/// ## Public execution API.
impl<G, R> NeonEvmClient<G, R>
where
    G: SubmissionGateway,
    R: AccountResolver,
{
    pub async fn send(&self, tx: &EthereumTransaction) -> Result<Executed, Failed> {
        self.send_cancellable(tx, &CancellationToken::new()).await
    }

    pub async fn send_cancellable(
        &self,
        tx: &EthereumTransaction,
        cancel: &CancellationToken,
    ) -> Result<Executed, Failed> {
        self.run(tx, self.execute_mode(), cancel).await
    }

    pub async fn send_with_mode(
        &self,
        tx: &EthereumTransaction,
        mode: ExecuteMode,
    ) -> Result<Executed, Failed> {
        self.run(tx, mode, &CancellationToken::new()).await
    }

    pub async fn send_with_mode_cancellable(
        &self,
        tx: &EthereumTransaction,
        mode: ExecuteMode,
        cancel: &CancellationToken,
    ) -> Result<Executed, Failed> {
        self.run(tx, mode, cancel).await
    }

    pub async fn send_single(&self, tx: &EthereumTransaction) -> Result<Executed, Failed> {
        self.run(tx, ExecuteMode::Single, &CancellationToken::new())
            .await
    }

    pub async fn send_single_cancellable(
        &self,
        tx: &EthereumTransaction,
        cancel: &CancellationToken,
    ) -> Result<Executed, Failed> {
        self.run(tx, ExecuteMode::Single, cancel).await
    }

    pub async fn send_iterative(&self, tx: &EthereumTransaction) -> Result<Executed, Failed> {
        self.run(tx, ExecuteMode::Iterative, &CancellationToken::new())
            .await
    }

    pub async fn send_iterative_cancellable(
        &self,
        tx: &EthereumTransaction,
        cancel: &CancellationToken,
    ) -> Result<Executed, Failed> {
        self.run(tx, ExecuteMode::Iterative, cancel).await
    }

    /// Create the program account of `ether` unless it already holds lamports.
    pub async fn create_ether_account(&self, ether: &Address) -> Result<Option<Signature>, Error> {
        self.create_ether_account_cancellable(ether, &CancellationToken::new())
            .await
    }

    pub async fn create_ether_account_cancellable(
        &self,
        ether: &Address,
        cancel: &CancellationToken,
    ) -> Result<Option<Signature>, Error> {
        let caller = self.resolve_caller(ether)?;
        self.ensure_ether_account(&caller, cancel).await
    }
}

/// ## Execution flow.
impl<G, R> NeonEvmClient<G, R>
where
    G: SubmissionGateway,
    R: AccountResolver,
{
    async fn run(
        &self,
        tx: &EthereumTransaction,
        mode: ExecuteMode,
        cancel: &CancellationToken,
    ) -> Result<Executed, Failed> {
        let mut ctx = ExecutionContext::new(mode);

        let operator = self.operator.address();
        if tx.caller != operator {
            let error = Error::CallerMismatch {
                caller: tx.caller,
                operator,
            };
            tracing::warn!(caller = %tx.caller, ?error, "execution rejected");
            return Err(Failed::new(error, ctx));
        }

        let lock = self.caller_lock(&tx.caller);
        let _guard = tokio::select! {
            guard = lock.lock() => guard,
            _ = cancel.cancelled() => return Err(Failed::new(Error::Cancelled, ctx)),
        };

        tracing::debug!(caller = %tx.caller, contract = %tx.contract, ?mode, steps = tx.steps, "start execution");
        let result = match mode {
            ExecuteMode::Single => self.execute_single(tx, &mut ctx, cancel).await,
            ExecuteMode::Iterative => self.execute_iterative(tx, &mut ctx, cancel).await,
        };

        match result {
            Ok(()) => {
                ctx.done();
                tracing::info!(
                    caller = %tx.caller,
                    ?mode,
                    iterations = ctx.iterations(),
                    storage = ?ctx.storage(),
                    "execution completed"
                );
                Ok(Executed { context: ctx })
            }
            Err(error) => {
                tracing::warn!(
                    caller = %tx.caller,
                    ?mode,
                    state = ?ctx.state(),
                    storage = ?ctx.pending_storage(),
                    ?error,
                    "execution failed"
                );
                Err(Failed::new(error, ctx))
            }
        }
    }

    async fn execute_single(
        &self,
        tx: &EthereumTransaction,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let (accounts, call) = self.prepare_call(tx, ctx, cancel).await?;
        let batch = self.assembler.single(&accounts, &call, &tx.extra_accounts)?;

        let outcome = self.submit(&batch, cancel).await?;
        ctx.step_submitted(outcome.signature);
        tracing::info!(signature = %outcome.signature, slot = outcome.slot, "single execution confirmed");
        Ok(())
    }

    async fn execute_iterative(
        &self,
        tx: &EthereumTransaction,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let (accounts, call) = self.prepare_call(tx, ctx, cancel).await?;
        let storage = self.prepare_storage(&call, ctx, cancel).await?;

        let mut batch = self.assembler.partial_call(
            &storage.pubkey,
            &accounts,
            &call,
            tx.steps,
            &tx.extra_accounts,
        )?;
        loop {
            if ctx.iterations() >= self.config.max_iterations {
                return Err(Error::IncompleteExecution {
                    iterations: ctx.iterations(),
                });
            }

            let outcome = self.submit(&batch, cancel).await?;
            ctx.step_submitted(outcome.signature);

            let finished = is_finished(&outcome, batch.neon_index());
            tracing::info!(
                signature = %outcome.signature,
                storage = %storage.pubkey,
                iteration = ctx.iterations(),
                finished,
                "execution step confirmed"
            );
            if finished {
                return Ok(());
            }

            batch = self.assembler.continue_call(
                &storage.pubkey,
                &accounts,
                tx.steps,
                &tx.extra_accounts,
            );
        }
    }

    /// Resolve and create the caller, then sign the call with its current nonce.
    async fn prepare_call(
        &self,
        tx: &EthereumTransaction,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(CallAccounts, SignedCall), Error> {
        let caller = self.resolve_caller(&tx.caller)?;
        self.ensure_ether_account(&caller, cancel).await?;
        ctx.caller_resolved(caller);

        let nonce = self.caller_nonce(&caller).await?;
        let accounts = CallAccounts {
            caller: caller.account,
            caller_token: caller.token,
            contract: tx.contract,
            contract_token: self.resolver.token_account(&tx.contract),
            contract_code: tx.contract_code,
        };

        let call = NeonCall {
            to: Address::from(solana_to_ether(&tx.contract)),
            nonce,
            data: tx.data.clone(),
            chain_id: self.config.chain_id,
            gas_limit: self.config.gas_limit,
            gas_price: self.config.gas_price,
        };
        let signed = self.operator.sign_neon_call(&call)?;
        tracing::debug!(caller = %tx.caller, nonce, ?signed, "signed ethereum call");

        Ok((accounts, signed))
    }

    async fn prepare_storage(
        &self,
        call: &SignedCall,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StorageAccount, Error> {
        let storage = self.storage_account(&call.signature)?;
        ctx.storage_derived(storage.pubkey);

        if self.gateway.balance(&storage.pubkey).await? == 0 {
            tracing::info!(storage = %storage.pubkey, seed = storage.seed, "creating storage account");
            let batch = self.assembler.create_storage(
                &storage,
                self.config.storage_lamports,
                self.config.storage_space,
            );
            self.submit(&batch, cancel).await?;
        }

        ctx.storage_ready();
        Ok(storage)
    }

    async fn ensure_ether_account(
        &self,
        caller: &ResolvedCaller,
        cancel: &CancellationToken,
    ) -> Result<Option<Signature>, Error> {
        if self.gateway.balance(&caller.account).await? > 0 {
            return Ok(None);
        }

        let funding = self
            .config
            .caller_token_funding_amount()
            .ok_or(ProgramError::ArithmeticOverflow)?;
        tracing::info!(caller = %caller.ether, account = %caller.account, funding, "creating ether account");
        let batch = self.assembler.create_ether_account(
            caller,
            self.config.ether_account_lamports,
            None,
            funding,
            self.config.token_decimals,
        )?;
        let outcome = self.submit(&batch, cancel).await?;
        Ok(Some(outcome.signature))
    }

    async fn caller_nonce(&self, caller: &ResolvedCaller) -> Result<u64, Error> {
        let data = self
            .gateway
            .account_data(&caller.account)
            .await?
            .ok_or(AccountResolutionError::MissingAccount(caller.account))?;
        Ok(decode_account_record(&data)?.trx_count)
    }

    async fn submit(
        &self,
        batch: &InstructionBatch,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(self.gateway.submit(batch.instructions(), cancel).await?)
    }
}

/// The run is over once the last inner instruction of the evm-loader call starts with the
/// return marker.
fn is_finished(outcome: &SubmitOutcome, neon_index: Option<u8>) -> bool {
    neon_index
        .and_then(|index| outcome.inner_instructions_of(index))
        .and_then(|instructions| instructions.last())
        .map_or(false, |data| is_finalize_marker(data))
}
