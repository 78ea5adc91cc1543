
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::address::{AccountResolver, NeonAccountResolver};
use common::codec::{self, AccountRecord, PARTIAL_CALL_PAYLOAD_OFFSET};
use common::neon_instruction::tag;
use common::solana_sdk::instruction::{AccountMeta, Instruction};
use common::solana_sdk::program_error::ProgramError;
use common::solana_sdk::pubkey::Pubkey;
use common::solana_sdk::signature::{Keypair, Signature};
use common::solana_sdk::{secp256k1_program, system_program, sysvar};
use common::spl_token::instruction::TokenInstruction;
use common::{spl_associated_token_account, spl_token};
use operator::{Operator, SignedCall};

use self::mock::{Response, ScriptedGateway};
use super::*;

const PROGRAM_ID: Pubkey = Pubkey::new_from_array([0x11; 32]);
const TOKEN_MINT: Pubkey = Pubkey::new_from_array([0x22; 32]);
const CONTRACT: Pubkey = Pubkey::new_from_array([0x33; 32]);
const CONTRACT_CODE: Pubkey = Pubkey::new_from_array([0x44; 32]);
const TRX_COUNT: u64 = 7;

struct TestEnv {
    client: NeonEvmClient<ScriptedGateway, NeonAccountResolver>,
    operator: Arc<Operator>,
    resolver: NeonAccountResolver,
}

impl TestEnv {
    fn start() -> Self {
        Self::with_config(|_| ())
    }

    fn with_config(update: impl FnOnce(&mut Config)) -> Self {
        let operator = Arc::new(Operator::from_keypair(Keypair::new()).unwrap());
        let mut config = Config::new(PROGRAM_ID, TOKEN_MINT);
        update(&mut config);

        let resolver =
            NeonAccountResolver::new(config.evm_loader, config.token_mint, config.seed_version);
        let (caller, _) = resolver.program_account(&operator.address().0 .0).unwrap();

        let gateway = ScriptedGateway::default();
        gateway.set_default_balance(1);
        gateway.set_account(caller, account_record(TRX_COUNT));

        let client =
            NeonEvmClient::new(config, gateway, resolver.clone(), operator.clone()).unwrap();
        Self {
            client,
            operator,
            resolver,
        }
    }

    fn gateway(&self) -> &ScriptedGateway {
        self.client.gateway()
    }

    fn tx(&self) -> EthereumTransaction {
        EthereumTransaction::new(
            self.operator.address(),
            CONTRACT,
            CONTRACT_CODE,
            vec![0xde, 0xad, 0xbe, 0xef],
        )
    }

    fn caller(&self) -> ResolvedCaller {
        self.client.resolve_caller(&self.operator.address()).unwrap()
    }
}

fn account_record(trx_count: u64) -> Vec<u8> {
    let mut data = vec![0; AccountRecord::LEN];
    data[0] = 1;
    data[22..30].copy_from_slice(&trx_count.to_le_bytes());
    data
}

fn tag_of(batch: &[Instruction]) -> Option<u8> {
    batch
        .iter()
        .find(|ix| ix.program_id == PROGRAM_ID)
        .and_then(|ix| ix.data.first().copied())
}

fn is_step(batch: &[Instruction]) -> bool {
    matches!(
        tag_of(batch),
        Some(tag::PARTIAL_CALL_FROM_RAW_ETHEREUM_TX | tag::CONTINUE)
    )
}

fn step_submissions(gateway: &ScriptedGateway) -> Vec<Vec<Instruction>> {
    gateway
        .submissions()
        .into_iter()
        .filter(|batch| is_step(batch))
        .collect()
}

// ===== Execution loop =====

#[tokio::test]
async fn iterative_stops_on_marker() {
    let env = TestEnv::start();
    const N: usize = 3;
    env.gateway().push(Response::pending(1));
    for _ in 1..N {
        env.gateway().push(Response::pending(0));
    }
    env.gateway().push(Response::finished(0));

    let executed = env.client.send_iterative(&env.tx()).await.unwrap();

    let submissions = env.gateway().submissions();
    assert_eq!(submissions.len(), N + 1);
    assert_eq!(executed.signatures().len(), N + 1);
    assert_eq!(executed.context.state(), RunState::Done);
    assert_eq!(executed.context.iterations(), N as u32 + 1);

    let first = &submissions[0];
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].program_id, secp256k1_program::id());
    assert_eq!(first[1].data[0], tag::PARTIAL_CALL_FROM_RAW_ETHEREUM_TX);

    let storage = first[1].accounts[0].pubkey;
    assert_eq!(executed.context.storage(), Some(&storage));
    for batch in &submissions[1..] {
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].data, codec::encode_continue(EthereumTransaction::DEFAULT_STEPS));
        assert_eq!(batch[0].accounts[0].pubkey, storage);
    }
}

#[tokio::test]
async fn marker_in_first_step_finishes_run() {
    let env = TestEnv::start();
    env.gateway().push(Response::finished(1));

    let executed = env.client.send_iterative(&env.tx()).await.unwrap();
    assert_eq!(executed.signatures().len(), 1);
    assert_eq!(env.gateway().submissions().len(), 1);
}

#[tokio::test]
async fn iteration_cap_fails_run() {
    const K: u32 = 5;
    let env = TestEnv::with_config(|config| config.max_iterations = K);

    let failed = env.client.send_iterative(&env.tx()).await.unwrap_err();

    assert!(matches!(
        failed.error,
        Error::IncompleteExecution { iterations: K }
    ));
    assert_eq!(failed.state, RunState::StepSubmitted(K));
    assert_eq!(env.gateway().submissions().len(), K as usize);
    let storage = env.gateway().submissions()[0][1].accounts[0].pubkey;
    assert_eq!(failed.storage, Some(storage));
}

#[tokio::test]
async fn marker_must_be_last_inner_instruction() {
    let env = TestEnv::with_config(|config| config.max_iterations = 2);
    env.gateway().push(Response::Inner(vec![common::types::InnerInstructionGroup {
        index: 1,
        instructions: vec![vec![tag::ON_RETURN], vec![0x01]],
    }]));
    env.gateway().push(Response::pending(0));

    let failed = env.client.send_iterative(&env.tx()).await.unwrap_err();
    assert!(matches!(failed.error, Error::IncompleteExecution { iterations: 2 }));
}

#[tokio::test]
async fn marker_of_other_instruction_is_ignored() {
    let env = TestEnv::with_config(|config| config.max_iterations = 1);
    // Group 0 belongs to the secp256k1 instruction of the first batch.
    env.gateway().push(Response::finished(0));

    let failed = env.client.send_iterative(&env.tx()).await.unwrap_err();
    assert!(matches!(failed.error, Error::IncompleteExecution { iterations: 1 }));
}

#[tokio::test]
async fn gateway_failure_keeps_storage() {
    let env = TestEnv::start();
    env.gateway().push(Response::pending(1));
    env.gateway().push(Response::Error(GatewayError::Timeout(
        Signature::new_unique(),
        Duration::from_secs(30),
    )));

    let failed = env.client.send_iterative(&env.tx()).await.unwrap_err();

    assert!(matches!(
        failed.error,
        Error::Submission(GatewayError::Timeout(..))
    ));
    assert_eq!(failed.state, RunState::StepSubmitted(1));
    assert!(failed.storage.is_some());
    assert_eq!(failed.storage.as_ref(), failed.context.storage());
    assert_eq!(env.gateway().submissions().len(), 2);
}

#[tokio::test]
async fn cancellation_fails_run() {
    let env = TestEnv::start();
    env.gateway().push(Response::Hang);
    let cancel = CancellationToken::new();

    let (result, ()) = tokio::join!(
        env.client.send_iterative_cancellable(&env.tx(), &cancel),
        async {
            tokio::task::yield_now().await;
            cancel.cancel();
        }
    );

    let failed = result.unwrap_err();
    assert!(matches!(failed.error, Error::Cancelled));
    assert_ne!(failed.state, RunState::Done);
}

#[tokio::test]
async fn cancelled_token_submits_nothing() {
    let env = TestEnv::start();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let failed = env
        .client
        .send_single_cancellable(&env.tx(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(failed.error, Error::Cancelled));
    assert!(env.gateway().submissions().is_empty());
}

// ===== Storage account =====

#[tokio::test]
async fn storage_created_before_first_step() {
    let env = TestEnv::start();
    env.gateway().push(Response::Inner(Vec::new())); // storage creation
    env.gateway().push(Response::finished(1));

    // Storage address is not known in advance: only the caller is funded.
    env.gateway().set_default_balance(0);
    env.gateway().set_balance(env.caller().account, 1);

    let executed = env.client.send_iterative(&env.tx()).await.unwrap();

    let submissions = env.gateway().submissions();
    assert_eq!(submissions.len(), 2);
    let create = &submissions[0];
    assert_eq!(create.len(), 1);
    assert_eq!(create[0].program_id, system_program::id());

    let storage = *executed.context.storage().unwrap();
    assert_eq!(create[0].accounts[1].pubkey, storage);
    assert_eq!(submissions[1][1].accounts[0].pubkey, storage);

    let operator = env.operator.pubkey();
    let signature: [u8; 65] = {
        let data = &submissions[1][1].data;
        let start = PARTIAL_CALL_PAYLOAD_OFFSET as usize + 20;
        data[start..start + 65].try_into().unwrap()
    };
    let expected = StorageAccount::derive(&operator, &signature, &PROGRAM_ID).unwrap();
    assert_eq!(expected.pubkey, storage);
    assert_eq!(expected.seed, hex::encode(&signature[..8]));
}

#[tokio::test]
async fn funded_storage_is_reused() {
    let env = TestEnv::start();
    env.gateway().push(Response::finished(1));

    env.client.send_iterative(&env.tx()).await.unwrap();

    let submissions = env.gateway().submissions();
    assert_eq!(submissions.len(), 1);
    assert!(is_step(&submissions[0]));
}

#[test]
fn storage_depends_on_signature_prefix() {
    let env = TestEnv::start();
    let mut first = [1; 65];
    let mut second = [1; 65];
    second[64] = 0;
    let same_a = env.client.storage_account(&first).unwrap();
    let same_b = env.client.storage_account(&second).unwrap();
    assert_eq!(same_a, same_b);

    first[0] = 2;
    let other = env.client.storage_account(&first).unwrap();
    assert_ne!(other.pubkey, same_a.pubkey);
}

// ===== Mode dispatch =====

#[tokio::test]
async fn single_never_touches_storage() {
    let env = TestEnv::start();
    env.gateway().set_default_balance(0);
    env.gateway().set_balance(env.caller().account, 1);

    let executed = env.client.send_single(&env.tx()).await.unwrap();

    let submissions = env.gateway().submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0][0].program_id, secp256k1_program::id());
    assert_eq!(submissions[0][1].data[0], tag::CALL_FROM_RAW_ETHEREUM_TX);
    assert_eq!(executed.context.storage(), None);
    assert_eq!(executed.context.mode(), ExecuteMode::Single);
    assert_eq!(env.gateway().balance_requests(), vec![env.caller().account]);
}

#[tokio::test]
async fn send_follows_client_mode() {
    let env = TestEnv::start();
    assert_eq!(env.client.execute_mode(), ExecuteMode::Single);

    env.client.send(&env.tx()).await.unwrap();
    assert_eq!(
        tag_of(&env.gateway().submissions()[0]),
        Some(tag::CALL_FROM_RAW_ETHEREUM_TX)
    );

    env.client.set_execute_mode(ExecuteMode::Iterative);
    env.gateway().push(Response::finished(1));
    env.client.send(&env.tx()).await.unwrap();
    assert_eq!(
        tag_of(&env.gateway().submissions()[1]),
        Some(tag::PARTIAL_CALL_FROM_RAW_ETHEREUM_TX)
    );

    env.client.set_execute_mode(ExecuteMode::Single);
    env.client.send(&env.tx()).await.unwrap();
    assert_eq!(
        tag_of(&env.gateway().submissions()[2]),
        Some(tag::CALL_FROM_RAW_ETHEREUM_TX)
    );
}

#[test]
fn default_config_executes_single() {
    let config = Config::new(PROGRAM_ID, TOKEN_MINT);
    assert_eq!(config.execute_mode, ExecuteMode::Single);
    assert_eq!(config.caller_token_funding_amount(), Some(2_000_000_000_000));
}

#[tokio::test]
async fn explicit_mode_overrides_client_mode() {
    let env = TestEnv::with_config(|config| config.execute_mode = ExecuteMode::Iterative);

    env.client
        .send_with_mode(&env.tx(), ExecuteMode::Single)
        .await
        .unwrap();

    assert_eq!(step_submissions(env.gateway()).len(), 0);
    assert_eq!(env.client.execute_mode(), ExecuteMode::Iterative);
}

#[tokio::test]
async fn iterative_resolves_storage_before_first_step() {
    let env = TestEnv::start();
    env.gateway().push(Response::finished(1));

    env.client.send_iterative(&env.tx()).await.unwrap();

    let requests = env.gateway().balance_requests();
    let storage = env.gateway().submissions()[0][1].accounts[0].pubkey;
    assert_eq!(requests, vec![env.caller().account, storage]);
}

// ===== Caller =====

#[tokio::test]
async fn unfunded_caller_is_created() {
    let env = TestEnv::start();
    env.gateway().set_balance(env.caller().account, 0);

    env.client.send_single(&env.tx()).await.unwrap();

    let submissions = env.gateway().submissions();
    assert_eq!(submissions.len(), 2);
    let create = &submissions[0];
    assert_eq!(create.len(), 2);
    assert_eq!(&create[0].data[..4], &tag::CREATE_ACCOUNT.to_le_bytes());

    let caller = env.caller();
    let args = codec::decode_create_account(&create[0].data[4..]).unwrap();
    assert_eq!(args.ether, env.operator.address().0 .0);
    assert_eq!(args.nonce, caller.bump);
    assert_eq!(args.lamports, DEFAULT_ETHER_ACCOUNT_LAMPORTS);
    assert_eq!(args.space, 0);

    // 2000 whole tokens of a 9 decimals mint.
    assert_eq!(create[1].program_id, spl_token::id());
    assert_eq!(create[1].accounts[1].pubkey, TOKEN_MINT);
    assert_eq!(create[1].accounts[2].pubkey, caller.token);
    assert!(matches!(
        TokenInstruction::unpack(&create[1].data).unwrap(),
        TokenInstruction::TransferChecked {
            amount: 2_000_000_000_000,
            decimals: 9,
        }
    ));
}

#[tokio::test]
async fn zero_funding_skips_token_transfer() {
    let env = TestEnv::with_config(|config| config.caller_token_funding = 0);
    env.gateway().set_balance(env.caller().account, 0);

    env.client
        .create_ether_account(&env.operator.address())
        .await
        .unwrap();

    let submissions = env.gateway().submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].len(), 1);
}

#[tokio::test]
async fn overflowing_funding_is_rejected() {
    let env = TestEnv::with_config(|config| config.caller_token_funding = u64::MAX);
    env.gateway().set_balance(env.caller().account, 0);

    let err = env
        .client
        .create_ether_account(&env.operator.address())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Instruction(ProgramError::ArithmeticOverflow)));
    assert!(env.gateway().submissions().is_empty());
}

#[tokio::test]
async fn funded_caller_is_not_created() {
    let env = TestEnv::start();
    assert_eq!(env.client.create_ether_account(&env.operator.address()).await.unwrap(), None);
    assert!(env.gateway().submissions().is_empty());

    env.gateway().set_balance(env.caller().account, 0);
    let signature = env
        .client
        .create_ether_account(&env.operator.address())
        .await
        .unwrap();
    assert!(signature.is_some());
    assert_eq!(env.gateway().submissions().len(), 1);
}

#[tokio::test]
async fn missing_caller_record_fails_resolution() {
    let env = TestEnv::start();
    env.gateway().remove_account(&env.caller().account);

    let failed = env.client.send_single(&env.tx()).await.unwrap_err();
    assert!(matches!(
        failed.error,
        Error::AccountResolution(AccountResolutionError::MissingAccount(_))
    ));
    assert_eq!(failed.state, RunState::CallerResolved);
    assert!(env.gateway().submissions().is_empty());
}

#[tokio::test]
async fn short_caller_record_is_malformed() {
    let env = TestEnv::start();
    env.gateway().set_account(env.caller().account, vec![1; 10]);

    let failed = env.client.send_single(&env.tx()).await.unwrap_err();
    assert!(matches!(failed.error, Error::MalformedRecord(_)));
}

#[tokio::test]
async fn foreign_caller_is_rejected() {
    let env = TestEnv::start();
    let mut tx = env.tx();
    tx.caller = Address::repeat_byte(0x99);

    let failed = env.client.send(&tx).await.unwrap_err();
    assert!(matches!(failed.error, Error::CallerMismatch { .. }));
    assert_eq!(failed.state, RunState::Init);
    assert_eq!(failed.storage, None);
    assert!(env.gateway().submissions().is_empty());
    assert!(env.client.caller_locks.is_empty());
}

#[tokio::test]
async fn signed_call_uses_caller_nonce() {
    let env = TestEnv::start();
    env.client.send_single(&env.tx()).await.unwrap();

    let data = &env.gateway().submissions()[0][1].data;
    let message = &data[codec::CALL_PAYLOAD_OFFSET as usize + 85..];

    let expected = env
        .operator
        .sign_neon_call(&operator::NeonCall {
            to: Address::from(common::address::solana_to_ether(&CONTRACT)),
            nonce: TRX_COUNT,
            data: vec![0xde, 0xad, 0xbe, 0xef].into(),
            chain_id: DEFAULT_CHAIN_ID,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: DEFAULT_GAS_PRICE,
        })
        .unwrap();
    assert_eq!(message, expected.message.as_slice());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runs_of_one_caller_are_serialized() {
    let env = TestEnv::start();
    for _ in 0..2 {
        env.gateway().push(Response::pending(1));
        env.gateway().push(Response::finished(0));
    }

    let tx = env.tx();
    let (first, second) = tokio::join!(env.client.send_iterative(&tx), env.client.send_iterative(&tx));
    first.unwrap();
    second.unwrap();

    assert_eq!(env.gateway().max_in_flight(), 1);
    assert_eq!(env.gateway().submissions().len(), 4);
}

// ===== Account ordering =====

fn assembler() -> (TransactionAssembler, [Pubkey; 4]) {
    let operator = Pubkey::new_unique();
    let operator_token = Pubkey::new_unique();
    let collateral_pool = Pubkey::new_unique();
    let storage = Pubkey::new_unique();
    let assembler = TransactionAssembler::new(
        PROGRAM_ID,
        TOKEN_MINT,
        operator,
        operator_token,
        collateral_pool,
        DEFAULT_COLLATERAL_POOL_INDEX,
    );
    (assembler, [operator, operator_token, collateral_pool, storage])
}

fn call_accounts() -> CallAccounts {
    CallAccounts {
        caller: Pubkey::new_unique(),
        caller_token: Pubkey::new_unique(),
        contract: CONTRACT,
        contract_token: Pubkey::new_unique(),
        contract_code: CONTRACT_CODE,
    }
}

fn signed_call() -> SignedCall {
    SignedCall {
        from: [0xaa; 20],
        signature: [0xbb; 65],
        message: vec![0xcc; 40],
    }
}

#[test]
fn call_from_raw_tx_accounts() {
    let (assembler, [operator, operator_token, collateral_pool, _]) = assembler();
    let acc = call_accounts();

    assert_eq!(
        assembler.call_accounts(&acc),
        vec![
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
            AccountMeta::new(operator, true),
            AccountMeta::new(collateral_pool, false),
            AccountMeta::new(operator_token, false),
            AccountMeta::new(acc.caller_token, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new(acc.contract, false),
            AccountMeta::new(acc.contract_token, false),
            AccountMeta::new(acc.contract_code, false),
            AccountMeta::new(acc.caller, false),
            AccountMeta::new(acc.caller_token, false),
            AccountMeta::new_readonly(PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_MINT, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(operator, false),
        ]
    );
}

#[test]
fn partial_call_accounts() {
    let (assembler, [operator, _, collateral_pool, storage]) = assembler();
    let acc = call_accounts();

    assert_eq!(
        assembler.partial_call_accounts(&storage, &acc),
        vec![
            AccountMeta::new(storage, false),
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
            AccountMeta::new(operator, true),
            AccountMeta::new(collateral_pool, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new(acc.contract, false),
            AccountMeta::new(acc.contract_token, false),
            AccountMeta::new(acc.contract_code, false),
            AccountMeta::new(acc.caller, false),
            AccountMeta::new(acc.caller_token, false),
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
            AccountMeta::new_readonly(PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_MINT, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(operator, false),
        ]
    );
}

#[test]
fn continue_accounts() {
    let (assembler, [operator, operator_token, _, storage]) = assembler();
    let acc = call_accounts();

    assert_eq!(
        assembler.continue_accounts(&storage, &acc),
        vec![
            AccountMeta::new(storage, false),
            AccountMeta::new(operator, true),
            AccountMeta::new(operator_token, false),
            AccountMeta::new(acc.caller_token, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new(acc.contract, false),
            AccountMeta::new(acc.contract_token, false),
            AccountMeta::new(acc.contract_code, false),
            AccountMeta::new(acc.caller, false),
            AccountMeta::new(acc.caller_token, false),
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
            AccountMeta::new_readonly(PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_MINT, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(operator, false),
        ]
    );
}

#[test]
fn create_account_accounts() {
    let (assembler, [operator, ..]) = assembler();
    let caller = ResolvedCaller {
        ether: Address::repeat_byte(0x01),
        account: Pubkey::new_unique(),
        token: Pubkey::new_unique(),
        bump: 254,
    };
    let code = Pubkey::new_unique();

    let batch = assembler
        .create_ether_account(&caller, 10, Some(code), 0, DEFAULT_TOKEN_DECIMALS)
        .unwrap();
    assert_eq!(batch.instructions().len(), 1);
    assert_eq!(batch.neon_index(), None);
    assert_eq!(
        batch.instructions()[0].accounts,
        vec![
            AccountMeta::new_readonly(operator, true),
            AccountMeta::new(caller.account, false),
            AccountMeta::new(caller.token, false),
            AccountMeta::new(code, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(TOKEN_MINT, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ]
    );
}

#[test]
fn create_account_with_seed_accounts() {
    let (assembler, [operator, ..]) = assembler();
    let base = Pubkey::new_unique();
    let created = Pubkey::create_with_seed(&base, "seed", &PROGRAM_ID).unwrap();

    let ix = assembler.create_account_with_seed(&base, "seed", &created, 5, 6);
    assert_eq!(ix.program_id, PROGRAM_ID);
    assert_eq!(
        ix.data,
        codec::encode_create_account_with_seed(&base, "seed", 5, 6, &PROGRAM_ID, &created)
    );
    assert_eq!(
        ix.accounts,
        vec![
            AccountMeta::new_readonly(operator, true),
            AccountMeta::new(created, false),
            AccountMeta::new(base, false),
            AccountMeta::new(created, false),
            AccountMeta::new(PROGRAM_ID, false),
            AccountMeta::new(TOKEN_MINT, false),
            AccountMeta::new(spl_token::id(), false),
            AccountMeta::new(sysvar::rent::id(), false),
            AccountMeta::new(system_program::id(), false),
        ]
    );
}

#[test]
fn verify_precedes_call() {
    let (assembler, [.., storage]) = assembler();
    let call = signed_call();

    let single = assembler.single(&call_accounts(), &call, &[]).unwrap();
    let [verify, ix] = single.instructions() else {
        panic!("unexpected batch: {single:?}");
    };
    assert_eq!(single.neon_index(), Some(1));
    assert_eq!(verify.program_id, secp256k1_program::id());
    assert_eq!(
        verify.accounts,
        vec![AccountMeta::new_readonly(secp256k1_program::id(), false)]
    );
    assert_eq!(
        verify.data,
        codec::encode_secp256k1_verify(1, call.message.len(), codec::CALL_PAYLOAD_OFFSET).unwrap()
    );
    assert_eq!(
        ix.data,
        codec::encode_call_from_raw_tx(DEFAULT_COLLATERAL_POOL_INDEX, &call.payload())
    );

    let partial = assembler
        .partial_call(&storage, &call_accounts(), &call, 500, &[])
        .unwrap();
    assert_eq!(
        partial.instructions()[0].data,
        codec::encode_secp256k1_verify(1, call.message.len(), PARTIAL_CALL_PAYLOAD_OFFSET)
            .unwrap()
    );
    assert_eq!(
        partial.instructions()[1].data,
        codec::encode_partial_call(DEFAULT_COLLATERAL_POOL_INDEX, 500, &call.payload())
    );
}

#[test]
fn extra_accounts_go_to_last_instruction() {
    let (assembler, [.., storage]) = assembler();
    let extra = vec![
        AccountMeta::new(Pubkey::new_unique(), false),
        AccountMeta::new_readonly(Pubkey::new_unique(), false),
    ];
    let acc = call_accounts();

    let single = assembler.single(&acc, &signed_call(), &extra).unwrap();
    assert_eq!(single.instructions()[0].accounts.len(), 1);
    assert!(single.instructions()[1].accounts.ends_with(&extra));

    let cont = assembler.continue_call(&storage, &acc, 500, &extra);
    assert_eq!(cont.instructions()[0].accounts.len(), 15 + extra.len());
    assert!(cont.instructions()[0].accounts.ends_with(&extra));
}

#[test]
fn collateral_pool_is_derived_once() {
    let env = TestEnv::start();
    let expected = common::address::collateral_pool_address(
        &DEFAULT_COLLATERAL_POOL_BASE,
        DEFAULT_COLLATERAL_POOL_INDEX,
        &PROGRAM_ID,
    )
    .unwrap();
    assert_eq!(env.client.collateral_pool(), &expected);
    assert_eq!(
        env.client.assembler().collateral_pool(),
        env.client.collateral_pool()
    );
    assert_eq!(
        env.resolver.token_account(&env.operator.pubkey()),
        spl_associated_token_account::get_associated_token_address(
            &env.operator.pubkey(),
            &TOKEN_MINT
        )
    );
}
