//! Fixed binary layouts of the evm-loader instructions and account records.
//!
//! Every function in this module is a pure transform, encoders never fail
//! except where an offset has to fit a narrower integer.
use std::mem;

use bytemuck::{pod_read_unaligned, Pod, Zeroable};
use solana_sdk::pubkey::{Pubkey, PUBKEY_BYTES};
use thiserror::Error;

use crate::neon_instruction::tag;
use crate::{EtherAddress, ETHER_ADDRESS_LEN, ETH_SIGNATURE_LEN};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed record: expected at least {expected} bytes, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },
    #[error("secp256k1 offsets do not fit into u16 (message length {0})")]
    MessageTooLong(usize),
}

fn ensure_len(data: &[u8], expected: usize) -> Result<(), CodecError> {
    if data.len() < expected {
        return Err(CodecError::MalformedRecord {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn read_u64_le(data: &[u8], idx: usize) -> u64 {
    let mut buf = [0; mem::size_of::<u64>()];
    buf.copy_from_slice(&data[idx..idx + mem::size_of::<u64>()]);
    u64::from_le_bytes(buf)
}

// ===== Create account =====

/// Body of the `CreateAccount` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateAccountArgs {
    pub lamports: u64,
    pub space: u64,
    pub ether: EtherAddress,
    pub nonce: u8,
}

impl CreateAccountArgs {
    const LAMPORTS_IDX: usize = 0;
    const SPACE_IDX: usize = Self::LAMPORTS_IDX + mem::size_of::<u64>();
    const ETHER_IDX: usize = Self::SPACE_IDX + mem::size_of::<u64>();
    const NONCE_IDX: usize = Self::ETHER_IDX + ETHER_ADDRESS_LEN;
    pub const LEN: usize = Self::NONCE_IDX + mem::size_of::<u8>();

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut data = [0; Self::LEN];
        data[Self::LAMPORTS_IDX..Self::SPACE_IDX].copy_from_slice(&self.lamports.to_le_bytes());
        data[Self::SPACE_IDX..Self::ETHER_IDX].copy_from_slice(&self.space.to_le_bytes());
        data[Self::ETHER_IDX..Self::NONCE_IDX].copy_from_slice(&self.ether);
        data[Self::NONCE_IDX] = self.nonce;
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        ensure_len(data, Self::LEN)?;

        let mut ether = [0; ETHER_ADDRESS_LEN];
        ether.copy_from_slice(&data[Self::ETHER_IDX..Self::NONCE_IDX]);
        Ok(Self {
            lamports: read_u64_le(data, Self::LAMPORTS_IDX),
            space: read_u64_le(data, Self::SPACE_IDX),
            ether,
            nonce: data[Self::NONCE_IDX],
        })
    }
}

pub fn encode_create_account(lamports: u64, space: u64, ether: &EtherAddress, nonce: u8) -> Vec<u8> {
    CreateAccountArgs {
        lamports,
        space,
        ether: *ether,
        nonce,
    }
    .encode()
    .to_vec()
}

pub fn decode_create_account(data: &[u8]) -> Result<CreateAccountArgs, CodecError> {
    CreateAccountArgs::decode(data)
}

/// Full instruction data: 4 byte tag followed by [`CreateAccountArgs`].
pub fn create_account_data(args: &CreateAccountArgs) -> Vec<u8> {
    let mut data = Vec::with_capacity(mem::size_of::<u32>() + CreateAccountArgs::LEN);
    data.extend_from_slice(&tag::CREATE_ACCOUNT.to_le_bytes());
    data.extend_from_slice(&args.encode());
    data
}

// ===== Ethereum transaction execution =====

const TAG_IDX: usize = 0;
const POOL_IDX_IDX: usize = TAG_IDX + mem::size_of::<u8>();
const STEP_COUNT_IDX: usize = POOL_IDX_IDX + mem::size_of::<u32>();
const CALL_PAYLOAD_IDX: usize = STEP_COUNT_IDX;
const PARTIAL_CALL_PAYLOAD_IDX: usize = STEP_COUNT_IDX + mem::size_of::<u64>();
const CONTINUE_END_IDX: usize = POOL_IDX_IDX + mem::size_of::<u64>();

/// Offset of the `from || signature || message` payload inside call-from-raw-tx data.
pub const CALL_PAYLOAD_OFFSET: u16 = CALL_PAYLOAD_IDX as u16;
/// Offset of the `from || signature || message` payload inside partial-call data.
pub const PARTIAL_CALL_PAYLOAD_OFFSET: u16 = PARTIAL_CALL_PAYLOAD_IDX as u16;

pub fn encode_call_from_raw_tx(collateral_pool_index: u32, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0; CALL_PAYLOAD_IDX];
    data[TAG_IDX] = tag::CALL_FROM_RAW_ETHEREUM_TX;
    data[POOL_IDX_IDX..STEP_COUNT_IDX].copy_from_slice(&collateral_pool_index.to_le_bytes());
    data.extend_from_slice(payload);
    data
}

pub fn encode_partial_call(collateral_pool_index: u32, step_count: u64, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0; PARTIAL_CALL_PAYLOAD_IDX];
    data[TAG_IDX] = tag::PARTIAL_CALL_FROM_RAW_ETHEREUM_TX;
    data[POOL_IDX_IDX..STEP_COUNT_IDX].copy_from_slice(&collateral_pool_index.to_le_bytes());
    data[STEP_COUNT_IDX..PARTIAL_CALL_PAYLOAD_IDX].copy_from_slice(&step_count.to_le_bytes());
    data.extend_from_slice(payload);
    data
}

pub fn encode_continue(step_count: u64) -> Vec<u8> {
    let mut data = vec![0; CONTINUE_END_IDX];
    data[TAG_IDX] = tag::CONTINUE;
    data[POOL_IDX_IDX..CONTINUE_END_IDX].copy_from_slice(&step_count.to_le_bytes());
    data
}

/// `CreateAccountWithSeed` as understood by the evm-loader.
pub fn encode_create_account_with_seed(
    base: &Pubkey,
    seed: &str,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
    created: &Pubkey,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(
        mem::size_of::<u32>() + 3 * PUBKEY_BYTES + 3 * mem::size_of::<u64>() + seed.len(),
    );
    data.extend_from_slice(&tag::CREATE_ACCOUNT_WITH_SEED.to_le_bytes());
    data.extend_from_slice(base.as_ref());
    data.extend_from_slice(&(seed.len() as u64).to_le_bytes());
    data.extend_from_slice(seed.as_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner.as_ref());
    data.extend_from_slice(created.as_ref());
    data
}

/// Inner instruction data with this first byte marks a finished execution.
pub fn is_finalize_marker(data: &[u8]) -> bool {
    data.first() == Some(&tag::ON_RETURN)
}

// ===== Secp256k1 verification =====

pub const SECP256K1_VERIFY_LEN: usize = 12;

/// Secp256k1 program payload that checks one signature embedded in another
/// instruction of the same transaction.
///
/// `data_start` points at `from(20) || signature(65) || message` inside the
/// instruction with index `instruction_index`.
pub fn encode_secp256k1_verify(
    instruction_index: u8,
    message_len: usize,
    data_start: u16,
) -> Result<Vec<u8>, CodecError> {
    const COUNT_IDX: usize = 0;
    const SIG_OFFSET_IDX: usize = COUNT_IDX + mem::size_of::<u8>();
    const SIG_IX_IDX: usize = SIG_OFFSET_IDX + mem::size_of::<u16>();
    const ETH_OFFSET_IDX: usize = SIG_IX_IDX + mem::size_of::<u8>();
    const ETH_IX_IDX: usize = ETH_OFFSET_IDX + mem::size_of::<u16>();
    const MSG_OFFSET_IDX: usize = ETH_IX_IDX + mem::size_of::<u8>();
    const MSG_LEN_IDX: usize = MSG_OFFSET_IDX + mem::size_of::<u16>();
    const MSG_IX_IDX: usize = MSG_LEN_IDX + mem::size_of::<u16>();
    const _: () = assert!(MSG_IX_IDX + 1 == SECP256K1_VERIFY_LEN);

    let too_long = || CodecError::MessageTooLong(message_len);
    let eth_offset = data_start;
    let sig_offset = eth_offset
        .checked_add(ETHER_ADDRESS_LEN as u16)
        .ok_or_else(too_long)?;
    let msg_offset = sig_offset
        .checked_add(ETH_SIGNATURE_LEN as u16)
        .ok_or_else(too_long)?;
    let msg_len = u16::try_from(message_len).map_err(|_| too_long())?;

    let mut data = vec![0; SECP256K1_VERIFY_LEN];
    data[COUNT_IDX] = 1;
    data[SIG_OFFSET_IDX..SIG_IX_IDX].copy_from_slice(&sig_offset.to_le_bytes());
    data[SIG_IX_IDX] = instruction_index;
    data[ETH_OFFSET_IDX..ETH_IX_IDX].copy_from_slice(&eth_offset.to_le_bytes());
    data[ETH_IX_IDX] = instruction_index;
    data[MSG_OFFSET_IDX..MSG_LEN_IDX].copy_from_slice(&msg_offset.to_le_bytes());
    data[MSG_LEN_IDX..MSG_IX_IDX].copy_from_slice(&msg_len.to_le_bytes());
    data[MSG_IX_IDX] = instruction_index;
    Ok(data)
}

// ===== Account record =====

// | Field          | Type       | Size | Offset |
// | -------------- | ---------- | ---- | ------ |
// | `tag`          | `u8`       | 1    | 0      |
// | `ether`        | `[u8; 20]` | 20   | 1      |
// | `nonce`        | `u8`       | 1    | 21     |
// | `trx_count`    | `u64` LE   | 8    | 22     |
// | `code_account` | `Pubkey`   | 32   | 30     |
// | `is_blocked`   | `u8`       | 1    | 62     |
// | `blocked_by`   | `Pubkey`   | 32   | 63     |
// | `eth_token`    | `Pubkey`   | 32   | 95     |
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RawAccountRecord {
    tag: u8,
    ether: [u8; ETHER_ADDRESS_LEN],
    nonce: u8,
    trx_count: [u8; 8],
    code_account: [u8; PUBKEY_BYTES],
    is_blocked: u8,
    blocked_by: [u8; PUBKEY_BYTES],
    eth_token: [u8; PUBKEY_BYTES],
}

/// Ethereum account state stored by the evm-loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub tag: u8,
    pub ether: EtherAddress,
    pub nonce: u8,
    pub trx_count: u64,
    pub code_account: Pubkey,
    pub is_blocked: bool,
    pub blocked_by: Pubkey,
    pub eth_token: Pubkey,
}

impl AccountRecord {
    pub const LEN: usize = mem::size_of::<RawAccountRecord>();

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        ensure_len(data, Self::LEN)?;
        let raw: RawAccountRecord = pod_read_unaligned(&data[..Self::LEN]);

        Ok(Self {
            tag: raw.tag,
            ether: raw.ether,
            nonce: raw.nonce,
            trx_count: u64::from_le_bytes(raw.trx_count),
            code_account: Pubkey::new_from_array(raw.code_account),
            is_blocked: raw.is_blocked != 0,
            blocked_by: Pubkey::new_from_array(raw.blocked_by),
            eth_token: Pubkey::new_from_array(raw.eth_token),
        })
    }
}

pub fn decode_account_record(data: &[u8]) -> Result<AccountRecord, CodecError> {
    AccountRecord::decode(data)
}
