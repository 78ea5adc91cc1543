use solana_sdk::keccak;
use solana_sdk::pubkey::{Pubkey, PubkeyError};
use spl_associated_token_account::get_associated_token_address;
use thiserror::Error;

use crate::{EtherAddress, ETHER_ADDRESS_LEN};

pub const COLLATERAL_SEED_PREFIX: &str = "collateral_seed_";

#[derive(Debug, Error)]
pub enum AccountResolutionError {
    #[error("cannot derive seeded address: {0}")]
    Seed(#[from] PubkeyError),
    #[error("no program address for 0x{}", hex::encode(.0))]
    NoProgramAddress(EtherAddress),
    #[error("account {0} does not exist")]
    MissingAccount(Pubkey),
    #[error("{0}")]
    Other(String),
}

/// `sha256(base || seed || program_id)`.
pub fn seeded_address(
    base: &Pubkey,
    seed: &str,
    program_id: &Pubkey,
) -> Result<Pubkey, AccountResolutionError> {
    Ok(Pubkey::create_with_seed(base, seed, program_id)?)
}

pub fn collateral_pool_seed(index: u32) -> String {
    format!("{COLLATERAL_SEED_PREFIX}{index}")
}

pub fn collateral_pool_address(
    base: &Pubkey,
    index: u32,
    program_id: &Pubkey,
) -> Result<Pubkey, AccountResolutionError> {
    seeded_address(base, &collateral_pool_seed(index), program_id)
}

/// Ethereum address that mirrors a Solana account: the last 20 bytes of its keccak hash.
pub fn solana_to_ether(pubkey: &Pubkey) -> EtherAddress {
    let hash = keccak::hash(pubkey.as_ref()).to_bytes();
    let mut ether = [0; ETHER_ADDRESS_LEN];
    ether.copy_from_slice(&hash[hash.len() - ETHER_ADDRESS_LEN..]);
    ether
}

/// Account derivation rules owned by the evm-loader and the token program.
pub trait AccountResolver: Send + Sync {
    /// Program-derived account of an Ethereum address and its bump seed.
    fn program_account(&self, ether: &EtherAddress) -> Result<(Pubkey, u8), AccountResolutionError>;

    /// Token account holding the NEON balance of `owner`.
    fn token_account(&self, owner: &Pubkey) -> Pubkey;
}

#[derive(Debug, Clone)]
pub struct NeonAccountResolver {
    program_id: Pubkey,
    token_mint: Pubkey,
    seed_version: u8,
}

impl NeonAccountResolver {
    pub fn new(program_id: Pubkey, token_mint: Pubkey, seed_version: u8) -> Self {
        Self {
            program_id,
            token_mint,
            seed_version,
        }
    }
}

impl AccountResolver for NeonAccountResolver {
    fn program_account(&self, ether: &EtherAddress) -> Result<(Pubkey, u8), AccountResolutionError> {
        let seeds: &[&[u8]] = &[&[self.seed_version], ether];
        Pubkey::try_find_program_address(seeds, &self.program_id)
            .ok_or(AccountResolutionError::NoProgramAddress(*ether))
    }

    fn token_account(&self, owner: &Pubkey) -> Pubkey {
        get_associated_token_address(owner, &self.token_mint)
    }
}
