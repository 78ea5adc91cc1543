use common::address::{seeded_address, AccountResolutionError};
use common::solana_sdk::pubkey::Pubkey;
use common::ETH_SIGNATURE_LEN;

const SEED_SOURCE_LEN: usize = 8;

/// Seed of the storage account used by the run signed with `signature`.
pub fn storage_seed(signature: &[u8; ETH_SIGNATURE_LEN]) -> String {
    hex::encode(&signature[..SEED_SOURCE_LEN])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccount {
    pub pubkey: Pubkey,
    pub seed: String,
}

impl StorageAccount {
    pub fn derive(
        operator: &Pubkey,
        signature: &[u8; ETH_SIGNATURE_LEN],
        program_id: &Pubkey,
    ) -> Result<Self, AccountResolutionError> {
        let seed = storage_seed(signature);
        let pubkey = seeded_address(operator, &seed, program_id)?;
        Ok(Self { pubkey, seed })
    }
}
