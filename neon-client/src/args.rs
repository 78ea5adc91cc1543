use std::str::FromStr;

use alloy_primitives::{Address, Bytes};
use clap::{Args, Subcommand, ValueEnum};

use common::solana_sdk::instruction::AccountMeta;
use common::solana_sdk::pubkey::{ParsePubkeyError, Pubkey};
use common::ETH_SIGNATURE_LEN;
use executor::ExecuteMode;

/// Bytes of the signature that select a storage account.
const SIGNATURE_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the program account of an Ethereum address
    CreateAccount {
        #[arg(value_name = "ETHER")]
        ether: Address,
    },
    /// Execute a contract call signed by the operator
    Send(SendArgs),
    /// Print the storage account used by a signature
    StorageAddress {
        #[arg(value_name = "SIG_PREFIX", value_parser = parse_signature_prefix)]
        /// Hex encoded signature, at least its first 8 bytes
        signature_prefix: SignaturePrefix,
    },
    /// Print the collateral pool account
    CollateralPool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePrefix(pub Vec<u8>);

#[derive(Args)]
pub struct SendArgs {
    /// Contract account
    pub contract: Pubkey,

    /// Contract code account
    pub code: Pubkey,

    #[arg(value_parser = parse_hex_data, default_value = "")]
    /// Hex encoded call data
    pub data: Bytes,

    #[arg(long, value_enum)]
    /// Overrides `--execute-mode` for this call
    pub mode: Option<ExecuteMode>,

    #[arg(long, default_value_t = executor::EthereumTransaction::DEFAULT_STEPS)]
    /// EVM steps per iteration
    pub steps: u64,

    #[arg(long = "extra-account", value_name = "PUBKEY[:w]")]
    /// Additional account passed to execution instructions, `:w` marks it writable
    pub extra_accounts: Vec<ExtraAccount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraAccount {
    pub pubkey: Pubkey,
    pub writable: bool,
}

impl FromStr for ExtraAccount {
    type Err = ParsePubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, writable) = match s.strip_suffix(":w") {
            Some(key) => (key, true),
            None => (s, false),
        };
        Ok(Self {
            pubkey: key.parse()?,
            writable,
        })
    }
}

impl From<ExtraAccount> for AccountMeta {
    fn from(value: ExtraAccount) -> Self {
        if value.writable {
            AccountMeta::new(value.pubkey, false)
        } else {
            AccountMeta::new_readonly(value.pubkey, false)
        }
    }
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

fn parse_hex_data(s: &str) -> Result<Bytes, hex::FromHexError> {
    hex::decode(strip_0x(s)).map(Bytes::from)
}

fn parse_signature_prefix(s: &str) -> Result<SignaturePrefix, String> {
    let bytes = hex::decode(strip_0x(s)).map_err(|err| err.to_string())?;
    if !(SIGNATURE_PREFIX_LEN..=ETH_SIGNATURE_LEN).contains(&bytes.len()) {
        return Err(format!(
            "expected {SIGNATURE_PREFIX_LEN} to {ETH_SIGNATURE_LEN} bytes, got {}",
            bytes.len()
        ));
    }
    Ok(SignaturePrefix(bytes))
}
