mod error;
mod operator;

use std::ffi::OsString;
use std::path::Path;

use clap::Args;

pub use error::Error;
pub use operator::{NeonCall, Operator, SignedCall};

fn default_kp_path() -> OsString {
    let config = solana_cli_config::Config::default();
    let path: &Path = config.keypair_path.as_ref();
    path.as_os_str().to_owned()
}

#[derive(Args)]
#[group(id = "OperatorConfig")]
pub struct Config {
    #[arg(long, env = "NEON_OPERATOR_KEYPAIR", default_value_os_t = default_kp_path())]
    /// Path to the operator keypair file
    pub operator_keypair: OsString,
}

impl Operator {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let path: &Path = config.operator_keypair.as_ref();
        tracing::info!(?path, "loading operator key");
        let operator = Self::read_from_file(path)?;
        tracing::info!(sol = %operator.pubkey(), eth = %operator.address(), "loaded key");
        Ok(operator)
    }
}
