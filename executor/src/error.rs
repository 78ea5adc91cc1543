use alloy_primitives::Address;
use thiserror::Error;

use common::address::AccountResolutionError;
use common::codec::CodecError;
use common::solana_sdk::program_error::ProgramError;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] CodecError),
    #[error("account resolution failed: {0}")]
    AccountResolution(#[from] AccountResolutionError),
    #[error("submission failed: {0}")]
    Submission(#[source] GatewayError),
    #[error("execution incomplete after {iterations} iterations")]
    IncompleteExecution { iterations: u32 },
    #[error("execution cancelled")]
    Cancelled,
    #[error("signing failed: {0}")]
    Signing(#[from] operator::Error),
    #[error("caller {caller} cannot be signed for by operator {operator}")]
    CallerMismatch { caller: Address, operator: Address },
    #[error("cannot build instruction: {0}")]
    Instruction(#[from] ProgramError),
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Cancelled => Self::Cancelled,
            err => Self::Submission(err),
        }
    }
}
