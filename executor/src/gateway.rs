use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use common::solana_sdk::commitment_config::CommitmentConfig;
use common::solana_sdk::instruction::Instruction;
use common::solana_sdk::pubkey::Pubkey;
use common::solana_sdk::signature::Signature;
use common::solana_sdk::transaction::{Transaction, TransactionError};
use common::types::InnerInstructionGroup;
use operator::Operator;
use solana_api::convert::{decode_confirmed_transaction, TxDecodeError};
use solana_api::solana_api::SolanaApi;
use solana_api::solana_client::client_error::ClientError;

/// Confirmed submission as seen by the execution loop.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub signature: Signature,
    pub slot: u64,
    pub inner_instructions: Vec<InnerInstructionGroup>,
}

impl SubmitOutcome {
    pub fn inner_instructions_of(&self, index: u8) -> Option<&[Vec<u8>]> {
        self.inner_instructions
            .iter()
            .find(|group| group.index == index)
            .map(|group| group.instructions.as_slice())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transaction rejected: {0}")]
    Rejected(#[source] ClientError),
    #[error("transaction {signature} failed: {err}")]
    Failed {
        signature: Signature,
        err: TransactionError,
        logs: Vec<String>,
    },
    #[error("transaction {0} was not confirmed in {1:?}")]
    Timeout(Signature, Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("rpc error: {0}")]
    Rpc(#[from] ClientError),
    #[error("cannot decode transaction: {0}")]
    Decode(#[from] TxDecodeError),
}

/// Submits instruction batches and answers account queries.
pub trait SubmissionGateway: Send + Sync {
    /// Sign and send `instructions` as one transaction, then wait for its confirmation.
    fn submit(
        &self,
        instructions: &[Instruction],
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<SubmitOutcome, GatewayError>> + Send;

    fn balance(&self, key: &Pubkey) -> impl Future<Output = Result<u64, GatewayError>> + Send;

    fn account_data(
        &self,
        key: &Pubkey,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, GatewayError>> + Send;
}

#[derive(Debug, Clone)]
pub struct RpcGateway {
    solana_api: SolanaApi,
    operator: Arc<Operator>,
    confirm_timeout: Duration,
}

impl RpcGateway {
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(solana_api: SolanaApi, operator: Arc<Operator>, confirm_timeout: Duration) -> Self {
        Self {
            solana_api,
            operator,
            confirm_timeout,
        }
    }

    async fn wait_confirmation(
        &self,
        signature: Signature,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let commitment = CommitmentConfig {
            commitment: self.solana_api.commitment(),
        };
        let deadline = Instant::now() + self.confirm_timeout;

        loop {
            match self.solana_api.get_signature_statuses(&[signature]).await {
                Ok(statuses) => {
                    if let Some(Some(status)) = statuses.first() {
                        if status.satisfies_commitment(commitment) {
                            tracing::debug!(%signature, slot = status.slot, "transaction confirmed");
                            return Ok(());
                        }
                    }
                }
                Err(err) => tracing::warn!(%signature, ?err, "could not request signature status"),
            }

            if Instant::now() >= deadline {
                tracing::warn!(%signature, timeout = ?self.confirm_timeout, "confirmation timed out");
                return Err(GatewayError::Timeout(signature, self.confirm_timeout));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                _ = sleep(Self::POLL_INTERVAL) => (),
            }
        }
    }
}

impl SubmissionGateway for RpcGateway {
    async fn submit(
        &self,
        instructions: &[Instruction],
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let blockhash = self.solana_api.get_recent_blockhash().await?;
        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&self.operator.pubkey()),
            &[&*self.operator],
            blockhash,
        );
        let signature = self
            .solana_api
            .send_transaction(&tx)
            .await
            .map_err(GatewayError::Rejected)?;
        tracing::info!(%signature, instructions = instructions.len(), "sent transaction");

        self.wait_confirmation(signature, cancel).await?;

        let confirmed = decode_confirmed_transaction(self.solana_api.get_transaction(&signature).await?)?;
        if let Err(err) = confirmed.status {
            tracing::warn!(%signature, ?err, logs = ?confirmed.log_messages, "transaction failed");
            return Err(GatewayError::Failed {
                signature,
                err,
                logs: confirmed.log_messages,
            });
        }

        Ok(SubmitOutcome {
            signature: confirmed.signature,
            slot: confirmed.slot,
            inner_instructions: confirmed.inner_instructions,
        })
    }

    async fn balance(&self, key: &Pubkey) -> Result<u64, GatewayError> {
        Ok(self.solana_api.get_balance(key).await?)
    }

    async fn account_data(&self, key: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError> {
        let account = self.solana_api.get_account(key).await?;
        Ok(account.map(|account| account.data))
    }
}
