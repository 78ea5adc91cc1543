#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use common::solana_sdk::account::Account;
use common::solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use common::solana_sdk::hash::Hash;
use common::solana_sdk::pubkey::Pubkey;
use common::solana_sdk::signature::Signature;
use common::solana_sdk::transaction::Transaction;
use common::solana_transaction_status::EncodedConfirmedTransactionWithStatusMeta;
use common::solana_transaction_status::{TransactionStatus, UiTransactionEncoding};
use solana_client::client_error::Result as ClientResult;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::RpcClientConfig;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig};
use solana_client::rpc_sender::RpcSender;
use solana_rpc_client::http_sender::HttpSender;

use crate::metrics::metrics;

#[derive(Clone)]
pub struct SolanaApi {
    client: Arc<RpcClient>,
    commitment: CommitmentLevel,
}

impl std::fmt::Debug for SolanaApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaApi")
            .field("client", &"RpcClient")
            .field("commitment", &self.commitment)
            .finish()
    }
}

impl SolanaApi {
    pub fn new(endpoint: impl ToString, finalized: bool) -> Self {
        let commitment = if finalized {
            CommitmentLevel::Finalized
        } else {
            CommitmentLevel::Confirmed
        };
        Self::with_sender(LoggedSender(HttpSender::new(endpoint.to_string())), commitment)
    }

    pub fn with_sender(
        sender: impl RpcSender + Send + Sync + 'static,
        commitment: CommitmentLevel,
    ) -> Self {
        let config = RpcClientConfig::with_commitment(CommitmentConfig { commitment });
        Self {
            client: Arc::new(RpcClient::new_sender(sender, config)),
            commitment,
        }
    }

    pub fn commitment(&self) -> CommitmentLevel {
        self.commitment
    }

    pub async fn get_recent_blockhash(&self) -> ClientResult<Hash> {
        metrics().get_recent_blockhash.inc();
        self.client.get_latest_blockhash().await
    }

    pub async fn send_transaction(&self, transaction: &Transaction) -> ClientResult<Signature> {
        metrics().send_transaction.inc();
        self.client
            .send_transaction_with_config(
                transaction,
                RpcSendTransactionConfig {
                    preflight_commitment: Some(self.commitment),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> ClientResult<Vec<Option<TransactionStatus>>> {
        metrics().get_signature_statuses.inc();
        let res = self.client.get_signature_statuses(signatures).await?.value;
        Ok(res)
    }

    /// Request a transaction with its status meta (inner instructions, logs).
    pub async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> ClientResult<EncodedConfirmedTransactionWithStatusMeta> {
        metrics().get_transaction.inc();
        self.client
            .get_transaction_with_config(
                signature,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::Json),
                    commitment: Some(CommitmentConfig {
                        commitment: self.commitment,
                    }),
                    max_supported_transaction_version: Some(0),
                },
            )
            .await
    }

    pub async fn get_balance(&self, key: &Pubkey) -> ClientResult<u64> {
        metrics().get_balance.inc();
        self.client
            .get_balance_with_commitment(
                key,
                CommitmentConfig {
                    commitment: self.commitment,
                },
            )
            .await
            .map(|response| response.value)
    }

    pub async fn get_account(&self, key: &Pubkey) -> ClientResult<Option<Account>> {
        metrics().get_account.inc();
        self.client
            .get_account_with_commitment(
                key,
                CommitmentConfig {
                    commitment: self.commitment,
                },
            )
            .await
            .map(|response| response.value)
    }
}

struct LoggedSender(HttpSender);

#[async_trait]
impl RpcSender for LoggedSender {
    fn get_transport_stats(&self) -> solana_client::rpc_sender::RpcTransportStats {
        self.0.get_transport_stats()
    }

    fn url(&self) -> String {
        self.0.url()
    }

    async fn send(
        &self,
        request: solana_client::rpc_request::RpcRequest,
        params: serde_json::Value,
    ) -> ClientResult<serde_json::Value> {
        tracing::trace!(?request, ?params, "sending request");
        let result = self.0.send(request, params).await;
        tracing::trace!(?result, "request result");
        result
    }
}
