use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use common::solana_sdk::signature::Signature;
use serde_json::{json, Value};
use solana_client::client_error::ClientError;
use solana_client::rpc_request::RpcRequest;
use solana_client::rpc_sender::{RpcSender, RpcTransportStats};

type RequestResult = Result<Value, ClientError>;

#[derive(Default)]
pub struct SharedMock {
    pub once: DashMap<(RpcRequest, String), RequestResult>,
    // ClientError does not implement Clone, so we use this map only for positive requests.
    pub always: DashMap<(RpcRequest, String), Value>,
    /// Responses that ignore request params.
    pub any_params: DashMap<RpcRequest, Value>,
}

impl SharedMock {
    pub fn once(&self, request: RpcRequest, params: Value, result: RequestResult) {
        self.once.insert((request, params.to_string()), result);
    }

    pub fn always(&self, request: RpcRequest, params: Value, result: Value) {
        self.always.insert((request, params.to_string()), result);
    }

    pub fn any_params(&self, request: RpcRequest, result: Value) {
        self.any_params.insert(request, result);
    }
}

pub struct MockSender {
    pub(super) shared: Arc<SharedMock>,
}

impl MockSender {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let this = Self {
            shared: Arc::default(),
        };

        let version: Value =
            serde_json::from_str(r#"{"feature-set":4192065167,"solana-core":"1.18.11"}"#).unwrap();
        this.shared.any_params(RpcRequest::GetVersion, version);
        this
    }

    /// Handle for scripting responses after the sender moved into a client.
    pub fn shared(&self) -> Arc<SharedMock> {
        self.shared.clone()
    }
}

#[async_trait]
impl RpcSender for MockSender {
    async fn send(&self, request: RpcRequest, params: Value) -> RequestResult {
        tracing::info!(?request, ?params, "outgoing request");

        let params_str = serde_json::to_string(&params).expect("could not serialize params");

        let key = &(request, params_str);
        if let Some((_, response)) = self.shared.once.remove(key) {
            return response;
        }
        if let Some(response) = self.shared.always.get(key) {
            return Ok(response.clone());
        }
        match self.shared.any_params.get(&request) {
            Some(response) => Ok(response.clone()),
            None => panic!("no request: {request} {params}"),
        }
    }

    fn get_transport_stats(&self) -> RpcTransportStats {
        RpcTransportStats::default()
    }

    fn url(&self) -> String {
        String::new()
    }
}

/// `getTransaction` result in slot 321 with a single log line.
pub fn confirmed_transaction(signature: &Signature, err: Value, inner: Value) -> Value {
    json!({
        "slot": 321,
        "blockTime": null,
        "version": "legacy",
        "transaction": {
            "signatures": [signature.to_string()],
            "message": {
                "header": {
                    "numRequiredSignatures": 1,
                    "numReadonlySignedAccounts": 0,
                    "numReadonlyUnsignedAccounts": 1
                },
                "accountKeys": [
                    "11111111111111111111111111111111",
                    "KeccakSecp256k11111111111111111111111111111"
                ],
                "recentBlockhash": "11111111111111111111111111111111",
                "instructions": []
            }
        },
        "meta": {
            "err": err,
            "status": if err.is_null() { json!({"Ok": null}) } else { json!({"Err": err}) },
            "fee": 5000,
            "preBalances": [10, 0],
            "postBalances": [5, 0],
            "innerInstructions": inner,
            "logMessages": ["Program log: ok"],
            "preTokenBalances": [],
            "postTokenBalances": [],
            "rewards": [],
            "loadedAddresses": {"writable": [], "readonly": []},
            "computeUnitsConsumed": 1000
        }
    })
}

pub fn compiled_instruction(data: &[u8]) -> Value {
    json!({
        "programIdIndex": 1,
        "accounts": [0],
        "data": bs58::encode(data).into_string(),
        "stackHeight": 2
    })
}
