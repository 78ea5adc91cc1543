use std::fmt;
use std::path::Path;

use alloy_consensus::{SignableTransaction, TxLegacy};
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer::Signature as EthSignature;
use alloy_signer_wallet::LocalWallet;
use anyhow::anyhow;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::{EncodableKey, Signer, SignerError};

use crate::Error;

/// Legacy Ethereum call executed by the evm-loader on behalf of the operator.
#[derive(Debug, Clone)]
pub struct NeonCall {
    pub to: Address,
    pub nonce: u64,
    pub data: Bytes,
    pub chain_id: u64,
    pub gas_limit: u128,
    pub gas_price: u128,
}

/// Signed call in the shape the evm-loader expects: sender, `r || s || v` and
/// the unsigned EIP-155 RLP message.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedCall {
    pub from: [u8; 20],
    pub signature: [u8; 65],
    pub message: Vec<u8>,
}

impl SignedCall {
    pub fn payload(&self) -> Vec<u8> {
        let mut payload =
            Vec::with_capacity(self.from.len() + self.signature.len() + self.message.len());
        payload.extend_from_slice(&self.from);
        payload.extend_from_slice(&self.signature);
        payload.extend_from_slice(&self.message);
        payload
    }
}

impl fmt::Debug for SignedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedCall")
            .field("from", &hex::encode(self.from))
            .field("signature", &hex::encode(self.signature))
            .field("message_len", &self.message.len())
            .finish()
    }
}

pub struct Operator {
    sol_keypair: Keypair,
    eth_keypair: LocalWallet,
}

impl Operator {
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let sol_keypair = Keypair::read_from_file(path)
            .map_err(|err| Error::Load(anyhow!("cannot read keypair from file: {err:?}")))?;
        Self::from_keypair(sol_keypair)
    }

    pub fn from_keypair(sol_keypair: Keypair) -> Result<Self, Error> {
        let eth_keypair = LocalWallet::from_field_bytes(sol_keypair.secret().as_bytes().into())
            .map_err(|err| Error::Load(anyhow!("invalid ethereum key: {err}")))?;
        Ok(Self {
            sol_keypair,
            eth_keypair,
        })
    }

    pub fn address(&self) -> Address {
        self.eth_keypair.address()
    }

    pub fn pubkey(&self) -> Pubkey {
        self.sol_keypair.pubkey()
    }

    pub fn sign_eth_transaction(
        &self,
        tx: &mut dyn SignableTransaction<EthSignature>,
    ) -> Result<EthSignature, Error> {
        self.eth_keypair
            .sign_transaction_sync(tx)
            .map_err(Into::into)
    }

    /// Sign `call` as a legacy transaction with EIP-155 replay protection.
    pub fn sign_neon_call(&self, call: &NeonCall) -> Result<SignedCall, Error> {
        let mut tx = TxLegacy {
            nonce: call.nonce,
            gas_price: call.gas_price,
            gas_limit: call.gas_limit,
            to: TxKind::Call(call.to),
            value: U256::ZERO,
            input: call.data.clone(),
            chain_id: Some(call.chain_id),
        };
        let eth_signature = self.sign_eth_transaction(&mut tx)?;

        let mut signature = [0; 65];
        signature[..32].copy_from_slice(&eth_signature.r().to_be_bytes::<32>());
        signature[32..64].copy_from_slice(&eth_signature.s().to_be_bytes::<32>());
        signature[64] = eth_signature.v().y_parity_byte();

        let mut message = Vec::new();
        tx.encode_for_signing(&mut message);

        Ok(SignedCall {
            from: self.address().0 .0,
            signature,
            message,
        })
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("sol_keypair", &self.sol_keypair.pubkey())
            .field("eth_keypair", &self.eth_keypair.address())
            .finish()
    }
}

impl Signer for Operator {
    fn try_pubkey(&self) -> Result<Pubkey, SignerError> {
        self.sol_keypair.try_pubkey()
    }

    fn try_sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        self.sol_keypair.try_sign_message(message)
    }

    fn is_interactive(&self) -> bool {
        false
    }
}
