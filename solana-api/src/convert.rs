use thiserror::Error;

use common::solana_sdk::signature::{ParseSignatureError, Signature};
use common::solana_transaction_status::option_serializer::OptionSerializer;
use common::solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction,
    EncodedTransactionWithStatusMeta, UiInnerInstructions, UiInstruction,
};
use common::types::{ConfirmedTransaction, InnerInstructionGroup};

#[derive(Debug, Error)]
pub enum TxDecodeError {
    #[error("absent transaction meta")]
    MissingMeta,
    #[error("absent transaction signature")]
    MissingSignature,
    #[error("invalid transaction signature: {0}")]
    InvalidSignature(#[from] ParseSignatureError),
    #[error("invalid transaction encoding ({0:?})")]
    InvalidEncoding(EncodedTransaction),
    #[error("parsed inner instruction in group {0}, expected compiled")]
    ParsedInstruction(u8),
    #[error("invalid inner instruction data: {0}")]
    InvalidData(#[from] bs58::decode::Error),
}

trait OptionSerializerExt {
    type Output;
    fn opt(self) -> Option<Self::Output>;
}

impl<T> OptionSerializerExt for OptionSerializer<T> {
    type Output = T;
    fn opt(self) -> Option<Self::Output> {
        self.into()
    }
}

/// Extract signature, status, inner instructions and logs from an RPC `getTransaction` response.
pub fn decode_confirmed_transaction(
    tx: EncodedConfirmedTransactionWithStatusMeta,
) -> Result<ConfirmedTransaction, TxDecodeError> {
    let EncodedConfirmedTransactionWithStatusMeta {
        slot,
        transaction:
            EncodedTransactionWithStatusMeta {
                transaction, meta, ..
            },
        ..
    } = tx;

    let meta = meta.ok_or(TxDecodeError::MissingMeta)?;
    let signature = first_signature(transaction)?;

    let inner_instructions = meta
        .inner_instructions
        .opt()
        .unwrap_or_default()
        .into_iter()
        .map(decode_inner_group)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConfirmedTransaction {
        signature,
        slot,
        status: meta.err.map_or(Ok(()), Err),
        inner_instructions,
        log_messages: meta.log_messages.opt().unwrap_or_default(),
    })
}

fn first_signature(transaction: EncodedTransaction) -> Result<Signature, TxDecodeError> {
    match transaction {
        EncodedTransaction::Json(ui_tx) => ui_tx
            .signatures
            .first()
            .ok_or(TxDecodeError::MissingSignature)?
            .parse()
            .map_err(Into::into),
        other => {
            let Some(tx) = other.decode() else {
                return Err(TxDecodeError::InvalidEncoding(other));
            };
            tx.signatures
                .first()
                .copied()
                .ok_or(TxDecodeError::MissingSignature)
        }
    }
}

fn decode_inner_group(group: UiInnerInstructions) -> Result<InnerInstructionGroup, TxDecodeError> {
    let UiInnerInstructions {
        index,
        instructions,
    } = group;
    let instructions = instructions
        .into_iter()
        .map(|ix| match ix {
            UiInstruction::Compiled(compiled) => Ok(bs58::decode(compiled.data).into_vec()?),
            UiInstruction::Parsed(_) => Err(TxDecodeError::ParsedInstruction(index)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InnerInstructionGroup {
        index,
        instructions,
    })
}
