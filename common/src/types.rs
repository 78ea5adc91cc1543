use std::fmt;

use solana_sdk::signature::Signature;
use solana_sdk::slot_history::Slot;
use solana_sdk::transaction::Result as TransactionResult;

/// Inner instructions emitted while executing one top-level instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InnerInstructionGroup {
    /// Index of the top-level instruction in the transaction.
    pub index: u8,
    /// Decoded instruction data, in execution order.
    pub instructions: Vec<Vec<u8>>,
}

/// The parts of a confirmed transaction the client inspects.
#[derive(Clone)]
pub struct ConfirmedTransaction {
    pub signature: Signature,
    pub slot: Slot,
    pub status: TransactionResult<()>,
    pub inner_instructions: Vec<InnerInstructionGroup>,
    pub log_messages: Vec<String>,
}

impl fmt::Debug for ConfirmedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner: Vec<_> = self
            .inner_instructions
            .iter()
            .map(|group| {
                let data: Vec<_> = group.instructions.iter().map(hex::encode).collect();
                (group.index, data)
            })
            .collect();
        f.debug_struct("ConfirmedTransaction")
            .field("signature", &self.signature)
            .field("slot", &self.slot)
            .field("status", &self.status)
            .field("inner_instructions", &inner)
            .field("log_messages", &self.log_messages.len())
            .finish()
    }
}
