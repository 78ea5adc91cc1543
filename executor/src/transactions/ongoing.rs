use alloy_primitives::Address;

use common::solana_sdk::pubkey::Pubkey;
use common::solana_sdk::signature::Signature;

use crate::ExecuteMode;

/// Program-derived account of an Ethereum caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCaller {
    pub ether: Address,
    pub account: Pubkey,
    pub token: Pubkey,
    pub bump: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    CallerResolved,
    StorageReady,
    /// Number of execution steps submitted so far.
    StepSubmitted(u32),
    Done,
}

/// What a run has done so far. Fields are only ever filled in, never replaced.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    mode: ExecuteMode,
    state: RunState,
    caller: Option<ResolvedCaller>,
    storage: Option<Pubkey>,
    signatures: Vec<Signature>,
    iterations: u32,
}

impl ExecutionContext {
    pub(crate) fn new(mode: ExecuteMode) -> Self {
        Self {
            mode,
            state: RunState::Init,
            caller: None,
            storage: None,
            signatures: Vec::new(),
            iterations: 0,
        }
    }

    pub fn mode(&self) -> ExecuteMode {
        self.mode
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn caller(&self) -> Option<&ResolvedCaller> {
        self.caller.as_ref()
    }

    /// Storage account used by the run, kept after completion for reference.
    pub fn storage(&self) -> Option<&Pubkey> {
        self.storage.as_ref()
    }

    /// Signatures of every submitted execution step, in order.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub(crate) fn caller_resolved(&mut self, caller: ResolvedCaller) {
        debug_assert!(self.caller.is_none());
        self.caller.get_or_insert(caller);
        self.state = RunState::CallerResolved;
    }

    pub(crate) fn storage_derived(&mut self, storage: Pubkey) {
        debug_assert!(self.storage.is_none());
        self.storage.get_or_insert(storage);
    }

    pub(crate) fn storage_ready(&mut self) {
        debug_assert!(self.storage.is_some());
        self.state = RunState::StorageReady;
    }

    pub(crate) fn step_submitted(&mut self, signature: Signature) {
        self.signatures.push(signature);
        self.iterations += 1;
        self.state = RunState::StepSubmitted(self.iterations);
    }

    pub(crate) fn done(&mut self) {
        self.state = RunState::Done;
    }

    /// Storage account left behind by an unfinished run.
    pub fn pending_storage(&self) -> Option<Pubkey> {
        match self.state {
            RunState::Done => None,
            _ => self.storage,
        }
    }
}
