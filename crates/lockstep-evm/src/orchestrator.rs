//! Call orchestrator
//!
//! Owns everything that outlives a single frame: storage and its
//! transaction-start snapshot, EIP-2929 access lists, the refund counter,
//! logs, transient storage and the stack of nested frames. Only the top
//! frame is ever mutated.
//!
//! Nested calls are driven in a loop over the frame stack: a CALL suspends
//! the caller, the callee is pushed and stepped, and its result is handed
//! back to the caller when it finishes. State changes are journaled so a
//! failed frame undoes only what it wrote.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use bytes::Bytes;
use lockstep_crypto::keccak256;
use lockstep_primitives::{Address, U256};
use rlp::RlpStream;
use tracing::{debug, trace};

use crate::context::Environment;
use crate::error::{EvmError, EvmResult, Log};
use crate::frame::ReferenceFrame;
use crate::gas::cost;
use crate::hardfork::Hardfork;
use crate::host::{CallKind, CallParams, CallResult, Host};
use crate::interpreter::Interpreter;

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Active hardfork
    pub hardfork: Hardfork,
    /// Gas subtracted before the top-level frame starts
    pub intrinsic_gas: u64,
    /// Deepest allowed nested frame
    pub max_call_depth: usize,
    /// Fail a PUSH whose immediate runs past the end of the code instead of
    /// zero-padding it
    pub reject_truncated_push: bool,
    /// Block and transaction environment
    pub environment: Environment,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            hardfork: Hardfork::default(),
            intrinsic_gas: cost::TX,
            max_call_depth: cost::MAX_CALL_DEPTH,
            reject_truncated_push: false,
            environment: Environment::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Default configuration for `hardfork`
    pub fn with_hardfork(hardfork: Hardfork) -> Self {
        Self { hardfork, ..Self::default() }
    }
}

type SlotKey = (Address, U256);

/// One state change, with the value it replaced
#[derive(Debug)]
enum JournalEntry {
    Storage { key: SlotKey, previous: Option<U256> },
    Transient { key: SlotKey, previous: Option<U256> },
    Balance { address: Address, previous: Option<U256> },
    Code { address: Address, previous: Option<Bytes> },
    Nonce { address: Address, previous: Option<u64> },
    Selfdestruct(Address),
    Created(Address),
}

/// Rollback point taken before a frame runs
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    journal_len: usize,
    gas_refund: i64,
    logs_len: usize,
}

/// Nested frame on the frame stack, paired with what its exit needs
#[derive(Debug)]
struct ActiveCall {
    checkpoint: Checkpoint,
    // address being deployed by CREATE/CREATE2
    created: Option<Address>,
}

enum CallStart {
    /// Finished without pushing a frame
    Done(CallResult),
    /// Callee frame pushed
    Entered,
}

/// Transaction state plus the nested frame stack of the reference EVM
pub struct CallOrchestrator {
    config: OrchestratorConfig,
    host: Option<Box<dyn Host>>,
    frames: Vec<ReferenceFrame>,
    calls: Vec<ActiveCall>,
    journal: Vec<JournalEntry>,

    storage: HashMap<SlotKey, U256>,
    original_storage: HashMap<SlotKey, U256>,
    transient: HashMap<SlotKey, U256>,
    warm_addresses: HashSet<Address>,
    warm_slots: HashSet<SlotKey>,
    // Intermediate values may dip below zero (EIP-2200 dirty-slot rows)
    gas_refund: i64,

    balances: HashMap<Address, U256>,
    code: HashMap<Address, Bytes>,
    nonces: HashMap<Address, u64>,
    logs: Vec<Log>,
    selfdestructs: HashSet<Address>,
    created: HashSet<Address>,
}

impl fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("hardfork", &self.config.hardfork)
            .field("has_host", &self.host.is_some())
            .field("frames", &self.frames.len())
            .field("journal", &self.journal.len())
            .field("warm_addresses", &self.warm_addresses.len())
            .field("warm_slots", &self.warm_slots.len())
            .field("gas_refund", &self.gas_refund)
            .finish()
    }
}

impl CallOrchestrator {
    /// Orchestrator that tracks all state locally
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            host: None,
            frames: Vec::new(),
            calls: Vec::new(),
            journal: Vec::new(),
            storage: HashMap::new(),
            original_storage: HashMap::new(),
            transient: HashMap::new(),
            warm_addresses: HashSet::new(),
            warm_slots: HashSet::new(),
            gas_refund: 0,
            balances: HashMap::new(),
            code: HashMap::new(),
            nonces: HashMap::new(),
            logs: Vec::new(),
            selfdestructs: HashSet::new(),
            created: HashSet::new(),
        }
    }

    /// Orchestrator delegating state and nested calls to `host`
    pub fn with_host(config: OrchestratorConfig, host: Box<dyn Host>) -> Self {
        let mut evm = Self::new(config);
        evm.host = Some(host);
        evm
    }

    /// Configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Active hardfork
    pub fn hardfork(&self) -> Hardfork {
        self.config.hardfork
    }

    /// Block and transaction environment
    pub fn environment(&self) -> &Environment {
        &self.config.environment
    }

    /// Mutable environment
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.config.environment
    }

    /// A host is attached
    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    /// Attached host
    pub fn host(&self) -> Option<&dyn Host> {
        self.host.as_deref()
    }

    // ==================== Account state ====================

    /// Balance of `address`
    pub fn balance(&self, address: &Address) -> U256 {
        match &self.host {
            Some(host) => host.get_balance(address),
            None => self.balances.get(address).copied().unwrap_or_default(),
        }
    }

    /// Seed a local balance
    pub fn set_balance(&mut self, address: Address, value: U256) {
        self.balances.insert(address, value);
    }

    /// Code of `address`
    pub fn code(&self, address: &Address) -> Bytes {
        match &self.host {
            Some(host) => host.get_code(address),
            None => self.code.get(address).cloned().unwrap_or_default(),
        }
    }

    /// Seed local code
    pub fn set_code(&mut self, address: Address, code: Bytes) {
        self.code.insert(address, code);
    }

    /// Nonce of `address`
    pub fn nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    /// Seed a local nonce
    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.nonces.insert(address, nonce);
    }

    /// Balance or code of `address` is known locally
    pub fn knows_account(&self, address: &Address) -> bool {
        self.balances.contains_key(address) || self.code.contains_key(address)
    }

    /// No code, no balance, zero nonce (EIP-161)
    pub fn is_empty_account(&self, address: &Address) -> bool {
        self.code(address).is_empty() && self.balance(address).is_zero() && self.nonce(address) == 0
    }

    /// Current value of a storage slot
    pub fn storage(&self, address: &Address, slot: &U256) -> U256 {
        match &self.host {
            Some(host) => host.get_storage(address, slot),
            None => self.storage.get(&(*address, *slot)).copied().unwrap_or_default(),
        }
    }

    /// Seed a local storage slot without gas or journaling
    pub fn set_storage(&mut self, address: Address, slot: U256, value: U256) {
        self.storage.insert((address, slot), value);
    }

    /// Slot is present in the local map
    pub fn knows_storage(&self, address: &Address, slot: &U256) -> bool {
        self.storage.contains_key(&(*address, *slot))
    }

    /// Snapshot taken at the slot's first access this transaction
    pub fn original_storage(&self, address: &Address, slot: &U256) -> Option<U256> {
        self.original_storage.get(&(*address, *slot)).copied()
    }

    /// Transient storage value (EIP-1153)
    pub fn transient_storage(&self, address: &Address, slot: &U256) -> U256 {
        self.transient.get(&(*address, *slot)).copied().unwrap_or_default()
    }

    /// Accumulated refund, clamped at zero
    pub fn gas_refund(&self) -> u64 {
        self.gas_refund.max(0) as u64
    }

    /// Refund actually granted for `gas_used`
    pub fn capped_refund(&self, gas_used: u64) -> u64 {
        self.gas_refund().min(gas_used / self.hardfork().refund_quotient())
    }

    /// Logs of the current (or last) transaction
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    // ==================== Access lists ====================

    /// Mark `address` warm; returns the access cost
    pub fn access_address(&mut self, address: Address) -> u64 {
        if !self.hardfork().has_access_lists() {
            return 0;
        }
        if self.warm_addresses.insert(address) {
            cost::COLD_ACCOUNT_ACCESS
        } else {
            cost::WARM_STORAGE_READ
        }
    }

    /// Mark a storage slot warm; returns the access cost
    pub fn access_storage_slot(&mut self, address: Address, slot: U256) -> u64 {
        if !self.hardfork().has_access_lists() {
            return 0;
        }
        if self.warm_slots.insert((address, slot)) {
            cost::COLD_SLOAD
        } else {
            cost::WARM_STORAGE_READ
        }
    }

    /// `address` is warm
    pub fn is_warm_address(&self, address: &Address) -> bool {
        self.warm_addresses.contains(address)
    }

    /// Storage slot is warm
    pub fn is_warm_storage_slot(&self, address: &Address, slot: &U256) -> bool {
        self.warm_slots.contains(&(*address, *slot))
    }

    // ==================== Transactions ====================

    /// Reset transaction-scoped state and pre-warm the access lists
    pub fn begin_transaction(&mut self, caller: Address, target: Address) {
        self.clear_transaction_state();
        self.logs.clear();

        let fork = self.hardfork();
        if !fork.has_access_lists() {
            return;
        }
        let origin = self.config.environment.tx.origin;
        self.warm_addresses.insert(origin);
        self.warm_addresses.insert(caller);
        if !target.is_zero() {
            self.warm_addresses.insert(target);
        }
        let last_precompile = if fork >= Hardfork::Cancun { 0x0a } else { 0x09 };
        for n in 1..=last_precompile {
            self.warm_addresses.insert(Address::from_low_u8(n));
        }
        if fork.warms_coinbase() {
            self.warm_addresses.insert(self.config.environment.block.coinbase);
        }
    }

    fn clear_transaction_state(&mut self) {
        self.warm_addresses.clear();
        self.warm_slots.clear();
        self.original_storage.clear();
        self.transient.clear();
        self.gas_refund = 0;
        self.selfdestructs.clear();
        self.created.clear();
        self.journal.clear();
    }

    fn end_transaction(&mut self, success: bool) {
        if success {
            let fork = self.hardfork();
            let destroyed: Vec<Address> = self
                .selfdestructs
                .iter()
                .filter(|a| fork < Hardfork::Cancun || self.created.contains(a))
                .copied()
                .collect();
            for address in destroyed {
                trace!(%address, "removing self-destructed account");
                self.balances.remove(&address);
                self.code.remove(&address);
                self.nonces.remove(&address);
                self.storage.retain(|(a, _), _| *a != address);
            }
        }
        self.clear_transaction_state();
    }

    /// Run one transaction against `address` with the given code.
    ///
    /// Subtracts the intrinsic cost, runs the frame to completion, then on
    /// success adds the capped refund to `gas_left`.
    pub fn execute(
        &mut self,
        bytecode: Bytes,
        gas: u64,
        caller: Address,
        address: Address,
        value: U256,
        calldata: Bytes,
    ) -> CallResult {
        self.begin_transaction(caller, address);

        let Some(frame_gas) = gas.checked_sub(self.config.intrinsic_gas) else {
            debug!(gas, intrinsic = self.config.intrinsic_gas, "gas below intrinsic cost");
            self.end_transaction(false);
            return CallResult::exceptional();
        };

        let checkpoint = self.checkpoint();
        let frame = ReferenceFrame::new(bytecode, frame_gas, caller, address, value, calldata);
        let mut result = match self.run_to_completion(frame) {
            Ok(frame) => Self::frame_result(&frame),
            Err(_) => CallResult::exceptional(),
        };

        if result.success {
            let gas_used = gas - result.gas_left;
            let refund = self.capped_refund(gas_used);
            debug!(gas_used, refund, "transaction complete");
            result.gas_left += refund;
        } else {
            self.revert_to(checkpoint);
            debug!(gas_left = result.gas_left, "transaction failed");
        }

        self.end_transaction(result.success);
        result
    }

    // ==================== Driven mode ====================

    /// Push a frame to be stepped with [`step`](Self::step)
    pub fn push_frame(&mut self, frame: ReferenceFrame) {
        self.frames.push(frame);
    }

    /// Execute one opcode in the top frame.
    ///
    /// A CALL or CREATE runs the callee, and everything it calls in turn,
    /// to completion before this returns.
    pub fn step(&mut self) -> EvmResult<()> {
        let Some(params) = self.advance_top()? else {
            return Ok(());
        };
        let result = self.inner_call(params);
        self.resume_top(result)
    }

    /// Top frame
    pub fn current_frame(&self) -> Option<&ReferenceFrame> {
        self.frames.last()
    }

    /// Mutable top frame
    pub fn current_frame_mut(&mut self) -> Option<&mut ReferenceFrame> {
        self.frames.last_mut()
    }

    /// Pop the top frame
    pub fn finish_frame(&mut self) -> Option<ReferenceFrame> {
        self.frames.pop()
    }

    /// Number of frames on the stack
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn run_to_completion(&mut self, frame: ReferenceFrame) -> EvmResult<ReferenceFrame> {
        let depth = frame.depth();
        self.push_frame(frame);
        while self.current_frame().is_some_and(|f| !f.is_finished()) {
            if let Err(err) = self.step() {
                debug!(depth, %err, "frame failed");
            }
        }
        self.finish_frame().ok_or(EvmError::NoActiveFrame)
    }

    fn advance_top(&mut self) -> EvmResult<Option<CallParams>> {
        let mut frame = self.frames.pop().ok_or(EvmError::NoActiveFrame)?;
        let result = Interpreter::new(&mut frame, self).advance();
        self.frames.push(frame);
        result
    }

    fn resume_top(&mut self, result: CallResult) -> EvmResult<()> {
        let mut frame = self.frames.pop().ok_or(EvmError::NoActiveFrame)?;
        let outcome = Interpreter::new(&mut frame, self).resume(result);
        self.frames.push(frame);
        outcome
    }

    fn frame_result(frame: &ReferenceFrame) -> CallResult {
        if frame.error().is_some() {
            CallResult::exceptional()
        } else if frame.is_reverted() {
            CallResult::failure(frame.gas_left(), frame.output().clone())
        } else {
            CallResult::success(frame.gas_left(), frame.output().clone())
        }
    }

    // ==================== Nested calls ====================

    /// Run a nested call to completion.
    ///
    /// Failures of the callee come back as an unsuccessful [`CallResult`];
    /// state changes made by a failed callee are rolled back, warm sets are
    /// not. A callee without code succeeds immediately with no output.
    pub fn inner_call(&mut self, params: CallParams) -> CallResult {
        let base = self.frames.len();
        match self.enter_call(params) {
            CallStart::Done(result) => result,
            CallStart::Entered => self.run_nested(base),
        }
    }

    // Step the frames above `base` until the callee pushed at `base`
    // returns. Suspended callers wait on the frame stack, so native stack
    // use does not grow with call depth.
    fn run_nested(&mut self, base: usize) -> CallResult {
        loop {
            let finished = match self.frames.last() {
                Some(frame) => frame.is_finished(),
                None => return CallResult::exceptional(),
            };
            if finished {
                let result = self.exit_call();
                if self.frames.len() <= base {
                    return result;
                }
                if let Err(err) = self.resume_top(result) {
                    debug!(depth = self.frames.len(), %err, "caller failed on resume");
                }
                continue;
            }

            match self.advance_top() {
                Ok(Some(params)) => {
                    if let CallStart::Done(result) = self.enter_call(params) {
                        if let Err(err) = self.resume_top(result) {
                            debug!(depth = self.frames.len(), %err, "caller failed on resume");
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => debug!(depth = self.frames.len(), %err, "frame failed"),
            }
        }
    }

    fn enter_call(&mut self, params: CallParams) -> CallStart {
        let gas = params.gas;
        match self.try_enter_call(params) {
            Ok(start) => start,
            Err(err) => {
                debug!(%err, "nested call rejected");
                let result = match err {
                    EvmError::CreateCollision => CallResult::exceptional(),
                    _ => CallResult::failure(gas, Bytes::new()),
                };
                CallStart::Done(result)
            }
        }
    }

    fn try_enter_call(&mut self, params: CallParams) -> EvmResult<CallStart> {
        if params.depth > self.config.max_call_depth {
            return Err(EvmError::CallDepthExceeded);
        }
        if let Some(host) = self.host.as_mut() {
            return Ok(CallStart::Done(host.inner_call(&params)));
        }
        if params.kind.is_create() {
            return self.enter_create(params);
        }

        let moves_value = matches!(params.kind, CallKind::Call | CallKind::CallCode);
        if moves_value && self.balance(&params.caller) < params.value {
            return Err(EvmError::InsufficientBalance);
        }

        let checkpoint = self.checkpoint();
        if params.kind == CallKind::Call {
            self.transfer(params.caller, params.address, params.value);
        }

        let code = self.code(&params.code_address);
        if code.is_empty() {
            trace!(target = %params.code_address, "call to account without code");
            return Ok(CallStart::Done(CallResult::success(params.gas, Bytes::new())));
        }

        let frame = ReferenceFrame::new(
            code,
            params.gas,
            params.caller,
            params.address,
            params.value,
            params.input,
        )
        .with_static(params.is_static)
        .with_depth(params.depth);
        self.enter_frame(frame, checkpoint, None);
        Ok(CallStart::Entered)
    }

    fn enter_create(&mut self, params: CallParams) -> EvmResult<CallStart> {
        let creator = params.caller;
        if self.balance(&creator) < params.value {
            return Err(EvmError::InsufficientBalance);
        }
        let nonce = self.nonce(&creator);
        let next_nonce = nonce.checked_add(1).ok_or(EvmError::NonceOverflow)?;

        let address = match params.kind {
            CallKind::Create2 { salt } => create2_address(&creator, salt, &params.input),
            _ => create_address(&creator, nonce),
        };
        self.write_nonce(creator, next_nonce);
        if self.hardfork().has_access_lists() {
            self.warm_addresses.insert(address);
        }

        if !self.code(&address).is_empty() || self.nonce(&address) > 0 {
            return Err(EvmError::CreateCollision);
        }

        let checkpoint = self.checkpoint();
        if self.hardfork() >= Hardfork::SpuriousDragon {
            self.write_nonce(address, 1);
        }
        self.transfer(creator, address, params.value);
        if self.created.insert(address) {
            self.journal.push(JournalEntry::Created(address));
        }

        let frame = ReferenceFrame::new(
            params.input,
            params.gas,
            creator,
            address,
            params.value,
            Bytes::new(),
        )
        .with_depth(params.depth);
        self.enter_frame(frame, checkpoint, Some(address));
        Ok(CallStart::Entered)
    }

    fn enter_frame(&mut self, frame: ReferenceFrame, checkpoint: Checkpoint, created: Option<Address>) {
        trace!(depth = frame.depth(), address = %frame.address(), "entering frame");
        self.frames.push(frame);
        self.calls.push(ActiveCall { checkpoint, created });
    }

    // Pop a finished callee, deploy its code for CREATE and roll back its
    // writes when it failed
    fn exit_call(&mut self) -> CallResult {
        let (Some(frame), Some(call)) = (self.frames.pop(), self.calls.pop()) else {
            return CallResult::exceptional();
        };
        let mut result = Self::frame_result(&frame);

        if let Some(address) = call.created.filter(|_| result.success) {
            result = match self.deposit_code(address, &result.output, result.gas_left) {
                Ok(gas_left) => CallResult {
                    success: true,
                    gas_left,
                    output: Bytes::new(),
                    created: Some(address),
                },
                Err(err) => {
                    debug!(%address, %err, "code deposit failed");
                    CallResult::exceptional()
                }
            };
        }
        if !result.success {
            self.revert_to(call.checkpoint);
        }
        trace!(depth = frame.depth(), success = result.success, gas_left = result.gas_left, "frame returned");
        result
    }

    fn deposit_code(&mut self, address: Address, code: &Bytes, gas_left: u64) -> EvmResult<u64> {
        let fork = self.hardfork();
        if fork >= Hardfork::London && code.first() == Some(&0xEF) {
            return Err(EvmError::InvalidCodePrefix);
        }
        if fork >= Hardfork::SpuriousDragon && code.len() > cost::MAX_CODE_SIZE {
            return Err(EvmError::MaxCodeSizeExceeded);
        }
        let deposit = cost::CODE_DEPOSIT * code.len() as u64;
        let remaining = gas_left.checked_sub(deposit).ok_or(EvmError::OutOfGas)?;
        self.write_code(address, code.clone());
        Ok(remaining)
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) {
        if value.is_zero() || from == to || self.host.is_some() {
            return;
        }
        let from_balance = self.balance(&from);
        let to_balance = self.balance(&to);
        self.write_balance(from, from_balance.saturating_sub(value));
        self.write_balance(to, to_balance.saturating_add(value));
    }

    // ==================== Journal ====================

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            journal_len: self.journal.len(),
            gas_refund: self.gas_refund,
            logs_len: self.logs.len(),
        }
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) {
        let at = checkpoint.journal_len.min(self.journal.len());
        let undone = self.journal.split_off(at);
        for entry in undone.into_iter().rev() {
            match entry {
                JournalEntry::Storage { key, previous } => restore(&mut self.storage, key, previous),
                JournalEntry::Transient { key, previous } => restore(&mut self.transient, key, previous),
                JournalEntry::Balance { address, previous } => restore(&mut self.balances, address, previous),
                JournalEntry::Code { address, previous } => restore(&mut self.code, address, previous),
                JournalEntry::Nonce { address, previous } => restore(&mut self.nonces, address, previous),
                JournalEntry::Selfdestruct(address) => {
                    self.selfdestructs.remove(&address);
                }
                JournalEntry::Created(address) => {
                    self.created.remove(&address);
                }
            }
        }
        self.gas_refund = checkpoint.gas_refund;
        self.logs.truncate(checkpoint.logs_len);
    }

    fn write_storage(&mut self, key: SlotKey, value: U256) {
        let previous = self.storage.insert(key, value);
        self.journal.push(JournalEntry::Storage { key, previous });
    }

    fn write_balance(&mut self, address: Address, value: U256) {
        let previous = self.balances.insert(address, value);
        self.journal.push(JournalEntry::Balance { address, previous });
    }

    fn write_code(&mut self, address: Address, code: Bytes) {
        let previous = self.code.insert(address, code);
        self.journal.push(JournalEntry::Code { address, previous });
    }

    fn write_nonce(&mut self, address: Address, nonce: u64) {
        let previous = self.nonces.insert(address, nonce);
        self.journal.push(JournalEntry::Nonce { address, previous });
    }

    // ==================== Interpreter hooks ====================

    /// Snapshot the slot's transaction-start value on first use
    pub(crate) fn original_value(&mut self, address: Address, slot: U256) -> U256 {
        if let Some(value) = self.original_storage.get(&(address, slot)) {
            return *value;
        }
        let value = match &self.host {
            Some(host) => host
                .get_cached_storage_read(&address, &slot)
                .unwrap_or_else(|| host.get_storage(&address, &slot)),
            None => self.storage(&address, &slot),
        };
        self.original_storage.insert((address, slot), value);
        value
    }

    pub(crate) fn sstore(&mut self, address: Address, slot: U256, value: U256) -> EvmResult<()> {
        self.original_value(address, slot);
        match self.host.as_mut() {
            Some(host) => host.set_storage(&address, slot, value),
            None => {
                self.write_storage((address, slot), value);
                Ok(())
            }
        }
    }

    pub(crate) fn add_refund(&mut self, delta: i64) {
        self.gas_refund = self.gas_refund.saturating_add(delta);
    }

    pub(crate) fn tstore(&mut self, address: Address, slot: U256, value: U256) {
        let key = (address, slot);
        let previous = if value.is_zero() {
            self.transient.remove(&key)
        } else {
            self.transient.insert(key, value)
        };
        self.journal.push(JournalEntry::Transient { key, previous });
    }

    pub(crate) fn push_log(&mut self, log: Log) {
        self.logs.push(log);
    }

    /// Record a self-destruct; true when `address` had not already been
    /// destructed in this transaction
    pub(crate) fn selfdestruct(&mut self, address: Address, beneficiary: Address) -> bool {
        let balance = self.balance(&address);
        self.transfer(address, beneficiary, balance);
        let burns = beneficiary == address
            && (self.hardfork() < Hardfork::Cancun || self.created.contains(&address));
        if burns && self.host.is_none() {
            self.write_balance(address, U256::zero());
        }
        let first = self.selfdestructs.insert(address);
        if first {
            self.journal.push(JournalEntry::Selfdestruct(address));
        }
        first
    }
}

fn restore<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

/// CREATE address: `keccak256(rlp([sender, nonce]))[12..]`
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.as_bytes().to_vec());
    if nonce == 0 {
        stream.append_empty_data();
    } else {
        stream.append(&nonce);
    }
    Address::from_word(&keccak256(&stream.out()).to_word())
}

/// CREATE2 address: `keccak256(0xff ++ sender ++ salt ++ keccak256(init))[12..]`
pub fn create2_address(sender: &Address, salt: U256, init_code: &[u8]) -> Address {
    let mut buf = Vec::with_capacity(85);
    buf.push(0xFF);
    buf.extend_from_slice(sender.as_bytes());
    buf.extend_from_slice(&lockstep_primitives::word_to_bytes(&salt));
    buf.extend_from_slice(keccak256(init_code).as_bytes());
    Address::from_word(&keccak256(&buf).to_word())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_low_u8(n)
    }

    #[test]
    fn test_create_address_vectors() {
        let sender = Address::from_hex("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();
        assert_eq!(
            create_address(&sender, 0),
            Address::from_hex("0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap()
        );
        assert_eq!(
            create_address(&sender, 1),
            Address::from_hex("0x343c43a37d37dff08ae8c4a11544c718abb4fcf8").unwrap()
        );
    }

    #[test]
    fn test_create2_address_vector() {
        // EIP-1014 example 0
        assert_eq!(
            create2_address(&Address::ZERO, U256::zero(), &[0x00]),
            Address::from_hex("0x4D1A2e2bB4F88F0250f26Ffff098B0b30B26BF38").unwrap()
        );
    }

    #[test]
    fn test_access_address_cold_then_warm() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        assert_eq!(evm.access_address(addr(0x42)), cost::COLD_ACCOUNT_ACCESS);
        assert_eq!(evm.access_address(addr(0x42)), cost::WARM_STORAGE_READ);
        assert!(evm.is_warm_address(&addr(0x42)));
    }

    #[test]
    fn test_access_lists_disabled_before_berlin() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::with_hardfork(Hardfork::Istanbul));
        assert_eq!(evm.access_address(addr(0x42)), 0);
        assert_eq!(evm.access_storage_slot(addr(0x42), U256::one()), 0);
    }

    #[test]
    fn test_begin_transaction_prewarms() {
        let mut config = OrchestratorConfig::default();
        config.environment.block.coinbase = addr(0xCB);
        let mut evm = CallOrchestrator::new(config);
        evm.begin_transaction(addr(1), addr(2));
        assert!(evm.is_warm_address(&addr(2)));
        assert!(evm.is_warm_address(&addr(0xCB)));
        assert!(evm.is_warm_address(&Address::from_low_u8(0x0a)));

        let mut london = CallOrchestrator::new(OrchestratorConfig {
            hardfork: Hardfork::London,
            ..Default::default()
        });
        london.environment_mut().block.coinbase = addr(0xCB);
        london.begin_transaction(addr(1), addr(2));
        assert!(!london.is_warm_address(&addr(0xCB)));
    }

    #[test]
    fn test_refund_cap() {
        let mut berlin = CallOrchestrator::new(OrchestratorConfig::with_hardfork(Hardfork::Berlin));
        berlin.add_refund(30_000);
        assert_eq!(berlin.capped_refund(40_000), 20_000);
        assert_eq!(berlin.capped_refund(100_000), 30_000);

        let mut london = CallOrchestrator::new(OrchestratorConfig::with_hardfork(Hardfork::London));
        london.add_refund(30_000);
        assert_eq!(london.capped_refund(40_000), 8_000);
    }

    #[test]
    fn test_negative_refund_clamped_on_read() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        evm.add_refund(-100);
        assert_eq!(evm.gas_refund(), 0);
        evm.add_refund(300);
        assert_eq!(evm.gas_refund(), 200);
    }

    #[test]
    fn test_original_value_first_write_wins() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        evm.set_storage(addr(1), U256::one(), U256::from(7));
        evm.sstore(addr(1), U256::one(), U256::from(8)).unwrap();
        evm.sstore(addr(1), U256::one(), U256::from(9)).unwrap();
        assert_eq!(evm.original_storage(&addr(1), &U256::one()), Some(U256::from(7)));
        assert_eq!(evm.storage(&addr(1), &U256::one()), U256::from(9));
    }

    #[test]
    fn test_step_without_frame() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        assert_eq!(evm.step(), Err(EvmError::NoActiveFrame));
    }

    #[test]
    fn test_call_to_empty_code_is_noop_success() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        let result = evm.inner_call(CallParams {
            kind: CallKind::Call,
            caller: addr(1),
            address: addr(2),
            code_address: addr(2),
            value: U256::zero(),
            input: Bytes::new(),
            gas: 5000,
            is_static: false,
            depth: 1,
        });
        assert!(result.success);
        assert_eq!(result.gas_left, 5000);
        assert!(result.output.is_empty());
    }

    #[test]
    fn test_call_depth_rejected() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        let result = evm.inner_call(CallParams {
            kind: CallKind::Call,
            caller: addr(1),
            address: addr(2),
            code_address: addr(2),
            value: U256::zero(),
            input: Bytes::new(),
            gas: 5000,
            is_static: false,
            depth: 1025,
        });
        assert!(!result.success);
        assert_eq!(result.gas_left, 5000);
    }

    fn call_params(kind: CallKind, caller: Address, target: Address, value: u64) -> CallParams {
        CallParams {
            kind,
            caller,
            address: target,
            code_address: target,
            value: U256::from(value),
            input: Bytes::new(),
            gas: 5000,
            is_static: false,
            depth: 1,
        }
    }

    #[test]
    fn test_revert_undoes_only_later_writes() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        evm.sstore(addr(1), U256::one(), U256::from(1)).unwrap();
        let checkpoint = evm.checkpoint();

        evm.sstore(addr(1), U256::one(), U256::from(2)).unwrap();
        evm.sstore(addr(1), U256::from(2), U256::from(3)).unwrap();
        evm.tstore(addr(1), U256::one(), U256::from(4));
        evm.write_balance(addr(3), U256::from(5));
        evm.add_refund(100);
        evm.revert_to(checkpoint);

        assert_eq!(evm.storage(&addr(1), &U256::one()), U256::from(1));
        assert!(!evm.knows_storage(&addr(1), &U256::from(2)));
        assert_eq!(evm.transient_storage(&addr(1), &U256::one()), U256::zero());
        assert!(!evm.knows_account(&addr(3)));
        assert_eq!(evm.gas_refund(), 0);
    }

    #[test]
    fn test_call_without_balance_returns_gas() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        let result = evm.inner_call(call_params(CallKind::Call, addr(1), addr(2), 1));
        assert!(!result.success);
        assert_eq!(result.gas_left, 5000);
        assert!(!evm.knows_account(&addr(2)));
    }

    #[test]
    fn test_create_collision_consumes_gas() {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        let taken = create_address(&addr(1), 0);
        evm.set_code(taken, Bytes::from_static(&[0x00]));

        let result = evm.inner_call(call_params(CallKind::Create, addr(1), Address::ZERO, 0));
        assert!(!result.success);
        assert_eq!(result.gas_left, 0);
        assert_eq!(result.created, None);
        assert_eq!(evm.nonce(&addr(1)), 1);
    }
}
