//! Reference call frame

use crate::error::{EvmError, EvmResult};
use crate::memory::Memory;
use crate::opcode::{push_size, Opcode};
use crate::stack::Stack;
use bytes::Bytes;
use lockstep_primitives::{Address, U256};

/// Where a suspended CALL or CREATE delivers its result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PendingCall {
    Call { ret_offset: usize, ret_len: usize },
    Create,
}

/// Execution state of one call.
///
/// Created by the [`CallOrchestrator`](crate::CallOrchestrator) when a call
/// is entered and dropped once its output has been copied out. Once
/// `stopped`, `reverted` or failed, stepping the frame is a no-op.
#[derive(Clone, Debug)]
pub struct ReferenceFrame {
    pub(crate) program_counter: u32,
    pub(crate) gas_remaining: i64,
    pub(crate) bytecode: Bytes,
    pub(crate) stack: Stack,
    pub(crate) memory: Memory,
    pub(crate) caller: Address,
    pub(crate) address: Address,
    pub(crate) value: U256,
    pub(crate) calldata: Bytes,
    pub(crate) output: Bytes,
    pub(crate) return_data: Bytes,
    pub(crate) stopped: bool,
    pub(crate) reverted: bool,
    pub(crate) error: Option<EvmError>,
    pub(crate) is_static: bool,
    pub(crate) depth: usize,
    pub(crate) pending_call: Option<PendingCall>,
    jump_dests: Vec<bool>,
}

impl ReferenceFrame {
    /// Create a frame at depth 0
    pub fn new(
        bytecode: Bytes,
        gas: u64,
        caller: Address,
        address: Address,
        value: U256,
        calldata: Bytes,
    ) -> Self {
        let jump_dests = analyze_jump_dests(&bytecode);
        Self {
            program_counter: 0,
            gas_remaining: i64::try_from(gas).unwrap_or(i64::MAX),
            bytecode,
            stack: Stack::new(),
            memory: Memory::new(),
            caller,
            address,
            value,
            calldata,
            output: Bytes::new(),
            return_data: Bytes::new(),
            stopped: false,
            reverted: false,
            error: None,
            is_static: false,
            depth: 0,
            pending_call: None,
            jump_dests,
        }
    }

    /// Mark the frame as a static context
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    /// Set the call depth
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Current program counter
    pub fn pc(&self) -> usize {
        self.program_counter as usize
    }

    /// Signed gas remaining
    pub fn gas_remaining(&self) -> i64 {
        self.gas_remaining
    }

    /// Gas remaining, clamped at zero
    pub fn gas_left(&self) -> u64 {
        self.gas_remaining.max(0) as u64
    }

    /// Charge `amount`; on shortfall clamp to zero and fail
    pub fn consume_gas(&mut self, amount: u64) -> EvmResult<()> {
        match i64::try_from(amount) {
            Ok(amount) if amount <= self.gas_remaining => {
                self.gas_remaining -= amount;
                Ok(())
            }
            _ => {
                self.gas_remaining = 0;
                Err(EvmError::OutOfGas)
            }
        }
    }

    /// Debit gas without failing; the balance may go negative
    pub fn debit_gas(&mut self, amount: u64) {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        self.gas_remaining = self.gas_remaining.saturating_sub(amount);
    }

    /// Return gas to the frame
    pub fn credit_gas(&mut self, amount: u64) {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        self.gas_remaining = self.gas_remaining.saturating_add(amount);
    }

    /// Bytecode being executed
    pub fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    /// Raw byte at the program counter
    pub fn current_byte(&self) -> Option<u8> {
        self.bytecode.get(self.pc()).copied()
    }

    /// Stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Memory
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Caller address
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Executing account
    pub fn address(&self) -> Address {
        self.address
    }

    /// Call value
    pub fn value(&self) -> U256 {
        self.value
    }

    /// Input data
    pub fn calldata(&self) -> &Bytes {
        &self.calldata
    }

    /// Data set by RETURN or REVERT
    pub fn output(&self) -> &Bytes {
        &self.output
    }

    /// Output of the last completed sub-call
    pub fn return_data(&self) -> &Bytes {
        &self.return_data
    }

    /// STOP or RETURN executed (or code ran out)
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// REVERT executed
    pub fn is_reverted(&self) -> bool {
        self.reverted
    }

    /// Error that ended the frame
    pub fn error(&self) -> Option<&EvmError> {
        self.error.as_ref()
    }

    /// No further steps will run
    pub fn is_finished(&self) -> bool {
        self.stopped || self.reverted || self.error.is_some()
    }

    /// Finished without revert or error
    pub fn is_success(&self) -> bool {
        self.stopped && !self.reverted && self.error.is_none()
    }

    /// Static context
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Call depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Waiting for a nested CALL or CREATE to return
    pub fn is_suspended(&self) -> bool {
        self.pending_call.is_some()
    }

    /// `dest` holds a JUMPDEST outside PUSH data
    pub fn is_valid_jump(&self, dest: usize) -> bool {
        self.jump_dests.get(dest).copied().unwrap_or(false)
    }

    pub(crate) fn fail(&mut self, error: EvmError) {
        self.gas_remaining = 0;
        self.error = Some(error);
    }
}

fn analyze_jump_dests(code: &[u8]) -> Vec<bool> {
    let mut dests = vec![false; code.len()];
    let mut i = 0;
    while i < code.len() {
        let byte = code[i];
        if byte == Opcode::JUMPDEST.byte() {
            dests[i] = true;
        }
        i += 1 + push_size(byte);
    }
    dests
}
