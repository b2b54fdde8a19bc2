//! EVM bytecode interpreter
//!
//! [`Interpreter::step`] executes exactly one primitive opcode of a
//! [`ReferenceFrame`], charging static gas before any state is touched.
//! Transaction-scoped state (storage, access lists, refunds, nested calls)
//! is reached through the [`CallOrchestrator`].
//!
//! CALL and CREATE suspend the frame: [`Interpreter::advance`] hands the
//! call parameters back to the orchestrator, which runs the callee on its
//! own frame stack and later delivers the outcome with
//! [`Interpreter::resume`]. Nested calls therefore never grow the native
//! stack.

use bytes::Bytes;
use lockstep_crypto::{keccak256, KECCAK_EMPTY};
use lockstep_primitives::{word_from_bytes, Address, U256};
use tracing::{debug, trace};

use crate::error::{EvmError, EvmResult, Log};
use crate::frame::{PendingCall, ReferenceFrame};
use crate::gas::{self, cost};
use crate::hardfork::Hardfork;
use crate::host::{CallKind, CallParams, CallResult};
use crate::memory::MAX_MEMORY_SIZE;
use crate::opcode::{opcode_name, Opcode};
use crate::orchestrator::CallOrchestrator;
use crate::stack::{self, as_usize_saturated, bool_to_word};

/// Single-step executor over one frame
pub struct Interpreter<'a> {
    frame: &'a mut ReferenceFrame,
    evm: &'a mut CallOrchestrator,
}

impl<'a> Interpreter<'a> {
    /// Bind a frame to the orchestrator that owns its transaction
    pub fn new(frame: &'a mut ReferenceFrame, evm: &'a mut CallOrchestrator) -> Self {
        Self { frame, evm }
    }

    /// Execute one opcode, running any nested call it makes to completion.
    ///
    /// A finished frame is left untouched. Running past the end of the
    /// code behaves like STOP. On error the frame is marked failed with no
    /// gas left and the error is returned.
    pub fn step(&mut self) -> EvmResult<()> {
        if let Some(params) = self.advance()? {
            let result = self.evm.inner_call(params);
            self.resume(result)?;
        }
        Ok(())
    }

    /// Execute one opcode, stopping short of a nested call.
    ///
    /// For CALL and CREATE all gas is charged and the frame is suspended;
    /// the parameters of the callee are returned instead of running it.
    pub fn advance(&mut self) -> EvmResult<Option<CallParams>> {
        if self.frame.is_finished() || self.frame.is_suspended() {
            return Ok(None);
        }
        let pc = self.frame.pc();
        let Some(byte) = self.frame.current_byte() else {
            self.frame.stopped = true;
            return Ok(None);
        };

        match self.execute_opcode(byte, pc) {
            Ok(call) => Ok(call),
            Err(err) => {
                debug!(pc, opcode = opcode_name(byte), depth = self.frame.depth, %err, "step failed");
                self.frame.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Deliver the outcome of the nested call the frame is suspended on
    pub fn resume(&mut self, result: CallResult) -> EvmResult<()> {
        let Some(pending) = self.frame.pending_call.take() else {
            return Ok(());
        };
        match self.finish_call(pending, result) {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!(depth = self.frame.depth, %err, "resume failed");
                self.frame.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Step until the frame stops, reverts or fails
    pub fn execute(&mut self) -> EvmResult<()> {
        while !self.frame.is_finished() {
            self.step()?;
        }
        Ok(())
    }

    fn execute_opcode(&mut self, byte: u8, pc: usize) -> EvmResult<Option<CallParams>> {
        let fork = self.evm.hardfork();
        let op = Opcode::from_byte(byte)
            .filter(|op| op.introduced_in() <= fork)
            .ok_or(EvmError::InvalidOpcode(byte))?;

        self.frame.consume_gas(gas::static_gas(op, fork))?;
        trace!(
            pc,
            opcode = op.name(),
            gas = self.frame.gas_remaining,
            stack = self.frame.stack.len(),
            "step"
        );

        let mut next_pc = pc + 1;
        let mut call = None;

        match op {
            Opcode::STOP => {
                self.frame.stopped = true;
                return Ok(None);
            }

            // Arithmetic: the first pop is µs[0]
            Opcode::ADD => self.binary(|a, b| a.overflowing_add(b).0)?,
            Opcode::MUL => self.binary(|a, b| a.overflowing_mul(b).0)?,
            Opcode::SUB => self.binary(|a, b| a.overflowing_sub(b).0)?,
            Opcode::DIV => self.binary(|a, b| if b.is_zero() { U256::zero() } else { a / b })?,
            Opcode::SDIV => self.binary(stack::sdiv)?,
            Opcode::MOD => self.binary(|a, b| if b.is_zero() { U256::zero() } else { a % b })?,
            Opcode::SMOD => self.binary(stack::smod)?,
            Opcode::ADDMOD => self.ternary(stack::addmod)?,
            Opcode::MULMOD => self.ternary(stack::mulmod)?,
            Opcode::EXP => {
                let base = self.pop()?;
                let exponent = self.pop()?;
                self.frame.consume_gas(gas::exp_gas(&exponent, fork))?;
                self.push(stack::exp(base, exponent))?;
            }
            Opcode::SIGNEXTEND => self.binary(stack::signextend)?,

            // Comparison and bitwise
            Opcode::LT => self.binary(|a, b| bool_to_word(a < b))?,
            Opcode::GT => self.binary(|a, b| bool_to_word(a > b))?,
            Opcode::SLT => self.binary(|a, b| bool_to_word(stack::slt(a, b)))?,
            Opcode::SGT => self.binary(|a, b| bool_to_word(stack::sgt(a, b)))?,
            Opcode::EQ => self.binary(|a, b| bool_to_word(a == b))?,
            Opcode::ISZERO => {
                let a = self.pop()?;
                self.push(bool_to_word(a.is_zero()))?;
            }
            Opcode::AND => self.binary(|a, b| a & b)?,
            Opcode::OR => self.binary(|a, b| a | b)?,
            Opcode::XOR => self.binary(|a, b| a ^ b)?,
            Opcode::NOT => {
                let a = self.pop()?;
                self.push(!a)?;
            }
            Opcode::BYTE => self.binary(stack::byte)?,
            Opcode::SHL => self.binary(stack::shl)?,
            Opcode::SHR => self.binary(stack::shr)?,
            Opcode::SAR => self.binary(stack::sar)?,

            Opcode::KECCAK256 => {
                let offset = self.pop()?;
                let len = self.pop()?;
                let (offset, len) = self.memory_region(offset, len)?;
                self.frame.consume_gas(gas::sha3_gas(len))?;
                let data = self.frame.memory.load_slice(offset, len)?;
                self.push(keccak256(&data).to_word())?;
            }

            // Environment
            Opcode::ADDRESS => self.push(self.frame.address.to_word())?,
            Opcode::BALANCE => {
                let address = self.pop_address()?;
                let access = self.evm.access_address(address);
                self.frame.consume_gas(access)?;
                let balance = self.evm.balance(&address);
                self.push(balance)?;
            }
            Opcode::ORIGIN => {
                let origin = self.evm.environment().tx.origin;
                self.push(origin.to_word())?;
            }
            Opcode::CALLER => self.push(self.frame.caller.to_word())?,
            Opcode::CALLVALUE => self.push(self.frame.value)?,
            Opcode::CALLDATALOAD => {
                let offset = self.pop()?;
                let word = padded_slice(&self.frame.calldata, offset, 32);
                self.push(word_from_bytes(&word))?;
            }
            Opcode::CALLDATASIZE => self.push(U256::from(self.frame.calldata.len()))?,
            Opcode::CALLDATACOPY => {
                let data = self.frame.calldata.clone();
                self.copy_to_memory(&data)?;
            }
            Opcode::CODESIZE => self.push(U256::from(self.frame.bytecode.len()))?,
            Opcode::CODECOPY => {
                let code = self.frame.bytecode.clone();
                self.copy_to_memory(&code)?;
            }
            Opcode::GASPRICE => {
                let price = self.evm.environment().tx.gas_price;
                self.push(price)?;
            }
            Opcode::EXTCODESIZE => {
                let address = self.pop_address()?;
                let access = self.evm.access_address(address);
                self.frame.consume_gas(access)?;
                let size = self.evm.code(&address).len();
                self.push(U256::from(size))?;
            }
            Opcode::EXTCODECOPY => {
                let address = self.pop_address()?;
                let access = self.evm.access_address(address);
                self.frame.consume_gas(access)?;
                let code = self.evm.code(&address);
                self.copy_to_memory(&code)?;
            }
            Opcode::RETURNDATASIZE => self.push(U256::from(self.frame.return_data.len()))?,
            Opcode::RETURNDATACOPY => {
                let dest = self.pop()?;
                let offset = self.pop()?;
                let len = self.pop()?;
                let end = offset.checked_add(len).ok_or(EvmError::ReturnDataOutOfBounds)?;
                if end > U256::from(self.frame.return_data.len()) {
                    return Err(EvmError::ReturnDataOutOfBounds);
                }
                let (dest, len) = self.memory_region(dest, len)?;
                self.frame.consume_gas(gas::copy_gas(len))?;
                let start = as_usize_saturated(&offset);
                let data = self.frame.return_data.slice(start..start + len);
                self.frame.memory.store_slice(dest, &data)?;
            }
            Opcode::EXTCODEHASH => {
                let address = self.pop_address()?;
                let access = self.evm.access_address(address);
                self.frame.consume_gas(access)?;
                let hash = if self.evm.is_empty_account(&address) {
                    U256::zero()
                } else {
                    let code = self.evm.code(&address);
                    if code.is_empty() {
                        KECCAK_EMPTY.to_word()
                    } else {
                        keccak256(&code).to_word()
                    }
                };
                self.push(hash)?;
            }

            // Block information
            Opcode::BLOCKHASH => {
                let number = self.pop()?;
                let hash = self.evm.environment().block.block_hash(number);
                self.push(hash.to_word())?;
            }
            Opcode::COINBASE => {
                let coinbase = self.evm.environment().block.coinbase;
                self.push(coinbase.to_word())?;
            }
            Opcode::TIMESTAMP => {
                let timestamp = self.evm.environment().block.timestamp;
                self.push(U256::from(timestamp))?;
            }
            Opcode::NUMBER => {
                let number = self.evm.environment().block.number;
                self.push(U256::from(number))?;
            }
            Opcode::PREVRANDAO => {
                let randao = self.evm.environment().block.prevrandao;
                self.push(randao.to_word())?;
            }
            Opcode::GASLIMIT => {
                let limit = self.evm.environment().block.gas_limit;
                self.push(U256::from(limit))?;
            }
            Opcode::CHAINID => {
                let chain_id = self.evm.environment().block.chain_id;
                self.push(U256::from(chain_id))?;
            }
            Opcode::SELFBALANCE => {
                let balance = self.evm.balance(&self.frame.address);
                self.push(balance)?;
            }
            Opcode::BASEFEE => {
                let base_fee = self.evm.environment().block.base_fee;
                self.push(base_fee)?;
            }
            Opcode::BLOBHASH => {
                let index = self.pop()?;
                let hash = self
                    .evm
                    .environment()
                    .tx
                    .blob_hashes
                    .get(as_usize_saturated(&index))
                    .map(|h| h.to_word())
                    .unwrap_or_default();
                self.push(hash)?;
            }
            Opcode::BLOBBASEFEE => {
                let fee = self.evm.environment().block.blob_base_fee;
                self.push(fee)?;
            }

            // Stack, memory, storage and flow
            Opcode::POP => {
                self.pop()?;
            }
            Opcode::MLOAD => {
                let offset = self.pop()?;
                let (offset, _) = self.memory_region(offset, U256::from(32))?;
                let value = self.frame.memory.load_word(offset)?;
                self.push(value)?;
            }
            Opcode::MSTORE => {
                let offset = self.pop()?;
                let value = self.pop()?;
                let (offset, _) = self.memory_region(offset, U256::from(32))?;
                self.frame.memory.store_word(offset, &value)?;
            }
            Opcode::MSTORE8 => {
                let offset = self.pop()?;
                let value = self.pop()?;
                let (offset, _) = self.memory_region(offset, U256::one())?;
                self.frame.memory.store_byte(offset, (value.low_u64() & 0xFF) as u8)?;
            }
            Opcode::SLOAD => {
                let slot = self.pop()?;
                let address = self.frame.address;
                let access = self.evm.access_storage_slot(address, slot);
                self.frame.consume_gas(access)?;
                self.evm.original_value(address, slot);
                let value = self.evm.storage(&address, &slot);
                self.push(value)?;
            }
            Opcode::SSTORE => self.sstore(fork)?,
            Opcode::JUMP => {
                let dest = self.pop()?;
                next_pc = self.jump_target(dest)?;
            }
            Opcode::JUMPI => {
                let dest = self.pop()?;
                let condition = self.pop()?;
                if !condition.is_zero() {
                    next_pc = self.jump_target(dest)?;
                }
            }
            Opcode::PC => self.push(U256::from(pc))?,
            Opcode::MSIZE => self.push(U256::from(self.frame.memory.msize()))?,
            Opcode::GAS => self.push(U256::from(self.frame.gas_left()))?,
            Opcode::JUMPDEST => {}
            Opcode::TLOAD => {
                let slot = self.pop()?;
                let value = self.evm.transient_storage(&self.frame.address, &slot);
                self.push(value)?;
            }
            Opcode::TSTORE => {
                self.require_non_static()?;
                let slot = self.pop()?;
                let value = self.pop()?;
                self.evm.tstore(self.frame.address, slot, value);
            }
            Opcode::MCOPY => {
                let dest = self.pop()?;
                let src = self.pop()?;
                let len = self.pop()?;
                let (src, len) = self.memory_region(src, len)?;
                let (dest, _) = self.memory_region(dest, U256::from(len))?;
                self.frame.consume_gas(gas::copy_gas(len))?;
                self.frame.memory.copy_within(dest, src, len)?;
            }

            Opcode::PUSH0 => self.push(U256::zero())?,
            op if op.is_push() => {
                let size = op.push_size();
                let value = self.push_immediate(pc, size)?;
                self.push(value)?;
                next_pc = pc + 1 + size;
            }
            op if op.dup_depth() > 0 => self.frame.stack.dup(op.dup_depth())?,
            op if op.swap_depth() > 0 => self.frame.stack.swap(op.swap_depth())?,

            Opcode::LOG0 | Opcode::LOG1 | Opcode::LOG2 | Opcode::LOG3 | Opcode::LOG4 => {
                self.require_non_static()?;
                let offset = self.pop()?;
                let len = self.pop()?;
                let topic_count = op.log_topics().unwrap_or(0);
                self.frame.stack.require(topic_count)?;
                let (offset, len) = self.memory_region(offset, len)?;
                self.frame.consume_gas(gas::log_data_gas(len))?;
                let mut topics = Vec::with_capacity(topic_count);
                for _ in 0..topic_count {
                    topics.push(self.pop()?.into());
                }
                let data = self.frame.memory.load_slice(offset, len)?;
                self.evm.push_log(Log {
                    address: self.frame.address,
                    topics,
                    data: Bytes::from(data),
                });
            }

            // System
            Opcode::CREATE | Opcode::CREATE2 => call = Some(self.create(op, fork)?),
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL => {
                call = Some(self.call(op, fork)?)
            }
            Opcode::RETURN | Opcode::REVERT => {
                let offset = self.pop()?;
                let len = self.pop()?;
                let (offset, len) = self.memory_region(offset, len)?;
                let data = self.frame.memory.load_slice(offset, len)?;
                trace!(output = %hex::encode(&data), reverted = op == Opcode::REVERT, "frame returned");
                self.frame.output = Bytes::from(data);
                if op == Opcode::REVERT {
                    self.frame.reverted = true;
                } else {
                    self.frame.stopped = true;
                }
                return Ok(None);
            }
            Opcode::INVALID => return Err(EvmError::InvalidOpcode(byte)),
            Opcode::SELFDESTRUCT => {
                self.selfdestruct(fork)?;
                return Ok(None);
            }

            // All remaining opcodes are PUSH/DUP/SWAP, matched by the guards
            _ => return Err(EvmError::InvalidOpcode(byte)),
        }

        self.frame.program_counter = next_pc as u32;
        Ok(call)
    }

    // ==================== Stack helpers ====================

    fn pop(&mut self) -> EvmResult<U256> {
        self.frame.stack.pop()
    }

    fn pop_address(&mut self) -> EvmResult<Address> {
        Ok(Address::from_word(&self.pop()?))
    }

    fn push(&mut self, value: U256) -> EvmResult<()> {
        self.frame.stack.push(value)
    }

    fn binary(&mut self, f: impl FnOnce(U256, U256) -> U256) -> EvmResult<()> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(f(a, b))
    }

    fn ternary(&mut self, f: impl FnOnce(U256, U256, U256) -> U256) -> EvmResult<()> {
        let a = self.pop()?;
        let b = self.pop()?;
        let n = self.pop()?;
        self.push(f(a, b, n))
    }

    // ==================== Memory helpers ====================

    /// Charge expansion for `offset..offset + len` and grow memory.
    /// A zero length never expands and ignores the offset.
    fn memory_region(&mut self, offset: U256, len: U256) -> EvmResult<(usize, usize)> {
        if len.is_zero() {
            return Ok((0, 0));
        }
        let len = to_memory_bound(len)?;
        let offset = to_memory_bound(offset)?;
        let end = offset + len;
        if end > MAX_MEMORY_SIZE {
            return Err(EvmError::MemoryOverflow(end));
        }
        let expansion = gas::memory_gas(self.frame.memory.msize(), end);
        self.frame.consume_gas(expansion)?;
        self.frame.memory.touch(offset, len)?;
        Ok((offset, len))
    }

    /// Shared tail of CALLDATACOPY, CODECOPY and EXTCODECOPY
    fn copy_to_memory(&mut self, source: &[u8]) -> EvmResult<()> {
        let dest = self.pop()?;
        let offset = self.pop()?;
        let len = self.pop()?;
        let (dest, len) = self.memory_region(dest, len)?;
        self.frame.consume_gas(gas::copy_gas(len))?;
        if len > 0 {
            let data = padded_slice(source, offset, len);
            self.frame.memory.store_slice(dest, &data)?;
        }
        Ok(())
    }

    // ==================== Flow helpers ====================

    fn jump_target(&self, dest: U256) -> EvmResult<usize> {
        let dest = as_usize_saturated(&dest);
        if !self.frame.is_valid_jump(dest) {
            return Err(EvmError::InvalidJump(dest));
        }
        Ok(dest)
    }

    /// Immediate of a PUSH at `pc`; a short tail is zero-padded on the
    /// right unless the orchestrator rejects truncated pushes
    fn push_immediate(&self, pc: usize, size: usize) -> EvmResult<U256> {
        let code = &self.frame.bytecode;
        let start = pc + 1;
        let available = code.len().saturating_sub(start).min(size);
        if available < size && self.evm.config().reject_truncated_push {
            return Err(EvmError::InvalidPush(pc));
        }
        let mut buf = [0u8; 32];
        let first = 32 - size;
        buf[first..first + available].copy_from_slice(&code[start..start + available]);
        Ok(U256::from_big_endian(&buf))
    }

    fn require_non_static(&self) -> EvmResult<()> {
        if self.frame.is_static {
            Err(EvmError::StaticCallViolation)
        } else {
            Ok(())
        }
    }

    // ==================== State-changing opcodes ====================

    fn sstore(&mut self, fork: Hardfork) -> EvmResult<()> {
        self.require_non_static()?;
        if fork >= Hardfork::Istanbul && self.frame.gas_left() <= cost::SSTORE_SENTRY {
            return Err(EvmError::OutOfGas);
        }
        let slot = self.pop()?;
        let value = self.pop()?;
        let address = self.frame.address;

        let cold = fork.has_access_lists() && !self.evm.is_warm_storage_slot(&address, &slot);
        self.evm.access_storage_slot(address, slot);
        let original = self.evm.original_value(address, slot);
        let current = self.evm.storage(&address, &slot);

        let charge = gas::sstore_cost(fork, original, current, value, cold);
        self.frame.consume_gas(charge.gas)?;
        self.evm.add_refund(charge.refund);
        trace!(%address, ?slot, ?original, ?current, ?value, gas = charge.gas, refund = charge.refund, "sstore");
        self.evm.sstore(address, slot, value)
    }

    fn create(&mut self, op: Opcode, fork: Hardfork) -> EvmResult<CallParams> {
        self.require_non_static()?;
        let value = self.pop()?;
        let offset = self.pop()?;
        let len = self.pop()?;
        let salt = if op == Opcode::CREATE2 { Some(self.pop()?) } else { None };

        let (offset, len) = self.memory_region(offset, len)?;
        if fork >= Hardfork::Shanghai && len > cost::MAX_INIT_CODE_SIZE {
            return Err(EvmError::OutOfGas);
        }
        self.frame.consume_gas(gas::init_code_gas(len, fork))?;
        if salt.is_some() {
            self.frame.consume_gas(gas::sha3_gas(len))?;
        }
        let init_code = Bytes::from(self.frame.memory.load_slice(offset, len)?);

        self.frame.return_data = Bytes::new();
        let child_gas = gas::all_but_one_64th(fork, self.frame.gas_left());
        self.frame.consume_gas(child_gas)?;

        let kind = match salt {
            Some(salt) => CallKind::Create2 { salt },
            None => CallKind::Create,
        };
        self.frame.pending_call = Some(PendingCall::Create);
        Ok(CallParams {
            kind,
            caller: self.frame.address,
            address: Address::ZERO,
            code_address: Address::ZERO,
            value,
            input: init_code,
            gas: child_gas,
            is_static: false,
            depth: self.frame.depth + 1,
        })
    }

    fn call(&mut self, op: Opcode, fork: Hardfork) -> EvmResult<CallParams> {
        let requested = self.pop()?;
        let target = self.pop_address()?;
        let value = match op {
            Opcode::CALL | Opcode::CALLCODE => self.pop()?,
            _ => U256::zero(),
        };
        let args_offset = self.pop()?;
        let args_len = self.pop()?;
        let ret_offset = self.pop()?;
        let ret_len = self.pop()?;

        let transfers_value = !value.is_zero();
        if op == Opcode::CALL && transfers_value && self.frame.is_static {
            return Err(EvmError::StaticCallViolation);
        }

        let (args_offset, args_len) = self.memory_region(args_offset, args_len)?;
        let (ret_offset, ret_len) = self.memory_region(ret_offset, ret_len)?;

        let mut extra = self.evm.access_address(target);
        if transfers_value {
            extra += cost::CALL_VALUE;
        }
        if op == Opcode::CALL {
            let charges_new_account = if fork >= Hardfork::SpuriousDragon {
                transfers_value && self.evm.is_empty_account(&target)
            } else {
                self.evm.is_empty_account(&target)
            };
            if charges_new_account {
                extra += cost::CALL_NEW_ACCOUNT;
            }
        }
        self.frame.consume_gas(extra)?;

        let mut child_gas =
            gas::call_gas(fork, self.frame.gas_left(), requested).ok_or(EvmError::OutOfGas)?;
        self.frame.consume_gas(child_gas)?;
        if transfers_value {
            child_gas += cost::CALL_STIPEND;
        }

        let input = Bytes::from(self.frame.memory.load_slice(args_offset, args_len)?);
        let (kind, caller, address, call_value, is_static) = match op {
            Opcode::CALL => (CallKind::Call, self.frame.address, target, value, self.frame.is_static),
            Opcode::CALLCODE => {
                (CallKind::CallCode, self.frame.address, self.frame.address, value, self.frame.is_static)
            }
            Opcode::DELEGATECALL => (
                CallKind::DelegateCall,
                self.frame.caller,
                self.frame.address,
                self.frame.value,
                self.frame.is_static,
            ),
            _ => (CallKind::StaticCall, self.frame.address, target, U256::zero(), true),
        };

        trace!(?kind, %target, gas = child_gas, "nested call");
        self.frame.pending_call = Some(PendingCall::Call { ret_offset, ret_len });
        Ok(CallParams {
            kind,
            caller,
            address,
            code_address: target,
            value: call_value,
            input,
            gas: child_gas,
            is_static,
            depth: self.frame.depth + 1,
        })
    }

    /// Second half of CALL and CREATE: refund unused gas, copy the output
    /// and push the result word
    fn finish_call(&mut self, pending: PendingCall, result: CallResult) -> EvmResult<()> {
        self.frame.credit_gas(result.gas_left);
        match pending {
            PendingCall::Create => {
                if !result.success {
                    self.frame.return_data = result.output;
                }
                let created = result.created.map(|a| a.to_word()).unwrap_or_default();
                self.push(created)
            }
            PendingCall::Call { ret_offset, ret_len } => {
                let copy_len = ret_len.min(result.output.len());
                if copy_len > 0 {
                    self.frame.memory.store_slice(ret_offset, &result.output[..copy_len])?;
                }
                self.frame.return_data = result.output;
                self.push(bool_to_word(result.success))
            }
        }
    }

    fn selfdestruct(&mut self, fork: Hardfork) -> EvmResult<()> {
        self.require_non_static()?;
        let beneficiary = self.pop_address()?;

        let mut extra = 0;
        if self.evm.access_address(beneficiary) == cost::COLD_ACCOUNT_ACCESS {
            extra += cost::COLD_ACCOUNT_ACCESS;
        }
        if fork >= Hardfork::TangerineWhistle {
            let has_balance = !self.evm.balance(&self.frame.address).is_zero();
            let empty = self.evm.is_empty_account(&beneficiary);
            let charges_new_account = if fork >= Hardfork::SpuriousDragon {
                has_balance && empty
            } else {
                empty
            };
            if charges_new_account {
                extra += cost::CALL_NEW_ACCOUNT;
            }
        }
        self.frame.consume_gas(extra)?;

        let first = self.evm.selfdestruct(self.frame.address, beneficiary);
        if first && fork < Hardfork::London {
            self.evm.add_refund(cost::SELFDESTRUCT_REFUND as i64);
        }
        self.frame.stopped = true;
        Ok(())
    }
}

fn to_memory_bound(value: U256) -> EvmResult<usize> {
    if value > U256::from(MAX_MEMORY_SIZE) {
        return Err(EvmError::MemoryOverflow(as_usize_saturated(&value)));
    }
    Ok(value.low_u64() as usize)
}

/// `len` bytes of `source` from `offset`, zero-filled past its end
fn padded_slice(source: &[u8], offset: U256, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < U256::from(source.len()) {
        let start = offset.low_u64() as usize;
        let available = (source.len() - start).min(len);
        out[..available].copy_from_slice(&source[start..start + available]);
    }
    out
}
