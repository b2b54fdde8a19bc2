//! Fusion step synchronizer
//!
//! Drives the reference interpreter through the primitive steps behind one
//! engine instruction and reconciles block-level gas pre-charging at
//! JUMPDEST.
//!
//! The engine charges a whole basic block's static gas when it enters the
//! block at its JUMPDEST. The reference charges per opcode. At a JUMPDEST the
//! reference frame is debited the rest of the block (`block_gas - 1`) and the
//! debit is kept as a prepaid balance; while it lasts, each following
//! opcode's static cost is credited back before the opcode charges it, so
//! the reference pays each static cost of the block exactly once.

use lockstep_evm::gas::{self, cost};
use lockstep_evm::{CallOrchestrator, EvmError, Hardfork, Opcode};
use tracing::{debug, trace};

use crate::pc_tracker::{PcMismatch, PcTracker};
use crate::step_log::{ExecutionStep, StepLog, SNAPSHOT_DEPTH};
use crate::unified::UnifiedOpcode;

/// What happened while driving one engine instruction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriveOutcome {
    /// Primitive steps that completed without error
    pub steps_completed: usize,
    /// Reference pc before the first step
    pub start_pc: usize,
    /// Interpreter error that ended the sequence
    pub error: Option<EvmError>,
    /// Pc tracking disagreed with the claimed primitive
    pub pc_mismatch: Option<PcMismatch>,
    /// A JUMPDEST block pre-charge was applied
    pub reconciled: bool,
}

/// Steps the reference frame in lock-step with engine instructions
#[derive(Debug, Clone)]
pub struct FusionSynchronizer {
    fork: Hardfork,
    prepaid: u64,
    tracker: PcTracker,
}

impl FusionSynchronizer {
    /// Synchronizer charging static costs as of `fork`
    pub fn new(fork: Hardfork) -> Self {
        Self { fork, prepaid: 0, tracker: PcTracker::new() }
    }

    /// Start over for a new top-level frame
    pub fn reset(&mut self) {
        self.prepaid = 0;
        self.tracker.reset();
    }

    /// Block gas debited at the last JUMPDEST and not yet credited back
    pub fn prepaid(&self) -> u64 {
        self.prepaid
    }

    /// Independent pc tracker
    pub fn tracker(&self) -> &PcTracker {
        &self.tracker
    }

    /// Step the top frame of `evm` once per primitive behind `opcode`.
    ///
    /// `block_gas` is what the engine charged for the instruction when it is
    /// a JUMPDEST. An interpreter error stops the sequence and is reported,
    /// never propagated.
    pub fn drive(
        &mut self,
        evm: &mut CallOrchestrator,
        opcode: UnifiedOpcode,
        block_gas: Option<u64>,
        schedule_index: usize,
        log: &mut StepLog,
    ) -> DriveOutcome {
        let mut outcome = DriveOutcome::default();

        for index in 0..opcode.step_count() {
            let Some(frame) = evm.current_frame() else {
                break;
            };
            if frame.is_finished() {
                break;
            }
            let Some(claimed) = opcode.claimed_step(index) else {
                break;
            };
            if index == 0 {
                outcome.start_pc = frame.pc();
            }
            if let Err(mismatch) = self.tracker.execute(frame, claimed) {
                outcome.pc_mismatch = Some(mismatch);
                return outcome;
            }

            let pc = frame.pc();
            let byte = frame.current_byte().unwrap_or(Opcode::STOP.byte());
            let gas_before = frame.gas_remaining();
            let stack_before = frame.stack().len();
            let is_jumpdest = byte == Opcode::JUMPDEST.byte();

            if !is_jumpdest {
                self.credit_prepaid(evm, byte);
            }

            let result = evm.step();

            let Some(frame) = evm.current_frame_mut() else {
                break;
            };
            if is_jumpdest && result.is_ok() {
                let debit = block_gas.unwrap_or(cost::JUMPDEST).saturating_sub(cost::JUMPDEST);
                frame.debit_gas(debit);
                self.prepaid = debit;
                outcome.reconciled = true;
                trace!(pc, block_gas = ?block_gas, debit, "jumpdest block gas reconciled");
            }

            let index_in_log = log.next_index();
            log.record(ExecutionStep {
                index: index_in_log,
                opcode: byte,
                instruction: opcode,
                pc,
                gas_before,
                gas_after: frame.gas_remaining(),
                stack_before,
                stack_after: frame.stack().len(),
                memory_size: frame.memory().msize(),
                schedule_index,
                synthetic: opcode.is_synthetic(),
                error_occurred: result.is_err(),
                stack_snapshot: frame.stack().iter_top_down().take(SNAPSHOT_DEPTH).copied().collect(),
            });

            if let Err(err) = result {
                if index == 0 {
                    debug!(%opcode, pc, %err, "first step failed");
                } else {
                    debug!(%opcode, pc, step = index, %err, "partial execution of fused instruction");
                }
                outcome.error = Some(err);
                return outcome;
            }
            outcome.steps_completed += 1;
        }
        outcome
    }

    fn credit_prepaid(&mut self, evm: &mut CallOrchestrator, byte: u8) {
        if self.prepaid == 0 {
            return;
        }
        let static_cost = Opcode::from_byte(byte)
            .map(|op| gas::static_gas(op, self.fork))
            .unwrap_or(0);
        let credit = static_cost.min(self.prepaid);
        if credit == 0 {
            return;
        }
        if let Some(frame) = evm.current_frame_mut() {
            frame.credit_gas(credit);
            self.prepaid -= credit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unified::FusionKind;
    use lockstep_evm::{Address, Bytes, OrchestratorConfig, ReferenceFrame, U256};

    fn evm_with(code: &'static [u8], gas: u64) -> CallOrchestrator {
        let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
        evm.push_frame(ReferenceFrame::new(
            Bytes::from_static(code),
            gas,
            Address::ZERO,
            Address::from_low_u8(1),
            U256::zero(),
            Bytes::new(),
        ));
        evm
    }

    #[test]
    fn test_synthetic_drives_all_steps() {
        // PUSH1 2, PUSH1 3, ADD, STOP
        let mut evm = evm_with(&[0x60, 0x02, 0x60, 0x03, 0x01, 0x00], 100);
        let mut sync = FusionSynchronizer::new(Hardfork::Cancun);
        let mut log = StepLog::new(10, false);

        let first = sync.drive(&mut evm, Opcode::PUSH1.into(), None, 0, &mut log);
        assert_eq!(first.steps_completed, 1);
        let fused = sync.drive(&mut evm, FusionKind::PushAdd.into(), None, 1, &mut log);
        assert_eq!(fused.steps_completed, 2);
        assert_eq!(fused.start_pc, 2);

        let frame = evm.current_frame().unwrap();
        assert_eq!(frame.stack().peek(0).unwrap(), U256::from(5));
        assert_eq!(frame.gas_remaining(), 100 - 9);
        assert_eq!(log.total(), 3);
        assert!(log.recent().last().unwrap().synthetic);
    }

    #[test]
    fn test_jumpdest_reconciliation() {
        // JUMPDEST, PUSH1 1, PUSH1 2, ADD, STOP: block static gas 1 + 3 + 3 + 3
        let mut evm = evm_with(&[0x5B, 0x60, 0x01, 0x60, 0x02, 0x01, 0x00], 100);
        let mut sync = FusionSynchronizer::new(Hardfork::Cancun);
        let mut log = StepLog::new(10, false);

        let outcome = sync.drive(&mut evm, Opcode::JUMPDEST.into(), Some(10), 0, &mut log);
        assert!(outcome.reconciled);
        assert_eq!(evm.current_frame().unwrap().gas_remaining(), 90);
        assert_eq!(sync.prepaid(), 9);

        sync.drive(&mut evm, Opcode::PUSH1.into(), None, 1, &mut log);
        sync.drive(&mut evm, FusionKind::PushAdd.into(), None, 2, &mut log);
        assert_eq!(evm.current_frame().unwrap().gas_remaining(), 90);
        assert_eq!(sync.prepaid(), 0);
    }

    #[test]
    fn test_failure_stops_sequence() {
        // PUSH1 1, ADD (underflow)
        let mut evm = evm_with(&[0x60, 0x01, 0x01], 100);
        let mut sync = FusionSynchronizer::new(Hardfork::Cancun);
        let mut log = StepLog::new(10, false);

        let outcome = sync.drive(&mut evm, FusionKind::PushAdd.into(), None, 0, &mut log);
        assert_eq!(outcome.steps_completed, 1);
        assert_eq!(outcome.error, Some(EvmError::StackUnderflow));
        assert!(log.recent().last().unwrap().error_occurred);
    }

    #[test]
    fn test_pc_mismatch_reported() {
        let mut evm = evm_with(&[0x02, 0x00], 100);
        let mut sync = FusionSynchronizer::new(Hardfork::Cancun);
        let mut log = StepLog::new(10, false);

        let outcome = sync.drive(&mut evm, Opcode::ADD.into(), None, 0, &mut log);
        let mismatch = outcome.pc_mismatch.unwrap();
        assert_eq!(mismatch.found, 0x02);
        assert_eq!(outcome.steps_completed, 0);
        assert_eq!(log.total(), 0);
    }
}
