//! Validating tracer
//!
//! Runs the reference interpreter in lock-step with the engine. For each
//! top-level engine instruction it drives the matching primitive steps on a
//! reference frame and compares the two frames afterwards. Nested engine
//! frames are not validated: the reference runs CALL and CREATE to
//! completion inside a single step, so the hooks of the engine's inner
//! frames are counted and skipped.

use lockstep_evm::{Bytes, CallOrchestrator, Opcode, OrchestratorConfig, ReferenceFrame};
use lockstep_primitives::{Address, H256, U256};
use tracing::{debug, error, trace, warn};

use crate::config::ValidatorConfig;
use crate::error::Divergence;
use crate::frame_view::{Cursor, FrameView};
use crate::pc_tracker::PcMismatch;
use crate::report::DiagnosticReport;
use crate::step_log::StepLog;
use crate::synchronizer::FusionSynchronizer;
use crate::tracer::Tracer;
use crate::unified::UnifiedOpcode;
use crate::validator::{DivergenceValidator, StackMismatch, ValidationStats};

/// Engine state captured in `before_instruction`
#[derive(Debug, Clone, Copy)]
struct Pending {
    gas_before: i64,
    cursor: Cursor,
}

/// [`Tracer`] that checks every engine instruction against the reference
/// interpreter
#[derive(Debug)]
pub struct ValidatingTracer {
    config: ValidatorConfig,
    evm: CallOrchestrator,
    synchronizer: FusionSynchronizer,
    validator: DivergenceValidator,
    log: StepLog,

    active: bool,
    nested_depth: usize,
    pending: Option<Pending>,
    expected_next: Option<Cursor>,
    instruction_count: u64,
    first_block_gas: u64,

    last_frame: Option<ReferenceFrame>,
    divergence: Option<Divergence>,
    halted: bool,
}

impl Default for ValidatingTracer {
    fn default() -> Self {
        Self::new(ValidatorConfig::default(), OrchestratorConfig::default())
    }
}

impl ValidatingTracer {
    /// Tracer with a fresh host-less reference EVM
    pub fn new(config: ValidatorConfig, orchestrator: OrchestratorConfig) -> Self {
        Self::with_orchestrator(config, CallOrchestrator::new(orchestrator))
    }

    /// Tracer over a prepared reference EVM, e.g. one with a host attached
    /// or with pre-seeded accounts
    pub fn with_orchestrator(config: ValidatorConfig, evm: CallOrchestrator) -> Self {
        let synchronizer = FusionSynchronizer::new(evm.hardfork());
        let validator = DivergenceValidator::new(config.gas_slack_above, config.gas_slack_below);
        let log = StepLog::new(config.history_len, config.record_full_log);
        Self {
            config,
            evm,
            synchronizer,
            validator,
            log,
            active: false,
            nested_depth: 0,
            pending: None,
            expected_next: None,
            instruction_count: 0,
            first_block_gas: 0,
            last_frame: None,
            divergence: None,
            halted: false,
        }
    }

    /// Configuration
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Counters so far
    pub fn stats(&self) -> &ValidationStats {
        self.validator.stats()
    }

    /// First fatal divergence, when running with `abort_on_divergence` off
    pub fn divergence(&self) -> Option<&Divergence> {
        self.divergence.as_ref()
    }

    /// A fatal divergence stopped validation
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Steps of the frame being validated
    pub fn step_log(&self) -> &StepLog {
        &self.log
    }

    /// Reference EVM
    pub fn orchestrator(&self) -> &CallOrchestrator {
        &self.evm
    }

    /// Mutable reference EVM, for seeding state between frames
    pub fn orchestrator_mut(&mut self) -> &mut CallOrchestrator {
        &mut self.evm
    }

    /// Reference frame of the last completed top-level frame
    pub fn last_frame(&self) -> Option<&ReferenceFrame> {
        self.last_frame.as_ref()
    }

    /// Engine instructions seen in the current or last frame
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    fn tracking(&self) -> bool {
        self.active && self.nested_depth == 0 && !self.halted
    }

    // Copy the state the next primitive reads from the engine's backend into
    // the reference, for keys the reference has not seen yet.
    fn mirror_state<F: FrameView + ?Sized>(&mut self, frame: &F, opcode: UnifiedOpcode) {
        if self.evm.has_host() {
            return;
        }
        let Some(state) = frame.state() else {
            return;
        };
        let UnifiedOpcode::Primitive(byte) = opcode else {
            return;
        };
        let Some(op) = Opcode::from_byte(byte) else {
            return;
        };
        let Some(reference) = self.evm.current_frame() else {
            return;
        };
        let this = reference.address();
        let stack = reference.stack();
        let top = stack.peek(0).ok();

        let mut accounts: Vec<Address> = Vec::new();
        let mut slot = None;
        match op {
            Opcode::SLOAD | Opcode::SSTORE => slot = top,
            Opcode::BALANCE | Opcode::EXTCODESIZE | Opcode::EXTCODECOPY | Opcode::EXTCODEHASH => {
                accounts.extend(top.map(|w| Address::from_word(&w)));
            }
            Opcode::SELFBALANCE | Opcode::CREATE | Opcode::CREATE2 => accounts.push(this),
            Opcode::SELFDESTRUCT => {
                accounts.push(this);
                accounts.extend(top.map(|w| Address::from_word(&w)));
            }
            op if op.is_call() => {
                accounts.push(this);
                accounts.extend(stack.peek(1).ok().map(|w| Address::from_word(&w)));
            }
            _ => return,
        }

        if let Some(slot) = slot {
            if !self.evm.knows_storage(&this, &slot) {
                let value = state.get_storage(&this, &slot);
                trace!(address = %this, ?slot, ?value, "mirroring storage slot");
                self.evm.set_storage(this, slot, value);
            }
        }
        for address in accounts {
            if !self.evm.knows_account(&address) {
                trace!(%address, "mirroring account");
                self.evm.set_balance(address, state.get_balance(&address));
                self.evm.set_code(address, state.get_code(&address));
            }
        }
    }

    fn drive_and_validate<F: FrameView + ?Sized>(&mut self, frame: &F, opcode: UnifiedOpcode) {
        let pending = self.pending.take();
        let schedule_index = pending.map_or(0, |p| p.cursor.index);
        let block_gas = pending
            .filter(|_| opcode == UnifiedOpcode::from(Opcode::JUMPDEST))
            .and_then(|p| u64::try_from(p.gas_before.saturating_sub(frame.gas_remaining())).ok());

        let outcome = self.synchronizer.drive(&mut self.evm, opcode, block_gas, schedule_index, &mut self.log);
        let stats = self.validator.stats_mut();
        stats.primitive_steps += outcome.steps_completed as u64;
        if outcome.error.is_some() {
            stats.step_errors += 1;
        }
        if outcome.reconciled {
            stats.jumpdest_reconciliations += 1;
        }

        if let Some(mismatch) = outcome.pc_mismatch {
            let divergence = self.pc_divergence(frame, opcode, &mismatch);
            self.fail(divergence);
            return;
        }

        let Some(reference) = self.evm.current_frame() else {
            let report = self.report("reference frame missing", frame, opcode, outcome.start_pc);
            self.fail(Divergence::Assertion { message: "no reference frame to validate".into(), report });
            return;
        };
        let mismatch = match self.validator.validate(reference, frame, opcode, self.first_block_gas) {
            Ok(()) => return,
            Err(mismatch) => mismatch,
        };

        if matches!(mismatch, StackMismatch::Size { .. })
            && opcode.is_call_like()
            && self.config.exempt_calls_without_host
            && !self.evm.has_host()
        {
            self.validator.stats_mut().exempted_calls += 1;
            warn!(%opcode, pc = outcome.start_pc, ?mismatch, "stack mismatch after call without host, exempted");
            return;
        }
        let divergence = self.stack_divergence(frame, opcode, outcome.start_pc, mismatch);
        self.fail(divergence);
    }

    fn stack_divergence<F: FrameView + ?Sized>(
        &self,
        frame: &F,
        opcode: UnifiedOpcode,
        pc: usize,
        mismatch: StackMismatch,
    ) -> Divergence {
        let name = opcode.name().to_string();
        match mismatch {
            StackMismatch::Size { reference, engine } => Divergence::StackSize {
                opcode: name,
                pc,
                reference,
                engine,
                report: self.report("stack size mismatch", frame, opcode, pc),
            },
            StackMismatch::Content { depth, reference, engine } => Divergence::StackContent {
                opcode: name,
                pc,
                depth,
                reference: H256::from(reference).to_hex(),
                engine: H256::from(engine).to_hex(),
                report: self.report("stack content mismatch", frame, opcode, pc),
            },
        }
    }

    fn pc_divergence<F: FrameView + ?Sized>(&self, frame: &F, opcode: UnifiedOpcode, mismatch: &PcMismatch) -> Divergence {
        Divergence::PcMismatch {
            pc: mismatch.pc,
            claimed: mismatch.claimed.to_string(),
            found: mismatch.found_name().to_string(),
            report: self.report("pc mismatch", frame, opcode, mismatch.pc),
        }
    }

    fn report<F: FrameView + ?Sized>(&self, title: &str, frame: &F, opcode: UnifiedOpcode, pc: usize) -> String {
        let reference: &[U256] = self.evm.current_frame().map(|f| f.stack().as_slice()).unwrap_or_default();
        DiagnosticReport::new(title)
            .instruction(opcode, pc)
            .stacks(reference, frame.stack())
            .history(self.log.recent().iter())
            .stack_depth(self.config.report_stack_depth)
            .render()
    }

    fn history_report(&self, title: &str) -> String {
        DiagnosticReport::new(title).history(self.log.recent().iter()).render()
    }

    fn fail(&mut self, divergence: Divergence) {
        error!(kind = divergence.kind(), instructions = self.instruction_count, "{divergence}");
        if self.config.abort_on_divergence {
            panic!("lockstep divergence: {divergence}");
        }
        self.halted = true;
        self.divergence.get_or_insert(divergence);
    }

    fn teardown(&mut self) {
        self.last_frame = self.evm.finish_frame();
        while self.evm.finish_frame().is_some() {}
        self.active = false;
        self.pending = None;
        self.expected_next = None;
        self.log.clear();
    }
}

impl Tracer for ValidatingTracer {
    fn on_interpret<F: FrameView + ?Sized>(&mut self, frame: &F, bytecode: &[u8], gas_limit: u64) {
        if self.active {
            self.nested_depth += 1;
            trace!(depth = self.nested_depth, "nested engine frame skipped");
            return;
        }
        if self.halted {
            return;
        }

        let caller = frame.caller();
        let address = frame.address();
        self.evm.begin_transaction(caller, address);
        self.evm.push_frame(ReferenceFrame::new(
            Bytes::copy_from_slice(bytecode),
            gas_limit,
            caller,
            address,
            frame.value(),
            Bytes::copy_from_slice(frame.calldata()),
        ));
        self.synchronizer.reset();
        self.log = StepLog::new(self.config.history_len, self.config.record_full_log);
        self.instruction_count = 0;
        self.expected_next = None;
        self.pending = None;
        self.first_block_gas = u64::try_from(
            i64::try_from(gas_limit).unwrap_or(i64::MAX).saturating_sub(frame.gas_remaining()),
        )
        .unwrap_or(0);
        self.active = true;
        debug!(%caller, %address, gas_limit, first_block_gas = self.first_block_gas, code_len = bytecode.len(), "reference frame started");
    }

    fn before_instruction<F: FrameView + ?Sized>(&mut self, frame: &F, opcode: UnifiedOpcode, cursor: Cursor) {
        if !self.tracking() {
            return;
        }
        if cursor.handler != opcode {
            let report = self.report("handler mismatch", frame, opcode, self.synchronizer.tracker().pc());
            self.fail(Divergence::Assertion {
                message: format!("cursor {} dispatches {} but hook reports {}", cursor.index, cursor.handler, opcode),
                report,
            });
            return;
        }
        if let Some(expected) = self.expected_next.take() {
            if expected != cursor {
                let report = self.report("dispatch mismatch", frame, opcode, self.synchronizer.tracker().pc());
                self.fail(Divergence::DispatchMismatch {
                    expected: format!("{} at {}", expected.handler, expected.index),
                    actual: format!("{} at {}", cursor.handler, cursor.index),
                    report,
                });
                return;
            }
        }

        self.instruction_count += 1;
        if self.instruction_count > self.config.max_instructions {
            let report = self.history_report("instruction limit exceeded");
            self.fail(Divergence::InstructionLimit { limit: self.config.max_instructions, report });
            return;
        }

        self.mirror_state(frame, opcode);
        self.pending = Some(Pending { gas_before: frame.gas_remaining(), cursor });
    }

    fn after_instruction<F: FrameView + ?Sized>(&mut self, frame: &F, opcode: UnifiedOpcode, next: Cursor) {
        if !self.tracking() {
            return;
        }
        self.drive_and_validate(frame, opcode);
        if !self.halted {
            self.expected_next = Some(next);
        }
    }

    fn after_complete<F: FrameView + ?Sized>(&mut self, frame: &F, opcode: UnifiedOpcode) {
        if self.nested_depth > 0 {
            self.nested_depth -= 1;
            return;
        }
        if !self.active {
            return;
        }
        if !self.halted {
            self.drive_and_validate(frame, opcode);
        }
        debug!(instructions = self.instruction_count, steps = self.log.total(), "reference frame finished");
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unified::FusionKind;

    /// Engine frame that copies its state from a reference frame run in
    /// parallel, so it never diverges unless the test tampers with it
    struct Mirror {
        code: Vec<u8>,
        stack: Vec<U256>,
        gas: i64,
        memory: usize,
    }

    impl Mirror {
        fn new(code: &[u8], gas: i64) -> Self {
            Self { code: code.to_vec(), stack: Vec::new(), gas, memory: 0 }
        }
    }

    impl FrameView for Mirror {
        fn stack(&self) -> &[U256] {
            &self.stack
        }
        fn memory_size(&self) -> usize {
            self.memory
        }
        fn gas_remaining(&self) -> i64 {
            self.gas
        }
        fn bytecode(&self) -> &[u8] {
            &self.code
        }
        fn caller(&self) -> Address {
            Address::from_low_u8(0xAA)
        }
        fn address(&self) -> Address {
            Address::from_low_u8(0xBB)
        }
        fn value(&self) -> U256 {
            U256::zero()
        }
        fn calldata(&self) -> &[u8] {
            &[]
        }
    }

    fn tracer() -> ValidatingTracer {
        ValidatingTracer::new(ValidatorConfig::recording(), OrchestratorConfig::default())
    }

    #[test]
    fn test_fused_program_validates() {
        // PUSH1 2, PUSH1 3, ADD, STOP run as PUSH1 then PUSH_ADD then STOP
        let code = [0x60, 0x02, 0x60, 0x03, 0x01, 0x00];
        let mut engine = Mirror::new(&code, 100 - 9);
        let mut tracer = tracer();
        let push: UnifiedOpcode = Opcode::PUSH1.into();
        let push_add: UnifiedOpcode = FusionKind::PushAdd.into();
        let stop: UnifiedOpcode = Opcode::STOP.into();

        tracer.on_interpret(&engine, &code, 100);
        tracer.before_instruction(&engine, push, Cursor::new(0, push));
        engine.stack.push(U256::from(2));
        tracer.after_instruction(&engine, push, Cursor::new(1, push_add));
        tracer.before_instruction(&engine, push_add, Cursor::new(1, push_add));
        engine.stack[0] = U256::from(5);
        tracer.after_instruction(&engine, push_add, Cursor::new(2, stop));
        tracer.before_instruction(&engine, stop, Cursor::new(2, stop));
        tracer.after_complete(&engine, stop);

        assert!(tracer.divergence().is_none());
        assert_eq!(tracer.stats().instructions, 3);
        assert_eq!(tracer.stats().primitive_steps, 4);
        assert_eq!(tracer.stats().synthetic_instructions, 1);
        assert_eq!(tracer.stats().gas_warnings, 0);
        let last = tracer.last_frame().unwrap();
        assert!(last.is_stopped());
        assert_eq!(last.gas_remaining(), 91);
        assert!(tracer.step_log().recent().is_empty());
    }

    #[test]
    fn test_wrong_stack_is_recorded() {
        let code = [0x60, 0x02, 0x00];
        let mut engine = Mirror::new(&code, 97);
        let mut tracer = tracer();
        let push: UnifiedOpcode = Opcode::PUSH1.into();

        tracer.on_interpret(&engine, &code, 100);
        tracer.before_instruction(&engine, push, Cursor::new(0, push));
        engine.stack.push(U256::from(3));
        tracer.after_instruction(&engine, push, Cursor::new(1, Opcode::STOP.into()));

        let divergence = tracer.divergence().unwrap();
        assert_eq!(divergence.kind(), "stack-content");
        assert!(divergence.report().contains("stack content mismatch"));
        assert!(tracer.is_halted());
    }

    #[test]
    fn test_handler_identity_asserted() {
        let code = [0x00];
        let engine = Mirror::new(&code, 100);
        let mut tracer = tracer();

        tracer.on_interpret(&engine, &code, 100);
        tracer.before_instruction(&engine, Opcode::STOP.into(), Cursor::new(0, Opcode::ADD.into()));
        assert_eq!(tracer.divergence().map(Divergence::kind), Some("assertion"));
    }

    #[test]
    #[should_panic(expected = "lockstep divergence")]
    fn test_abort_mode_panics() {
        let code = [0x00];
        let engine = Mirror::new(&code, 100);
        let mut tracer = ValidatingTracer::default();

        tracer.on_interpret(&engine, &code, 100);
        tracer.before_instruction(&engine, Opcode::STOP.into(), Cursor::new(0, Opcode::ADD.into()));
    }

    #[test]
    fn test_nested_frames_are_skipped() {
        let code = [0x00];
        let engine = Mirror::new(&code, 100);
        let mut tracer = tracer();
        let stop: UnifiedOpcode = Opcode::STOP.into();

        tracer.on_interpret(&engine, &code, 100);
        tracer.on_interpret(&engine, &code, 50);
        // a nonsense claim inside the nested frame is ignored
        tracer.before_instruction(&engine, stop, Cursor::new(0, Opcode::ADD.into()));
        tracer.after_complete(&engine, stop);
        assert!(tracer.divergence().is_none());

        tracer.before_instruction(&engine, stop, Cursor::new(0, stop));
        tracer.after_complete(&engine, stop);
        assert!(tracer.divergence().is_none());
        assert_eq!(tracer.stats().instructions, 1);
    }
}
