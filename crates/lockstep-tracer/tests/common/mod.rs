//! Mock optimizing engine for tracer tests
//!
//! The engine preprocesses bytecode into a schedule of unified opcodes,
//! fusing patterns longest first, and charges gas per basic block the way a
//! block-precompiling engine does. Its semantics come from a private
//! reference orchestrator stepped in parallel, so a correct mock never
//! diverges; the `Bug` knobs tamper with what it exposes.

#![allow(dead_code)]

use std::collections::HashMap;

use lockstep_evm::gas::static_gas;
use lockstep_evm::opcode::push_size;
use lockstep_evm::{
    Address, Bytes, CallOrchestrator, Hardfork, Opcode, OrchestratorConfig, ReferenceFrame, StateView, U256,
};
use lockstep_tracer::{Cursor, FrameView, FusionKind, Tracer, UnifiedOpcode};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn caller() -> Address {
    Address::from_low_u8(0xAA)
}

pub fn contract() -> Address {
    Address::from_low_u8(0xBB)
}

pub fn callee() -> Address {
    Address::from_low_u8(0xCC)
}

// =============================================================================
// World state exposed to the tracer
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct World {
    pub balances: HashMap<Address, U256>,
    pub code: HashMap<Address, Bytes>,
    pub storage: HashMap<(Address, U256), U256>,
}

impl StateView for World {
    fn get_balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn get_code(&self, address: &Address) -> Bytes {
        self.code.get(address).cloned().unwrap_or_default()
    }

    fn get_storage(&self, address: &Address, slot: &U256) -> U256 {
        self.storage.get(&(*address, *slot)).copied().unwrap_or_default()
    }
}

// =============================================================================
// Engine frame
// =============================================================================

#[derive(Debug, Clone)]
pub struct EngineFrame {
    code: Vec<u8>,
    stack: Vec<U256>,
    memory_size: usize,
    gas: i64,
    calldata: Vec<u8>,
    world: Option<World>,
}

impl FrameView for EngineFrame {
    fn stack(&self) -> &[U256] {
        &self.stack
    }

    fn memory_size(&self) -> usize {
        self.memory_size
    }

    fn gas_remaining(&self) -> i64 {
        self.gas
    }

    fn bytecode(&self) -> &[u8] {
        &self.code
    }

    fn caller(&self) -> Address {
        caller()
    }

    fn address(&self) -> Address {
        contract()
    }

    fn value(&self) -> U256 {
        U256::zero()
    }

    fn calldata(&self) -> &[u8] {
        &self.calldata
    }

    fn state(&self) -> Option<&dyn StateView> {
        self.world.as_ref().map(|w| w as &dyn StateView)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Deliberate engine defects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bug {
    None,
    /// Add one to the top of the stack after the instruction at this index
    CorruptTop(usize),
    /// Add one to the item just below the top after the instruction at this index
    CorruptSecond(usize),
    /// Drop the top of the stack after the instruction at this index
    DropItem(usize),
    /// Report ADD (or SUB when the real opcode is ADD) at this index
    Mislabel(usize),
    /// Announce a successor one past the real one after this index
    SkipCursor(usize),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    pc: usize,
    op: UnifiedOpcode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutcome {
    pub success: bool,
    pub stack: Vec<U256>,
    pub gas_left: i64,
    pub instructions: usize,
}

pub struct MockEngine {
    fork: Hardfork,
    code: Vec<u8>,
    gas_limit: u64,
    calldata: Vec<u8>,
    fusions: Vec<FusionKind>,
    world: World,
    expose_world: bool,
    bug: Bug,
    max_instructions: usize,
}

impl MockEngine {
    pub fn new(code: &[u8], gas_limit: u64) -> Self {
        Self {
            fork: Hardfork::Cancun,
            code: code.to_vec(),
            gas_limit,
            calldata: Vec::new(),
            fusions: Vec::new(),
            world: World::default(),
            expose_world: true,
            bug: Bug::None,
            max_instructions: 10_000,
        }
    }

    /// Fuse every known pattern
    pub fn fused(mut self) -> Self {
        self.fusions = FusionKind::ALL.to_vec();
        self
    }

    pub fn with_fusions(mut self, kinds: &[FusionKind]) -> Self {
        self.fusions = kinds.to_vec();
        self
    }

    pub fn with_calldata(mut self, calldata: &[u8]) -> Self {
        self.calldata = calldata.to_vec();
        self
    }

    pub fn with_world(mut self, world: World) -> Self {
        self.world = world;
        self
    }

    /// Keep the world private: the tracer sees no state backend
    pub fn hide_world(mut self) -> Self {
        self.expose_world = false;
        self
    }

    pub fn with_bug(mut self, bug: Bug) -> Self {
        self.bug = bug;
        self
    }

    pub fn with_max_instructions(mut self, max: usize) -> Self {
        self.max_instructions = max;
        self
    }

    /// Instruction schedule, longest fusion first at each pc
    pub fn schedule(&self) -> Vec<UnifiedOpcode> {
        self.build_schedule().into_iter().map(|e| e.op).collect()
    }

    fn build_schedule(&self) -> Vec<Entry> {
        let mut kinds = self.fusions.clone();
        kinds.sort_by_key(|k| std::cmp::Reverse(k.step_count()));

        let mut entries = Vec::new();
        let mut pc = 0;
        while pc < self.code.len() {
            let fused = kinds.iter().copied().find(|k| k.matches_at(&self.code, pc));
            match fused {
                Some(kind) => {
                    entries.push(Entry { pc, op: kind.into() });
                    for _ in 0..kind.step_count() {
                        pc += 1 + push_size(self.code[pc]);
                    }
                }
                None => {
                    entries.push(Entry { pc, op: UnifiedOpcode::Primitive(self.code[pc]) });
                    pc += 1 + push_size(self.code[pc]);
                }
            }
        }
        // implicit STOP past the end of the code
        entries.push(Entry { pc: pc.max(self.code.len()), op: Opcode::STOP.into() });
        entries
    }

    /// Static gas of the basic block starting at `start`
    fn block_gas(&self, start: usize) -> u64 {
        let mut total = 0;
        let mut pc = start;
        while let Some(&byte) = self.code.get(pc) {
            if pc != start && byte == Opcode::JUMPDEST.byte() {
                break;
            }
            let Some(op) = Opcode::from_byte(byte) else {
                break;
            };
            total += static_gas(op, self.fork);
            if matches!(
                op,
                Opcode::JUMP
                    | Opcode::JUMPI
                    | Opcode::STOP
                    | Opcode::RETURN
                    | Opcode::REVERT
                    | Opcode::SELFDESTRUCT
                    | Opcode::INVALID
            ) {
                break;
            }
            pc += 1 + push_size(byte);
        }
        total
    }

    /// Run the program, calling `tracer` the way a real engine would
    pub fn run<T: Tracer>(&self, tracer: &mut T) -> EngineOutcome {
        let schedule = self.build_schedule();
        let index_of: HashMap<usize, usize> = schedule.iter().enumerate().map(|(i, e)| (e.pc, i)).collect();

        let mut evm = CallOrchestrator::new(OrchestratorConfig::with_hardfork(self.fork));
        for (address, balance) in &self.world.balances {
            evm.set_balance(*address, *balance);
        }
        for (address, code) in &self.world.code {
            evm.set_code(*address, code.clone());
        }
        for ((address, slot), value) in &self.world.storage {
            evm.set_storage(*address, *slot, *value);
        }
        evm.begin_transaction(caller(), contract());
        evm.push_frame(ReferenceFrame::new(
            Bytes::copy_from_slice(&self.code),
            self.gas_limit,
            caller(),
            contract(),
            U256::zero(),
            Bytes::copy_from_slice(&self.calldata),
        ));

        // a leading JUMPDEST charges its own block when it runs
        let first_block = match self.code.first() {
            Some(&byte) if byte == Opcode::JUMPDEST.byte() => 0,
            _ => self.block_gas(0),
        };
        let mut frame = EngineFrame {
            code: self.code.clone(),
            stack: Vec::new(),
            memory_size: 0,
            gas: self.gas_limit as i64 - first_block as i64,
            calldata: self.calldata.clone(),
            world: self.expose_world.then(|| self.world.clone()),
        };
        let mut precharged = true;

        tracer.on_interpret(&frame, &self.code, self.gas_limit);

        let mut index = 0;
        let mut instructions = 0;
        loop {
            let entry = schedule[index];
            let claimed = match self.bug {
                Bug::Mislabel(at) if at == index => {
                    if entry.op == UnifiedOpcode::from(Opcode::ADD) {
                        Opcode::SUB.into()
                    } else {
                        Opcode::ADD.into()
                    }
                }
                _ => entry.op,
            };
            tracer.before_instruction(&frame, claimed, Cursor::new(index, claimed));

            for _ in 0..entry.op.step_count() {
                let reference = evm.current_frame().expect("engine frame");
                if reference.is_finished() {
                    break;
                }
                let pc = reference.pc();
                let byte = reference.current_byte().unwrap_or(0x00);
                let gas_before = reference.gas_remaining();
                let result = evm.step();
                let reference = evm.current_frame().expect("engine frame");
                let spent = (gas_before - reference.gas_remaining()).max(0);
                let fixed = Opcode::from_byte(byte).map_or(0, |op| static_gas(op, self.fork)) as i64;

                if byte == Opcode::JUMPDEST.byte() && result.is_ok() {
                    frame.gas -= self.block_gas(pc) as i64;
                    precharged = true;
                } else if precharged {
                    frame.gas -= spent - fixed.min(spent);
                } else {
                    frame.gas -= spent;
                }
                // a not-taken JUMPI falls into code nobody pre-charged
                if byte == Opcode::JUMPI.byte() && result.is_ok() && !reference.is_finished() {
                    let next = reference.pc();
                    if self.code.get(next) != Some(&Opcode::JUMPDEST.byte()) {
                        precharged = false;
                    }
                }
                if result.is_err() {
                    break;
                }
            }

            let reference = evm.current_frame().expect("engine frame");
            frame.stack = reference.stack().as_slice().to_vec();
            frame.memory_size = reference.memory().msize();
            match self.bug {
                Bug::CorruptTop(at) if at == index => {
                    if let Some(top) = frame.stack.last_mut() {
                        *top = top.overflowing_add(U256::one()).0;
                    }
                }
                Bug::CorruptSecond(at) if at == index => {
                    let len = frame.stack.len();
                    if len >= 2 {
                        frame.stack[len - 2] = frame.stack[len - 2].overflowing_add(U256::one()).0;
                    }
                }
                Bug::DropItem(at) if at == index => {
                    frame.stack.pop();
                }
                _ => {}
            }
            instructions += 1;

            if reference.is_finished() || instructions >= self.max_instructions {
                tracer.after_complete(&frame, claimed);
                break;
            }

            let next = match index_of.get(&reference.pc()) {
                Some(&next) => next,
                None => schedule.len() - 1,
            };
            let announced = match self.bug {
                Bug::SkipCursor(at) if at == index => next + 1,
                _ => next,
            };
            let handler = schedule.get(announced).map_or(schedule[next].op, |e| e.op);
            tracer.after_instruction(&frame, claimed, Cursor::new(announced, handler));
            index = next;
        }

        let reference = evm.current_frame().expect("engine frame");
        EngineOutcome {
            success: reference.is_success(),
            stack: frame.stack.clone(),
            gas_left: frame.gas,
            instructions,
        }
    }
}
