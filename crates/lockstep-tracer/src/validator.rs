//! Divergence validator
//!
//! Compares the reference frame against the engine frame after each engine
//! instruction. Only the stack is authoritative: a stack mismatch is
//! returned to the caller, while memory size and gas differences are logged
//! and counted.

use lockstep_evm::ReferenceFrame;
use lockstep_primitives::U256;
use serde::Serialize;
use tracing::warn;

use crate::frame_view::FrameView;
use crate::unified::UnifiedOpcode;

/// How the two stacks disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMismatch {
    /// Different lengths
    Size {
        /// Reference stack length
        reference: usize,
        /// Engine stack length
        engine: usize,
    },
    /// Same length, first differing item counted from the top
    Content {
        /// Distance from the top
        depth: usize,
        /// Reference item
        reference: U256,
        /// Engine item
        engine: U256,
    },
}

/// Counters kept across a validation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    /// Engine instructions validated
    pub instructions: u64,
    /// Primitive steps driven on the reference
    pub primitive_steps: u64,
    /// Engine instructions that were fused
    pub synthetic_instructions: u64,
    /// Gas outside the tolerated window
    pub gas_warnings: u64,
    /// Memory size differences
    pub memory_warnings: u64,
    /// Stack mismatches downgraded after call-like instructions
    pub exempted_calls: u64,
    /// Reference steps that raised an interpreter error
    pub step_errors: u64,
    /// JUMPDEST block pre-charges applied
    pub jumpdest_reconciliations: u64,
}

/// Post-instruction state comparison
#[derive(Debug, Clone)]
pub struct DivergenceValidator {
    gas_slack_above: i64,
    gas_slack_below: i64,
    stats: ValidationStats,
}

impl DivergenceValidator {
    /// Validator tolerating the given gas lag in each direction
    pub fn new(gas_slack_above: i64, gas_slack_below: i64) -> Self {
        Self { gas_slack_above, gas_slack_below, stats: ValidationStats::default() }
    }

    /// Counters so far
    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    /// Mutable counters, for the owning tracer
    pub fn stats_mut(&mut self) -> &mut ValidationStats {
        &mut self.stats
    }

    /// Compare both frames after `opcode`.
    ///
    /// `first_block_gas` is the gas the engine charged up front for the
    /// first basic block; it widens the window the engine may run ahead of
    /// the reference for non-terminal instructions.
    pub fn validate<F: FrameView + ?Sized>(
        &mut self,
        reference: &ReferenceFrame,
        engine: &F,
        opcode: UnifiedOpcode,
        first_block_gas: u64,
    ) -> Result<(), StackMismatch> {
        self.stats.instructions += 1;
        if opcode.is_synthetic() {
            self.stats.synthetic_instructions += 1;
        }

        self.check_memory(reference, engine, opcode);
        self.check_gas(reference, engine, opcode, first_block_gas);
        compare_stacks(reference.stack().as_slice(), engine.stack())
    }

    fn check_memory<F: FrameView + ?Sized>(
        &mut self,
        reference: &ReferenceFrame,
        engine: &F,
        opcode: UnifiedOpcode,
    ) {
        let reference_size = reference.memory().msize();
        let engine_size = engine.memory_size();
        if reference_size != engine_size {
            self.stats.memory_warnings += 1;
            warn!(%opcode, pc = reference.pc(), reference_size, engine_size, "memory size mismatch");
        }
    }

    fn check_gas<F: FrameView + ?Sized>(
        &mut self,
        reference: &ReferenceFrame,
        engine: &F,
        opcode: UnifiedOpcode,
        first_block_gas: u64,
    ) {
        let reference_gas = reference.gas_remaining();
        let engine_gas = engine.gas_remaining();
        let delta = reference_gas.saturating_sub(engine_gas);

        if opcode.is_terminal() {
            if delta != 0 {
                self.stats.gas_warnings += 1;
                warn!(%opcode, pc = reference.pc(), reference_gas, engine_gas, "gas mismatch at terminal instruction");
            }
            return;
        }

        let above = i64::try_from(first_block_gas)
            .unwrap_or(i64::MAX)
            .saturating_add(self.gas_slack_above);
        if delta > above || delta < -self.gas_slack_below {
            self.stats.gas_warnings += 1;
            warn!(
                %opcode,
                pc = reference.pc(),
                reference_gas,
                engine_gas,
                delta,
                allowed_above = above,
                allowed_below = self.gas_slack_below,
                "gas outside tolerated window"
            );
        }
    }
}

/// Compare two bottom-first stacks, walking from the top
pub fn compare_stacks(reference: &[U256], engine: &[U256]) -> Result<(), StackMismatch> {
    if reference.len() != engine.len() {
        return Err(StackMismatch::Size { reference: reference.len(), engine: engine.len() });
    }
    reference
        .iter()
        .rev()
        .zip(engine.iter().rev())
        .enumerate()
        .find(|(_, (r, e))| r != e)
        .map_or(Ok(()), |(depth, (r, e))| {
            Err(StackMismatch::Content { depth, reference: *r, engine: *e })
        })
}
