//! Independent program counter tracking
//!
//! The tracker derives the pc from raw bytecode alone and checks each
//! primitive the engine claims to run against the byte actually found
//! there. It never looks at the engine's cursor.

use lockstep_evm::{opcode::push_size, opcode_name, Opcode};
use lockstep_primitives::U256;
use tracing::{debug, trace};

use crate::frame_view::FrameView;
use crate::unified::PatternStep;

/// A claimed primitive that does not match the bytecode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcMismatch {
    /// Tracked pc
    pub pc: usize,
    /// What the engine claimed
    pub claimed: PatternStep,
    /// Byte found at `pc`
    pub found: u8,
    /// Pc the frame reported, when it differs from the tracked one
    pub frame_pc: Option<usize>,
}

impl PcMismatch {
    /// Name of the byte found
    pub fn found_name(&self) -> &'static str {
        opcode_name(self.found)
    }
}

/// Pc recomputed from bytecode
#[derive(Debug, Clone)]
pub struct PcTracker {
    pc: usize,
    valid: bool,
    frozen: bool,
    static_jumps: u64,
}

impl Default for PcTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PcTracker {
    /// Tracker positioned at pc 0
    pub fn new() -> Self {
        Self { pc: 0, valid: true, frozen: false, static_jumps: 0 }
    }

    /// Restart at pc 0 for a new frame
    pub fn reset(&mut self) {
        *self = Self { static_jumps: self.static_jumps, ..Self::new() };
    }

    /// Tracked pc
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Tracking is still meaningful
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// A halting opcode was tracked
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// PUSH followed by JUMP or JUMPI seen so far
    pub fn static_jumps(&self) -> u64 {
        self.static_jumps
    }

    /// Check one claimed primitive and advance.
    ///
    /// Must run before the primitive executes: jump targets are read from
    /// the stack it is about to consume. A mismatch invalidates the tracker
    /// for the rest of the frame.
    pub fn execute<F: FrameView + ?Sized>(
        &mut self,
        frame: &F,
        claimed: PatternStep,
    ) -> Result<(), PcMismatch> {
        if !self.valid || self.frozen {
            return Ok(());
        }
        let code = frame.bytecode();
        // past the end the EVM sees an implicit STOP
        let byte = code.get(self.pc).copied().unwrap_or(Opcode::STOP.byte());

        let frame_pc = frame.pc().filter(|pc| *pc != self.pc);
        if !claimed.matches(byte) || frame_pc.is_some() {
            self.valid = false;
            return Err(PcMismatch { pc: self.pc, claimed, found: byte, frame_pc });
        }

        match Opcode::from_byte(byte) {
            Some(Opcode::JUMP) => {
                let dest = frame.peek(0).unwrap_or_default();
                self.jump(code, dest);
            }
            Some(Opcode::JUMPI) => {
                let dest = frame.peek(0).unwrap_or_default();
                let condition = frame.peek(1).unwrap_or_default();
                if condition.is_zero() {
                    self.pc += 1;
                } else {
                    self.jump(code, dest);
                }
            }
            Some(op) if op.is_push() => {
                self.pc += 1 + push_size(byte);
                if matches!(code.get(self.pc), Some(&b) if b == Opcode::JUMP.byte() || b == Opcode::JUMPI.byte()) {
                    self.static_jumps += 1;
                    trace!(pc = self.pc, "static jump");
                }
            }
            Some(Opcode::STOP | Opcode::RETURN | Opcode::REVERT | Opcode::SELFDESTRUCT) => {
                self.frozen = true;
            }
            Some(Opcode::INVALID) | None => {
                debug!(pc = self.pc, byte, "invalid opcode tracked");
                self.valid = false;
            }
            Some(_) => self.pc += 1,
        }
        Ok(())
    }

    fn jump(&mut self, code: &[u8], dest: U256) {
        let target = (dest <= U256::from(code.len()))
            .then(|| dest.low_u64() as usize)
            .filter(|t| code.get(*t) == Some(&Opcode::JUMPDEST.byte()));
        match target {
            Some(target) => self.pc = target,
            None => {
                debug!(pc = self.pc, ?dest, "jump to non-JUMPDEST, tracking stops");
                self.valid = false;
            }
        }
    }
}
