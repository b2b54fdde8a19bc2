//! Engine-facing tracer hooks
//!
//! An engine is generic over `T: Tracer` and calls the hooks inline from its
//! dispatch loop, in this order for every instruction:
//!
//! 1. `before_instruction`
//! 2. the engine executes the instruction
//! 3. `after_instruction`, or `after_complete` when the instruction ended
//!    the frame
//!
//! `on_interpret` fires once at the start of every frame, nested ones
//! included. [`NoopTracer`] implements every hook as an empty inline body, so
//! an engine monomorphised over it carries no tracing cost.

use crate::frame_view::{Cursor, FrameView};
use crate::unified::UnifiedOpcode;

/// Hooks called by an engine around each instruction
pub trait Tracer {
    /// A frame starts executing `bytecode` with `gas_limit`
    #[inline(always)]
    fn on_interpret<F: FrameView + ?Sized>(&mut self, frame: &F, bytecode: &[u8], gas_limit: u64) {
        let _ = (frame, bytecode, gas_limit);
    }

    /// `opcode` is about to run from `cursor`
    #[inline(always)]
    fn before_instruction<F: FrameView + ?Sized>(&mut self, frame: &F, opcode: UnifiedOpcode, cursor: Cursor) {
        let _ = (frame, opcode, cursor);
    }

    /// `opcode` ran and the engine will dispatch `next`
    #[inline(always)]
    fn after_instruction<F: FrameView + ?Sized>(&mut self, frame: &F, opcode: UnifiedOpcode, next: Cursor) {
        let _ = (frame, opcode, next);
    }

    /// `opcode` ended the frame
    #[inline(always)]
    fn after_complete<F: FrameView + ?Sized>(&mut self, frame: &F, opcode: UnifiedOpcode) {
        let _ = (frame, opcode);
    }
}

/// Tracer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Tracer chosen by the `validate` feature
#[cfg(feature = "validate")]
pub type SelectedTracer = crate::validating::ValidatingTracer;

/// Tracer chosen by the `validate` feature
#[cfg(not(feature = "validate"))]
pub type SelectedTracer = NoopTracer;

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_evm::{Address, Bytes, Opcode, ReferenceFrame, U256};

    #[test]
    fn test_noop_tracer_accepts_every_hook() {
        let frame = ReferenceFrame::new(
            Bytes::from_static(&[0x00]),
            100,
            Address::ZERO,
            Address::ZERO,
            U256::zero(),
            Bytes::new(),
        );
        let mut tracer = NoopTracer;
        let stop = UnifiedOpcode::from(Opcode::STOP);
        tracer.on_interpret(&frame, &[0x00], 100);
        tracer.before_instruction(&frame, stop, Cursor::new(0, stop));
        tracer.after_complete(&frame, stop);
        assert_eq!(std::mem::size_of::<NoopTracer>(), 0);
    }
}
