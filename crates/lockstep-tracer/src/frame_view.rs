//! Narrow view of an engine frame
//!
//! Engines implement [`FrameView`] for their own frame type so the tracer can
//! read stack, memory size, gas and code without knowing the layout.

use lockstep_evm::{ReferenceFrame, StateView};
use lockstep_primitives::{Address, U256};

use crate::unified::UnifiedOpcode;

/// Accessors the tracer needs from an executing frame
pub trait FrameView {
    /// Stack contents, bottom first; the top of the stack is the last item
    fn stack(&self) -> &[U256];

    /// Memory size in bytes as MSIZE would report it
    fn memory_size(&self) -> usize;

    /// Signed gas remaining
    fn gas_remaining(&self) -> i64;

    /// Code being executed
    fn bytecode(&self) -> &[u8];

    /// `CALLER`
    fn caller(&self) -> Address;

    /// Executing account
    fn address(&self) -> Address;

    /// `CALLVALUE`
    fn value(&self) -> U256;

    /// Input data
    fn calldata(&self) -> &[u8];

    /// Account state of the owning EVM, when the engine runs against a real
    /// state backend
    fn state(&self) -> Option<&dyn StateView> {
        None
    }

    /// Program counter as a bytecode offset, for frames that track one
    fn pc(&self) -> Option<usize> {
        None
    }

    /// Number of stack items
    fn stack_size(&self) -> usize {
        self.stack().len()
    }

    /// Item `depth` positions below the top
    fn peek(&self, depth: usize) -> Option<U256> {
        let stack = self.stack();
        stack.len().checked_sub(depth + 1).map(|i| stack[i])
    }
}

impl FrameView for ReferenceFrame {
    fn stack(&self) -> &[U256] {
        ReferenceFrame::stack(self).as_slice()
    }

    fn memory_size(&self) -> usize {
        self.memory().msize()
    }

    fn gas_remaining(&self) -> i64 {
        ReferenceFrame::gas_remaining(self)
    }

    fn bytecode(&self) -> &[u8] {
        ReferenceFrame::bytecode(self)
    }

    fn caller(&self) -> Address {
        ReferenceFrame::caller(self)
    }

    fn address(&self) -> Address {
        ReferenceFrame::address(self)
    }

    fn value(&self) -> U256 {
        ReferenceFrame::value(self)
    }

    fn calldata(&self) -> &[u8] {
        ReferenceFrame::calldata(self)
    }

    fn pc(&self) -> Option<usize> {
        Some(ReferenceFrame::pc(self))
    }
}

/// Position in the engine's instruction schedule.
///
/// `handler` is the tag dispatched at `index`; the tracer compares it to
/// what the previous instruction announced as its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Index into the engine's schedule
    pub index: usize,
    /// Instruction the engine will run at `index`
    pub handler: UnifiedOpcode,
}

impl Cursor {
    /// Cursor at `index` dispatching `handler`
    pub fn new(index: usize, handler: UnifiedOpcode) -> Self {
        Self { index, handler }
    }
}
