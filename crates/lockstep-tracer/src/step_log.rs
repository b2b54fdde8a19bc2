//! Per-step audit records

use std::collections::VecDeque;

use lockstep_primitives::U256;

use crate::unified::UnifiedOpcode;

/// Stack items copied into each record, top first
pub const SNAPSHOT_DEPTH: usize = 4;

/// One primitive step driven on the reference interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStep {
    /// Running step number
    pub index: u64,
    /// Primitive byte executed
    pub opcode: u8,
    /// Engine instruction the step belongs to
    pub instruction: UnifiedOpcode,
    /// Reference pc before the step
    pub pc: usize,
    /// Reference gas before the step
    pub gas_before: i64,
    /// Reference gas after the step, reconciliation included
    pub gas_after: i64,
    /// Stack length before
    pub stack_before: usize,
    /// Stack length after
    pub stack_after: usize,
    /// MSIZE after
    pub memory_size: usize,
    /// Engine schedule index of the instruction
    pub schedule_index: usize,
    /// Part of a fused instruction
    pub synthetic: bool,
    /// The step raised an interpreter error
    pub error_occurred: bool,
    /// Top of the stack after the step
    pub stack_snapshot: Vec<U256>,
}

/// Fixed-capacity FIFO that drops its oldest entry when full
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Buffer holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { items: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append, evicting the oldest entry if full
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Entries oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// No entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Recent history plus the optional full log
#[derive(Debug, Clone)]
pub struct StepLog {
    recent: RingBuffer<ExecutionStep>,
    full: Option<Vec<ExecutionStep>>,
    next_index: u64,
}

impl StepLog {
    /// Log keeping `history_len` recent steps, and every step if `full`
    pub fn new(history_len: usize, full: bool) -> Self {
        Self {
            recent: RingBuffer::new(history_len),
            full: full.then(Vec::new),
            next_index: 0,
        }
    }

    /// Number the next record
    pub fn next_index(&mut self) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Store a record
    pub fn record(&mut self, step: ExecutionStep) {
        if let Some(full) = self.full.as_mut() {
            full.push(step.clone());
        }
        self.recent.push(step);
    }

    /// Recent steps, oldest first
    pub fn recent(&self) -> &RingBuffer<ExecutionStep> {
        &self.recent
    }

    /// Every step, when full logging is on
    pub fn full(&self) -> Option<&[ExecutionStep]> {
        self.full.as_deref()
    }

    /// Steps recorded so far
    pub fn total(&self) -> u64 {
        self.next_index
    }

    /// Release every record
    pub fn clear(&mut self) {
        self.recent.clear();
        if let Some(full) = self.full.as_mut() {
            full.clear();
            full.shrink_to_fit();
        }
    }
}
