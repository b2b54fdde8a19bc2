//! Unified opcodes: primitive EVM opcodes plus fused synthetic instructions
//!
//! The fusion table below is the only place that knows how many primitive
//! steps a synthetic instruction stands for and which primitives it covers.

use std::fmt;

use lockstep_evm::{opcode_name, Opcode};

/// First identifier used for synthetic opcodes
pub const SYNTHETIC_BASE: u16 = 0x100;

/// One position in a fusion pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternStep {
    /// Exactly this opcode
    Op(Opcode),
    /// Any PUSH, PUSH0 included
    AnyPush,
    /// PUSH with exactly this many immediate bytes
    Push(usize),
    /// Any DUP
    AnyDup,
    /// A raw primitive byte, defined opcode or not
    Byte(u8),
}

impl PatternStep {
    /// Whether the raw byte `byte` fits this position
    pub fn matches(self, byte: u8) -> bool {
        match self {
            PatternStep::Op(op) => op.byte() == byte,
            PatternStep::AnyPush => (0x5F..=0x7F).contains(&byte),
            PatternStep::Push(n) => Opcode::from_byte(byte).is_some_and(|op| op.is_push() && op.push_size() == n),
            PatternStep::AnyDup => (0x80..=0x8F).contains(&byte),
            PatternStep::Byte(expected) => expected == byte,
        }
    }

    /// The single opcode this position stands for, if it is not a wildcard
    pub fn exact(self) -> Option<Opcode> {
        match self {
            PatternStep::Op(op) => Some(op),
            PatternStep::Byte(byte) => Opcode::from_byte(byte),
            _ => None,
        }
    }
}

impl fmt::Display for PatternStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternStep::Op(op) => f.write_str(op.name()),
            PatternStep::AnyPush => f.write_str("PUSH*"),
            PatternStep::Push(n) => write!(f, "PUSH{n}"),
            PatternStep::AnyDup => f.write_str("DUP*"),
            PatternStep::Byte(byte) => f.write_str(opcode_name(*byte)),
        }
    }
}

/// Fused instruction shapes produced by the optimized engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FusionKind {
    /// PUSH, ADD
    PushAdd,
    /// PUSH, SUB
    PushSub,
    /// PUSH, MUL
    PushMul,
    /// PUSH, DIV
    PushDiv,
    /// PUSH, AND
    PushAnd,
    /// PUSH, OR
    PushOr,
    /// PUSH, XOR
    PushXor,
    /// PUSH, EQ
    PushEq,
    /// PUSH, LT
    PushLt,
    /// PUSH, GT
    PushGt,
    /// PUSH, JUMP (static jump)
    PushJump,
    /// PUSH, JUMPI (static conditional jump)
    PushJumpi,
    /// PUSH, MLOAD
    PushMload,
    /// PUSH, MSTORE
    PushMstore,
    /// DUP, ISZERO
    DupIszero,
    /// ISZERO, JUMPI
    IszeroJumpi,
    /// DUP, PUSH, EQ
    DupPushEq,
    /// PUSH, PUSH, ADD
    PushPushAdd,
    /// ISZERO, PUSH, JUMPI
    IszeroPushJumpi,
    /// PUSH4 selector, EQ, PUSH target, JUMPI
    FunctionDispatch,
}

use PatternStep::{AnyDup, AnyPush, Op};

impl FusionKind {
    /// Every fusion kind, in identifier order
    pub const ALL: [FusionKind; 20] = [
        FusionKind::PushAdd,
        FusionKind::PushSub,
        FusionKind::PushMul,
        FusionKind::PushDiv,
        FusionKind::PushAnd,
        FusionKind::PushOr,
        FusionKind::PushXor,
        FusionKind::PushEq,
        FusionKind::PushLt,
        FusionKind::PushGt,
        FusionKind::PushJump,
        FusionKind::PushJumpi,
        FusionKind::PushMload,
        FusionKind::PushMstore,
        FusionKind::DupIszero,
        FusionKind::IszeroJumpi,
        FusionKind::DupPushEq,
        FusionKind::PushPushAdd,
        FusionKind::IszeroPushJumpi,
        FusionKind::FunctionDispatch,
    ];

    /// Primitive opcodes covered, in execution order
    pub fn pattern(self) -> &'static [PatternStep] {
        match self {
            FusionKind::PushAdd => &[AnyPush, Op(Opcode::ADD)],
            FusionKind::PushSub => &[AnyPush, Op(Opcode::SUB)],
            FusionKind::PushMul => &[AnyPush, Op(Opcode::MUL)],
            FusionKind::PushDiv => &[AnyPush, Op(Opcode::DIV)],
            FusionKind::PushAnd => &[AnyPush, Op(Opcode::AND)],
            FusionKind::PushOr => &[AnyPush, Op(Opcode::OR)],
            FusionKind::PushXor => &[AnyPush, Op(Opcode::XOR)],
            FusionKind::PushEq => &[AnyPush, Op(Opcode::EQ)],
            FusionKind::PushLt => &[AnyPush, Op(Opcode::LT)],
            FusionKind::PushGt => &[AnyPush, Op(Opcode::GT)],
            FusionKind::PushJump => &[AnyPush, Op(Opcode::JUMP)],
            FusionKind::PushJumpi => &[AnyPush, Op(Opcode::JUMPI)],
            FusionKind::PushMload => &[AnyPush, Op(Opcode::MLOAD)],
            FusionKind::PushMstore => &[AnyPush, Op(Opcode::MSTORE)],
            FusionKind::DupIszero => &[AnyDup, Op(Opcode::ISZERO)],
            FusionKind::IszeroJumpi => &[Op(Opcode::ISZERO), Op(Opcode::JUMPI)],
            FusionKind::DupPushEq => &[AnyDup, AnyPush, Op(Opcode::EQ)],
            FusionKind::PushPushAdd => &[AnyPush, AnyPush, Op(Opcode::ADD)],
            FusionKind::IszeroPushJumpi => &[Op(Opcode::ISZERO), AnyPush, Op(Opcode::JUMPI)],
            FusionKind::FunctionDispatch => {
                &[PatternStep::Push(4), Op(Opcode::EQ), AnyPush, Op(Opcode::JUMPI)]
            }
        }
    }

    /// Number of primitive steps the reference interpreter takes
    pub fn step_count(self) -> usize {
        self.pattern().len()
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            FusionKind::PushAdd => "PUSH_ADD",
            FusionKind::PushSub => "PUSH_SUB",
            FusionKind::PushMul => "PUSH_MUL",
            FusionKind::PushDiv => "PUSH_DIV",
            FusionKind::PushAnd => "PUSH_AND",
            FusionKind::PushOr => "PUSH_OR",
            FusionKind::PushXor => "PUSH_XOR",
            FusionKind::PushEq => "PUSH_EQ",
            FusionKind::PushLt => "PUSH_LT",
            FusionKind::PushGt => "PUSH_GT",
            FusionKind::PushJump => "PUSH_JUMP",
            FusionKind::PushJumpi => "PUSH_JUMPI",
            FusionKind::PushMload => "PUSH_MLOAD",
            FusionKind::PushMstore => "PUSH_MSTORE",
            FusionKind::DupIszero => "DUP_ISZERO",
            FusionKind::IszeroJumpi => "ISZERO_JUMPI",
            FusionKind::DupPushEq => "DUP_PUSH_EQ",
            FusionKind::PushPushAdd => "PUSH_PUSH_ADD",
            FusionKind::IszeroPushJumpi => "ISZERO_PUSH_JUMPI",
            FusionKind::FunctionDispatch => "FUNCTION_DISPATCH",
        }
    }

    /// Whether the primitives starting at `pc` in `code` form this pattern
    pub fn matches_at(self, code: &[u8], pc: usize) -> bool {
        let mut cursor = pc;
        for step in self.pattern() {
            let Some(&byte) = code.get(cursor) else {
                return false;
            };
            if !step.matches(byte) {
                return false;
            }
            cursor += 1 + lockstep_evm::opcode::push_size(byte);
        }
        true
    }

    fn ordinal(self) -> u16 {
        // ALL is in declaration order
        self as u16
    }
}

/// An instruction as dispatched by the optimized engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnifiedOpcode {
    /// One EVM opcode byte
    Primitive(u8),
    /// A fused instruction covering several primitives
    Synthetic(FusionKind),
}

impl UnifiedOpcode {
    /// Numeric identity: the byte for primitives, above 0xFF for synthetics
    pub fn id(self) -> u16 {
        match self {
            UnifiedOpcode::Primitive(byte) => byte as u16,
            UnifiedOpcode::Synthetic(kind) => SYNTHETIC_BASE + kind.ordinal(),
        }
    }

    /// Inverse of [`id`](Self::id)
    pub fn from_id(id: u16) -> Option<Self> {
        match u8::try_from(id) {
            Ok(byte) => Some(UnifiedOpcode::Primitive(byte)),
            Err(_) => FusionKind::ALL
                .get(usize::from(id - SYNTHETIC_BASE))
                .map(|kind| UnifiedOpcode::Synthetic(*kind)),
        }
    }

    /// Primitive steps the reference takes for this instruction
    pub fn step_count(self) -> usize {
        match self {
            UnifiedOpcode::Primitive(_) => 1,
            UnifiedOpcode::Synthetic(kind) => kind.step_count(),
        }
    }

    /// Fused instruction
    pub fn is_synthetic(self) -> bool {
        matches!(self, UnifiedOpcode::Synthetic(_))
    }

    /// What the engine claims the `index`-th primitive step is
    pub fn claimed_step(self, index: usize) -> Option<PatternStep> {
        match self {
            UnifiedOpcode::Primitive(byte) if index == 0 => Some(PatternStep::Byte(byte)),
            UnifiedOpcode::Primitive(_) => None,
            UnifiedOpcode::Synthetic(kind) => kind.pattern().get(index).copied(),
        }
    }

    /// The last primitive covered, if it is a fixed opcode
    pub fn last_primitive(self) -> Option<Opcode> {
        match self {
            UnifiedOpcode::Primitive(byte) => Opcode::from_byte(byte),
            UnifiedOpcode::Synthetic(kind) => kind.pattern().last().and_then(|s| s.exact()),
        }
    }

    /// Ends a basic block or the frame: JUMP, JUMPI, STOP, RETURN, REVERT,
    /// SELFDESTRUCT, or a fusion ending in one of them
    pub fn is_terminal(self) -> bool {
        matches!(
            self.last_primitive(),
            Some(
                Opcode::JUMP
                    | Opcode::JUMPI
                    | Opcode::STOP
                    | Opcode::RETURN
                    | Opcode::REVERT
                    | Opcode::SELFDESTRUCT
            )
        )
    }

    /// CALL, CALLCODE, DELEGATECALL or STATICCALL
    pub fn is_call_like(self) -> bool {
        matches!(
            self,
            UnifiedOpcode::Primitive(byte) if Opcode::from_byte(byte).is_some_and(|op| op.is_call())
        )
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            UnifiedOpcode::Primitive(byte) => opcode_name(byte),
            UnifiedOpcode::Synthetic(kind) => kind.name(),
        }
    }
}

impl From<Opcode> for UnifiedOpcode {
    fn from(op: Opcode) -> Self {
        UnifiedOpcode::Primitive(op.byte())
    }
}

impl From<FusionKind> for UnifiedOpcode {
    fn from(kind: FusionKind) -> Self {
        UnifiedOpcode::Synthetic(kind)
    }
}

impl fmt::Display for UnifiedOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
