//! EVM error types

use bytes::Bytes;
use lockstep_primitives::{Address, H256};
use thiserror::Error;

/// Errors raised while executing a single frame.
///
/// Every variant is recoverable: the orchestrator turns a failed frame into
/// an unsuccessful [`CallResult`](crate::CallResult) with no gas left.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// Stack underflow
    #[error("stack underflow")]
    StackUnderflow,

    /// Stack overflow
    #[error("stack overflow (max 1024)")]
    StackOverflow,

    /// Out of gas
    #[error("out of gas")]
    OutOfGas,

    /// Invalid jump destination
    #[error("invalid jump destination: {0}")]
    InvalidJump(usize),

    /// Invalid or not yet activated opcode
    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Memory access beyond the 16 MiB ceiling
    #[error("memory access out of range: {0}")]
    MemoryOverflow(usize),

    /// PUSH immediate runs past the end of the bytecode
    #[error("truncated push at pc {0}")]
    InvalidPush(usize),

    /// Write in static context
    #[error("state modification in static context")]
    StaticCallViolation,

    /// Return data out of bounds
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,

    /// Call depth exceeded
    #[error("call depth exceeded (max 1024)")]
    CallDepthExceeded,

    /// Insufficient balance for transfer
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Contract creation collision
    #[error("contract address collision")]
    CreateCollision,

    /// Creator nonce cannot be incremented
    #[error("nonce overflow")]
    NonceOverflow,

    /// Max code size exceeded (EIP-170)
    #[error("max code size exceeded (limit: 24576 bytes)")]
    MaxCodeSizeExceeded,

    /// Deployed code starts with 0xEF (EIP-3541)
    #[error("deployed code starts with 0xef")]
    InvalidCodePrefix,

    /// Orchestrator was stepped with no active frame
    #[error("no active frame")]
    NoActiveFrame,

    /// Error reported by an attached host
    #[error("host error: {0}")]
    Host(String),
}

/// Result type for EVM operations
pub type EvmResult<T> = Result<T, EvmError>;

/// Log entry emitted by LOG opcodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    /// Contract address that emitted the log
    pub address: Address,
    /// Log topics (0-4)
    pub topics: Vec<H256>,
    /// Log data
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", EvmError::OutOfGas), "out of gas");
        assert_eq!(format!("{}", EvmError::StackUnderflow), "stack underflow");
        assert_eq!(format!("{}", EvmError::StackOverflow), "stack overflow (max 1024)");
        assert_eq!(format!("{}", EvmError::InvalidJump(100)), "invalid jump destination: 100");
        assert_eq!(format!("{}", EvmError::InvalidOpcode(0xFE)), "invalid opcode: 0xfe");
        assert_eq!(format!("{}", EvmError::MemoryOverflow(17)), "memory access out of range: 17");
        assert_eq!(format!("{}", EvmError::InvalidPush(4)), "truncated push at pc 4");
        assert_eq!(format!("{}", EvmError::StaticCallViolation), "state modification in static context");
        assert_eq!(format!("{}", EvmError::Host("db".into())), "host error: db");
        assert_eq!(format!("{}", EvmError::CallDepthExceeded), "call depth exceeded (max 1024)");
        assert_eq!(format!("{}", EvmError::CreateCollision), "contract address collision");
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(EvmError::OutOfGas, EvmError::OutOfGas);
        assert_ne!(EvmError::OutOfGas, EvmError::StackUnderflow);
        assert_eq!(EvmError::InvalidJump(10), EvmError::InvalidJump(10));
        assert_ne!(EvmError::InvalidJump(10), EvmError::InvalidJump(20));
    }

    #[test]
    fn test_log_default() {
        let log = Log::default();
        assert_eq!(log.address, Address::ZERO);
        assert!(log.topics.is_empty());
        assert!(log.data.is_empty());
    }
}
