//! EVM opcode definitions

use crate::hardfork::Hardfork;

macro_rules! opcodes {
    ($($name:ident = $byte:literal),* $(,)?) => {
        /// EVM opcodes (see Yellow Paper Appendix H)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum Opcode {
            $($name = $byte),*
        }

        impl Opcode {
            /// Try to convert from byte
            pub const fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Mnemonic, e.g. `"PUSH1"`
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }
        }
    };
}

opcodes! {
    // Stop and Arithmetic
    STOP = 0x00, ADD = 0x01, MUL = 0x02, SUB = 0x03, DIV = 0x04, SDIV = 0x05,
    MOD = 0x06, SMOD = 0x07, ADDMOD = 0x08, MULMOD = 0x09, EXP = 0x0A,
    SIGNEXTEND = 0x0B,

    // Comparison & Bitwise Logic
    LT = 0x10, GT = 0x11, SLT = 0x12, SGT = 0x13, EQ = 0x14, ISZERO = 0x15,
    AND = 0x16, OR = 0x17, XOR = 0x18, NOT = 0x19, BYTE = 0x1A, SHL = 0x1B,
    SHR = 0x1C, SAR = 0x1D,

    KECCAK256 = 0x20,

    // Environmental Information
    ADDRESS = 0x30, BALANCE = 0x31, ORIGIN = 0x32, CALLER = 0x33,
    CALLVALUE = 0x34, CALLDATALOAD = 0x35, CALLDATASIZE = 0x36,
    CALLDATACOPY = 0x37, CODESIZE = 0x38, CODECOPY = 0x39, GASPRICE = 0x3A,
    EXTCODESIZE = 0x3B, EXTCODECOPY = 0x3C, RETURNDATASIZE = 0x3D,
    RETURNDATACOPY = 0x3E, EXTCODEHASH = 0x3F,

    // Block Information
    BLOCKHASH = 0x40, COINBASE = 0x41, TIMESTAMP = 0x42, NUMBER = 0x43,
    PREVRANDAO = 0x44, GASLIMIT = 0x45, CHAINID = 0x46, SELFBALANCE = 0x47,
    BASEFEE = 0x48, BLOBHASH = 0x49, BLOBBASEFEE = 0x4A,

    // Stack, Memory, Storage and Flow Operations
    POP = 0x50, MLOAD = 0x51, MSTORE = 0x52, MSTORE8 = 0x53, SLOAD = 0x54,
    SSTORE = 0x55, JUMP = 0x56, JUMPI = 0x57, PC = 0x58, MSIZE = 0x59,
    GAS = 0x5A, JUMPDEST = 0x5B, TLOAD = 0x5C, TSTORE = 0x5D, MCOPY = 0x5E,
    PUSH0 = 0x5F,

    PUSH1 = 0x60, PUSH2 = 0x61, PUSH3 = 0x62, PUSH4 = 0x63, PUSH5 = 0x64,
    PUSH6 = 0x65, PUSH7 = 0x66, PUSH8 = 0x67, PUSH9 = 0x68, PUSH10 = 0x69,
    PUSH11 = 0x6A, PUSH12 = 0x6B, PUSH13 = 0x6C, PUSH14 = 0x6D, PUSH15 = 0x6E,
    PUSH16 = 0x6F, PUSH17 = 0x70, PUSH18 = 0x71, PUSH19 = 0x72, PUSH20 = 0x73,
    PUSH21 = 0x74, PUSH22 = 0x75, PUSH23 = 0x76, PUSH24 = 0x77, PUSH25 = 0x78,
    PUSH26 = 0x79, PUSH27 = 0x7A, PUSH28 = 0x7B, PUSH29 = 0x7C, PUSH30 = 0x7D,
    PUSH31 = 0x7E, PUSH32 = 0x7F,

    DUP1 = 0x80, DUP2 = 0x81, DUP3 = 0x82, DUP4 = 0x83, DUP5 = 0x84,
    DUP6 = 0x85, DUP7 = 0x86, DUP8 = 0x87, DUP9 = 0x88, DUP10 = 0x89,
    DUP11 = 0x8A, DUP12 = 0x8B, DUP13 = 0x8C, DUP14 = 0x8D, DUP15 = 0x8E,
    DUP16 = 0x8F,

    SWAP1 = 0x90, SWAP2 = 0x91, SWAP3 = 0x92, SWAP4 = 0x93, SWAP5 = 0x94,
    SWAP6 = 0x95, SWAP7 = 0x96, SWAP8 = 0x97, SWAP9 = 0x98, SWAP10 = 0x99,
    SWAP11 = 0x9A, SWAP12 = 0x9B, SWAP13 = 0x9C, SWAP14 = 0x9D, SWAP15 = 0x9E,
    SWAP16 = 0x9F,

    LOG0 = 0xA0, LOG1 = 0xA1, LOG2 = 0xA2, LOG3 = 0xA3, LOG4 = 0xA4,

    // System Operations
    CREATE = 0xF0, CALL = 0xF1, CALLCODE = 0xF2, RETURN = 0xF3,
    DELEGATECALL = 0xF4, CREATE2 = 0xF5, STATICCALL = 0xFA, REVERT = 0xFD,
    INVALID = 0xFE, SELFDESTRUCT = 0xFF,
}

impl Opcode {
    /// Raw byte value
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Get PUSH operand size (1-32 for PUSH1-PUSH32, 0 otherwise)
    pub fn push_size(self) -> usize {
        push_size(self as u8)
    }

    /// Check if this is a PUSH opcode (PUSH0 included)
    pub fn is_push(self) -> bool {
        let byte = self as u8;
        (0x5F..=0x7F).contains(&byte)
    }

    /// Get DUP depth (1-16 for DUP1-DUP16, 0 otherwise)
    pub fn dup_depth(self) -> usize {
        let byte = self as u8;
        if (0x80..=0x8F).contains(&byte) {
            (byte - 0x7F) as usize
        } else {
            0
        }
    }

    /// Get SWAP depth (1-16 for SWAP1-SWAP16, 0 otherwise)
    pub fn swap_depth(self) -> usize {
        let byte = self as u8;
        if (0x90..=0x9F).contains(&byte) {
            (byte - 0x8F) as usize
        } else {
            0
        }
    }

    /// LOG topic count, `None` for non-LOG opcodes
    pub fn log_topics(self) -> Option<usize> {
        let byte = self as u8;
        if (0xA0..=0xA4).contains(&byte) {
            Some((byte - 0xA0) as usize)
        } else {
            None
        }
    }

    /// Opcodes that end the frame
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Opcode::STOP | Opcode::RETURN | Opcode::REVERT | Opcode::INVALID | Opcode::SELFDESTRUCT
        )
    }

    /// CALL, CALLCODE, DELEGATECALL and STATICCALL
    pub fn is_call(self) -> bool {
        matches!(
            self,
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL
        )
    }

    /// First hardfork in which the opcode is defined
    pub fn introduced_in(self) -> Hardfork {
        match self {
            Opcode::DELEGATECALL => Hardfork::Homestead,
            Opcode::REVERT
            | Opcode::STATICCALL
            | Opcode::RETURNDATASIZE
            | Opcode::RETURNDATACOPY => Hardfork::Byzantium,
            Opcode::SHL | Opcode::SHR | Opcode::SAR | Opcode::CREATE2 | Opcode::EXTCODEHASH => {
                Hardfork::Constantinople
            }
            Opcode::CHAINID | Opcode::SELFBALANCE => Hardfork::Istanbul,
            Opcode::BASEFEE => Hardfork::London,
            Opcode::PUSH0 => Hardfork::Shanghai,
            Opcode::TLOAD
            | Opcode::TSTORE
            | Opcode::MCOPY
            | Opcode::BLOBHASH
            | Opcode::BLOBBASEFEE => Hardfork::Cancun,
            _ => Hardfork::Frontier,
        }
    }
}

/// Immediate size for a raw PUSH byte, 0 for anything else
pub const fn push_size(byte: u8) -> usize {
    if byte >= 0x60 && byte <= 0x7F {
        (byte - 0x5F) as usize
    } else {
        0
    }
}

/// Mnemonic for a raw byte, `"UNKNOWN"` for unassigned bytes
pub fn opcode_name(byte: u8) -> &'static str {
    match Opcode::from_byte(byte) {
        Some(op) => op.name(),
        None => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_size() {
        assert_eq!(Opcode::PUSH1.push_size(), 1);
        assert_eq!(Opcode::PUSH16.push_size(), 16);
        assert_eq!(Opcode::PUSH32.push_size(), 32);
        assert_eq!(Opcode::ADD.push_size(), 0);
        assert_eq!(Opcode::PUSH0.push_size(), 0);
    }

    #[test]
    fn test_from_byte() {
        assert_eq!(Opcode::from_byte(0x00), Some(Opcode::STOP));
        assert_eq!(Opcode::from_byte(0x01), Some(Opcode::ADD));
        assert_eq!(Opcode::from_byte(0x60), Some(Opcode::PUSH1));
        assert_eq!(Opcode::from_byte(0x7F), Some(Opcode::PUSH32));
        assert_eq!(Opcode::from_byte(0xFF), Some(Opcode::SELFDESTRUCT));
        assert_eq!(Opcode::from_byte(0x0C), None);
        assert_eq!(Opcode::from_byte(0xEF), None);
    }

    #[test]
    fn test_from_byte_roundtrip_all_assigned() {
        let mut assigned = 0;
        for byte in 0..=255u8 {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op.byte(), byte);
                assigned += 1;
            }
        }
        assert_eq!(assigned, 149);
    }

    #[test]
    fn test_names() {
        assert_eq!(Opcode::JUMPDEST.name(), "JUMPDEST");
        assert_eq!(opcode_name(0x63), "PUSH4");
        assert_eq!(opcode_name(0x0C), "UNKNOWN");
    }

    #[test]
    fn test_dup_swap_depths() {
        for i in 1..=16u8 {
            assert_eq!(Opcode::from_byte(0x7F + i).unwrap().dup_depth(), i as usize);
            assert_eq!(Opcode::from_byte(0x8F + i).unwrap().swap_depth(), i as usize);
        }
        assert_eq!(Opcode::ADD.dup_depth(), 0);
        assert_eq!(Opcode::ADD.swap_depth(), 0);
    }

    #[test]
    fn test_log_topics() {
        assert_eq!(Opcode::LOG0.log_topics(), Some(0));
        assert_eq!(Opcode::LOG4.log_topics(), Some(4));
        assert_eq!(Opcode::ADD.log_topics(), None);
    }

    #[test]
    fn test_introduced_in() {
        assert_eq!(Opcode::ADD.introduced_in(), Hardfork::Frontier);
        assert_eq!(Opcode::PUSH0.introduced_in(), Hardfork::Shanghai);
        assert_eq!(Opcode::MCOPY.introduced_in(), Hardfork::Cancun);
        assert_eq!(Opcode::SHL.introduced_in(), Hardfork::Constantinople);
    }
}
