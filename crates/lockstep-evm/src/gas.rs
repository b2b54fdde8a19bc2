//! Gas cost calculations
//!
//! Static costs are charged before an opcode touches any state. Everything
//! that depends on operands (memory growth, copy length, access lists,
//! SSTORE transitions) is computed by the helpers below and charged by the
//! interpreter afterwards.

use crate::hardfork::Hardfork;
use crate::opcode::Opcode;
use lockstep_primitives::U256;

/// Gas costs for EVM operations
pub mod cost {
    /// Zero gas
    pub const ZERO: u64 = 0;
    /// Base gas
    pub const BASE: u64 = 2;
    /// Very low gas
    pub const VERYLOW: u64 = 3;
    /// Low gas
    pub const LOW: u64 = 5;
    /// Mid gas
    pub const MID: u64 = 8;
    /// High gas
    pub const HIGH: u64 = 10;

    /// Jump dest gas
    pub const JUMPDEST: u64 = 1;
    /// Exp gas
    pub const EXP: u64 = 10;
    /// Exp byte gas before Spurious Dragon
    pub const EXP_BYTE_FRONTIER: u64 = 10;
    /// Exp byte gas (EIP-160)
    pub const EXP_BYTE: u64 = 50;
    /// SHA3 base gas
    pub const SHA3: u64 = 30;
    /// SHA3 word gas
    pub const SHA3_WORD: u64 = 6;
    /// BLOCKHASH gas
    pub const BLOCKHASH: u64 = 20;

    /// Cold account access (EIP-2929)
    pub const COLD_ACCOUNT_ACCESS: u64 = 2600;
    /// Cold storage slot access (EIP-2929)
    pub const COLD_SLOAD: u64 = 2100;
    /// Warm account or slot access (EIP-2929)
    pub const WARM_STORAGE_READ: u64 = 100;

    /// Sstore set gas
    pub const SSTORE_SET: u64 = 20000;
    /// Sstore reset gas before Berlin
    pub const SSTORE_RESET: u64 = 5000;
    /// Sstore clear refund before London
    pub const SSTORE_CLEAR_REFUND: u64 = 15000;
    /// Sstore clear refund (EIP-3529)
    pub const SSTORE_CLEAR_REFUND_LONDON: u64 = 4800;
    /// SSTORE fails when no more than this much gas is left (EIP-2200)
    pub const SSTORE_SENTRY: u64 = 2300;

    /// Transient storage access (EIP-1153)
    pub const TRANSIENT: u64 = 100;

    /// Log gas
    pub const LOG: u64 = 375;
    /// Log topic gas
    pub const LOG_TOPIC: u64 = 375;
    /// Log data gas (per byte)
    pub const LOG_DATA: u64 = 8;

    /// Create gas
    pub const CREATE: u64 = 32000;
    /// Init code word gas (EIP-3860)
    pub const INIT_CODE_WORD: u64 = 2;
    /// Code deposit gas per byte
    pub const CODE_DEPOSIT: u64 = 200;
    /// Call value transfer gas
    pub const CALL_VALUE: u64 = 9000;
    /// Call new account gas
    pub const CALL_NEW_ACCOUNT: u64 = 25000;
    /// Call stipend
    pub const CALL_STIPEND: u64 = 2300;

    /// Memory gas per word
    pub const MEMORY: u64 = 3;
    /// Copy gas per word
    pub const COPY: u64 = 3;

    /// Transaction gas
    pub const TX: u64 = 21000;

    /// Selfdestruct gas (EIP-150)
    pub const SELFDESTRUCT: u64 = 5000;
    /// Selfdestruct refund before London
    pub const SELFDESTRUCT_REFUND: u64 = 24000;

    /// Max call depth
    pub const MAX_CALL_DEPTH: usize = 1024;
    /// Max code size (EIP-170)
    pub const MAX_CODE_SIZE: usize = 24576;
    /// Max init code size (EIP-3860)
    pub const MAX_INIT_CODE_SIZE: usize = 49152;
}

/// Static gas cost for an opcode under the given hardfork.
///
/// Opcodes whose cost is fully covered by the EIP-2929 access charge
/// (BALANCE, EXTCODE*, SLOAD, CALL family) report 0 from Berlin on.
pub fn static_gas(opcode: Opcode, fork: Hardfork) -> u64 {
    let berlin = fork.has_access_lists();
    let tangerine = fork >= Hardfork::TangerineWhistle;
    let istanbul = fork >= Hardfork::Istanbul;

    match opcode {
        Opcode::STOP | Opcode::RETURN | Opcode::REVERT | Opcode::INVALID => cost::ZERO,

        Opcode::ADDRESS
        | Opcode::ORIGIN
        | Opcode::CALLER
        | Opcode::CALLVALUE
        | Opcode::CALLDATASIZE
        | Opcode::CODESIZE
        | Opcode::GASPRICE
        | Opcode::COINBASE
        | Opcode::TIMESTAMP
        | Opcode::NUMBER
        | Opcode::PREVRANDAO
        | Opcode::GASLIMIT
        | Opcode::CHAINID
        | Opcode::RETURNDATASIZE
        | Opcode::POP
        | Opcode::PC
        | Opcode::MSIZE
        | Opcode::GAS
        | Opcode::BASEFEE
        | Opcode::BLOBBASEFEE
        | Opcode::PUSH0 => cost::BASE,

        Opcode::ADD
        | Opcode::SUB
        | Opcode::NOT
        | Opcode::LT
        | Opcode::GT
        | Opcode::SLT
        | Opcode::SGT
        | Opcode::EQ
        | Opcode::ISZERO
        | Opcode::AND
        | Opcode::OR
        | Opcode::XOR
        | Opcode::BYTE
        | Opcode::SHL
        | Opcode::SHR
        | Opcode::SAR
        | Opcode::CALLDATALOAD
        | Opcode::MLOAD
        | Opcode::MSTORE
        | Opcode::MSTORE8
        | Opcode::CALLDATACOPY
        | Opcode::CODECOPY
        | Opcode::RETURNDATACOPY
        | Opcode::MCOPY
        | Opcode::BLOBHASH => cost::VERYLOW,

        op if op.is_push() || op.dup_depth() > 0 || op.swap_depth() > 0 => cost::VERYLOW,

        Opcode::MUL
        | Opcode::DIV
        | Opcode::SDIV
        | Opcode::MOD
        | Opcode::SMOD
        | Opcode::SIGNEXTEND
        | Opcode::SELFBALANCE => cost::LOW,

        Opcode::ADDMOD | Opcode::MULMOD | Opcode::JUMP => cost::MID,

        Opcode::JUMPI => cost::HIGH,
        Opcode::JUMPDEST => cost::JUMPDEST,
        Opcode::EXP => cost::EXP,
        Opcode::KECCAK256 => cost::SHA3,
        Opcode::BLOCKHASH => cost::BLOCKHASH,

        Opcode::BALANCE => match () {
            _ if berlin => 0,
            _ if istanbul => 700,
            _ if tangerine => 400,
            _ => 20,
        },
        Opcode::EXTCODESIZE | Opcode::EXTCODECOPY => match () {
            _ if berlin => 0,
            _ if tangerine => 700,
            _ => 20,
        },
        Opcode::EXTCODEHASH => match () {
            _ if berlin => 0,
            _ if istanbul => 700,
            _ => 400,
        },
        Opcode::SLOAD => match () {
            _ if berlin => 0,
            _ if istanbul => 800,
            _ if tangerine => 200,
            _ => 50,
        },
        Opcode::SSTORE => 0,
        Opcode::TLOAD | Opcode::TSTORE => cost::TRANSIENT,

        Opcode::LOG0 | Opcode::LOG1 | Opcode::LOG2 | Opcode::LOG3 | Opcode::LOG4 => {
            let topics = opcode.log_topics().unwrap_or(0) as u64;
            cost::LOG + cost::LOG_TOPIC * topics
        }

        Opcode::CREATE | Opcode::CREATE2 => cost::CREATE,
        Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL => match () {
            _ if berlin => 0,
            _ if tangerine => 700,
            _ => 40,
        },
        Opcode::SELFDESTRUCT => {
            if tangerine {
                cost::SELFDESTRUCT
            } else {
                0
            }
        }

        // PUSH/DUP/SWAP are handled by the guard arm above
        _ => cost::VERYLOW,
    }
}

/// Memory cost for a number of words: `words*3 + words²/512`
pub fn memory_word_cost(words: u64) -> u64 {
    cost::MEMORY
        .saturating_mul(words)
        .saturating_add(words.saturating_mul(words) / 512)
}

/// Expansion cost for growing memory from `current_size` to `new_size` bytes
pub fn memory_gas(current_size: usize, new_size: usize) -> u64 {
    if new_size <= current_size {
        return 0;
    }
    let new_words = new_size.div_ceil(32) as u64;
    let old_words = current_size.div_ceil(32) as u64;
    memory_word_cost(new_words).saturating_sub(memory_word_cost(old_words))
}

/// Calculate copy cost (for CALLDATACOPY, CODECOPY, etc.)
pub fn copy_gas(length: usize) -> u64 {
    cost::COPY * length.div_ceil(32) as u64
}

/// Dynamic part of EXP: per significant byte of the exponent
pub fn exp_gas(exponent: &U256, fork: Hardfork) -> u64 {
    let byte_cost = if fork >= Hardfork::SpuriousDragon {
        cost::EXP_BYTE
    } else {
        cost::EXP_BYTE_FRONTIER
    };
    let bytes = exponent.bits().div_ceil(8) as u64;
    byte_cost * bytes
}

/// Dynamic part of KECCAK256: per hashed word
pub fn sha3_gas(length: usize) -> u64 {
    cost::SHA3_WORD * length.div_ceil(32) as u64
}

/// Dynamic part of LOG*: per data byte (base and topics are static)
pub fn log_data_gas(data_size: usize) -> u64 {
    cost::LOG_DATA.saturating_mul(data_size as u64)
}

/// Init code word cost charged by CREATE/CREATE2 from Shanghai (EIP-3860)
pub fn init_code_gas(length: usize, fork: Hardfork) -> u64 {
    if fork >= Hardfork::Shanghai {
        cost::INIT_CODE_WORD * length.div_ceil(32) as u64
    } else {
        0
    }
}

/// Gas and refund delta for one SSTORE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SstoreCost {
    /// Gas charged
    pub gas: u64,
    /// Change to the refund counter (may be negative)
    pub refund: i64,
}

struct NetMetering {
    noop: u64,
    reset: u64,
    clear_refund: u64,
}

fn net_metering(fork: Hardfork) -> Option<NetMetering> {
    match fork {
        f if f >= Hardfork::London => Some(NetMetering {
            noop: cost::WARM_STORAGE_READ,
            reset: cost::SSTORE_RESET - cost::COLD_SLOAD,
            clear_refund: cost::SSTORE_CLEAR_REFUND_LONDON,
        }),
        f if f >= Hardfork::Berlin => Some(NetMetering {
            noop: cost::WARM_STORAGE_READ,
            reset: cost::SSTORE_RESET - cost::COLD_SLOAD,
            clear_refund: cost::SSTORE_CLEAR_REFUND,
        }),
        f if f >= Hardfork::Istanbul => Some(NetMetering {
            noop: 800,
            reset: cost::SSTORE_RESET,
            clear_refund: cost::SSTORE_CLEAR_REFUND,
        }),
        // EIP-1283, removed again in Petersburg
        Hardfork::Constantinople => Some(NetMetering {
            noop: 200,
            reset: cost::SSTORE_RESET,
            clear_refund: cost::SSTORE_CLEAR_REFUND,
        }),
        _ => None,
    }
}

/// SSTORE cost following the EIP-2200 transition table.
///
/// `original` is the slot value at transaction start, `current` the value
/// before this write and `new` the value being written. `cold` adds the
/// EIP-2929 surcharge from Berlin on.
pub fn sstore_cost(fork: Hardfork, original: U256, current: U256, new: U256, cold: bool) -> SstoreCost {
    let surcharge = if cold && fork.has_access_lists() { cost::COLD_SLOAD } else { 0 };

    let Some(params) = net_metering(fork) else {
        return if current.is_zero() && !new.is_zero() {
            SstoreCost { gas: cost::SSTORE_SET, refund: 0 }
        } else if !current.is_zero() && new.is_zero() {
            SstoreCost { gas: cost::SSTORE_RESET, refund: cost::SSTORE_CLEAR_REFUND as i64 }
        } else {
            SstoreCost { gas: cost::SSTORE_RESET, refund: 0 }
        };
    };

    let clear = params.clear_refund as i64;
    let mut refund = 0i64;

    let gas = if new == current {
        params.noop
    } else if original == current {
        if original.is_zero() {
            cost::SSTORE_SET
        } else {
            if new.is_zero() {
                refund += clear;
            }
            params.reset
        }
    } else {
        if !original.is_zero() {
            if current.is_zero() {
                refund -= clear;
            } else if new.is_zero() {
                refund += clear;
            }
        }
        if original == new {
            if original.is_zero() {
                refund += (cost::SSTORE_SET - params.noop) as i64;
            } else {
                refund += (params.reset - params.noop) as i64;
            }
        }
        params.noop
    };

    SstoreCost { gas: gas + surcharge, refund }
}

/// Gas handed to a callee.
///
/// From Tangerine Whistle the request is capped at all but one 64th of
/// what is left (EIP-150); before that a request above the available gas
/// is an out-of-gas condition, reported as `None`.
pub fn call_gas(fork: Hardfork, available: u64, requested: U256) -> Option<u64> {
    let requested_u64 = if requested > U256::from(u64::MAX) {
        u64::MAX
    } else {
        requested.low_u64()
    };
    if fork.has_call_gas_cap() {
        let cap = available - available / 64;
        Some(requested_u64.min(cap))
    } else if requested_u64 > available {
        None
    } else {
        Some(requested_u64)
    }
}

/// All but one 64th of `available` (the CREATE forwarding rule)
pub fn all_but_one_64th(fork: Hardfork, available: u64) -> u64 {
    if fork.has_call_gas_cap() {
        available - available / 64
    } else {
        available
    }
}
