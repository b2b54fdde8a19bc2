//! # lockstep-primitives
//!
//! Primitive types shared by the reference interpreter and the validator.
//!
//! Words on the EVM stack are [`U256`]; addresses are 20-byte [`Address`]
//! values that convert to and from the low 160 bits of a word.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod hash;

pub use address::{Address, AddressError};
pub use hash::{Hash, HashError, H256};

// Re-export primitive-types for stack words and 512-bit intermediates
pub use primitive_types::{U256, U512};

/// Gas type
pub type Gas = u64;

/// Convert a word to its 32-byte big-endian representation
pub fn word_to_bytes(word: &U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    word.to_big_endian(&mut out);
    out
}

/// Interpret up to 32 big-endian bytes as a word
pub fn word_from_bytes(bytes: &[u8]) -> U256 {
    U256::from_big_endian(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_basic() {
        let a = U256::from(100u64);
        let b = U256::from(200u64);
        assert_eq!(a + b, U256::from(300u64));
    }

    #[test]
    fn test_word_bytes_roundtrip() {
        let word = U256::from(0xDEADBEEFu64);
        let bytes = word_to_bytes(&word);
        assert_eq!(&bytes[28..], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(word_from_bytes(&bytes), word);
    }

    #[test]
    fn test_word_from_short_slice() {
        assert_eq!(word_from_bytes(&[0x01, 0x00]), U256::from(256u64));
        assert_eq!(word_from_bytes(&[]), U256::zero());
    }
}
