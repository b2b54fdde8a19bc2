//! # lockstep-crypto
//!
//! Keccak-256, the only cryptographic primitive the reference interpreter
//! needs (KECCAK256, EXTCODEHASH, CREATE and CREATE2 address derivation).

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;

pub use hash::{keccak256, KECCAK_EMPTY};
