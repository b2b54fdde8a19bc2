//! # lockstep-evm
//!
//! A deliberately simple, gas-exact EVM used as the reference side of
//! lock-step validation.
//!
//! This crate provides:
//! - [`Interpreter`]: executes exactly one primitive opcode per step
//! - [`CallOrchestrator`]: transaction-scoped state, access lists, refunds
//!   and the nested call frame stack
//! - [`Host`]: optional external state provider
//!
//! ```ignore
//! let mut evm = CallOrchestrator::new(OrchestratorConfig::default());
//! let result = evm.execute(code, 100_000, caller, target, U256::zero(), Bytes::new());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod frame;
pub mod gas;
pub mod hardfork;
pub mod host;
pub mod interpreter;
pub mod memory;
pub mod opcode;
pub mod orchestrator;
pub mod stack;

pub use context::{BlockContext, Environment, TxContext};
pub use error::{EvmError, EvmResult, Log};
pub use frame::ReferenceFrame;
pub use hardfork::{Hardfork, UnknownHardfork};
pub use host::{CallKind, CallParams, CallResult, Host, StateView};
pub use interpreter::Interpreter;
pub use memory::{Memory, MAX_MEMORY_SIZE};
pub use opcode::{opcode_name, Opcode};
pub use orchestrator::{create2_address, create_address, CallOrchestrator, OrchestratorConfig};
pub use stack::{Stack, MAX_STACK_SIZE};

pub use bytes::Bytes;
pub use lockstep_primitives::{Address, H256, U256};
