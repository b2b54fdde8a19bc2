//! External state interfaces
//!
//! Without a host the orchestrator keeps balances, code and storage in its
//! own maps. With one attached every query and write goes to the host, and
//! CALL-family opcodes hand the whole nested call to [`Host::inner_call`].

use bytes::Bytes;
use lockstep_primitives::{Address, U256};

use crate::error::EvmResult;

/// Read-only view of account state
pub trait StateView {
    /// Balance of `address`
    fn get_balance(&self, address: &Address) -> U256;

    /// Deployed code of `address`
    fn get_code(&self, address: &Address) -> Bytes;

    /// Current value of a storage slot
    fn get_storage(&self, address: &Address, slot: &U256) -> U256;
}

/// Full state provider for the reference interpreter
pub trait Host: StateView {
    /// Value the slot held when the transaction started, if the host
    /// already recorded it
    fn get_cached_storage_read(&self, address: &Address, slot: &U256) -> Option<U256>;

    /// Write a storage slot
    fn set_storage(&mut self, address: &Address, slot: U256, value: U256) -> EvmResult<()>;

    /// Perform a complete nested call
    fn inner_call(&mut self, params: &CallParams) -> CallResult;
}

/// Kind of nested call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// CALL
    Call,
    /// CALLCODE
    CallCode,
    /// DELEGATECALL
    DelegateCall,
    /// STATICCALL
    StaticCall,
    /// CREATE
    Create,
    /// CREATE2 with its salt
    Create2 {
        /// Salt
        salt: U256,
    },
}

impl CallKind {
    /// CREATE or CREATE2
    pub fn is_create(&self) -> bool {
        matches!(self, CallKind::Create | CallKind::Create2 { .. })
    }

    /// Moves `value` from caller to callee
    pub fn transfers_value(&self) -> bool {
        matches!(self, CallKind::Call | CallKind::Create | CallKind::Create2 { .. })
    }
}

/// Parameters of a nested call
#[derive(Debug, Clone)]
pub struct CallParams {
    /// Call kind
    pub kind: CallKind,
    /// `CALLER` inside the callee
    pub caller: Address,
    /// Account whose storage and balance the callee runs against
    /// (ignored for creates, where it is derived)
    pub address: Address,
    /// Account whose code runs
    pub code_address: Address,
    /// `CALLVALUE` inside the callee
    pub value: U256,
    /// Calldata, or init code for creates
    pub input: Bytes,
    /// Gas handed to the callee, stipend included
    pub gas: u64,
    /// Static context
    pub is_static: bool,
    /// Depth of the callee frame
    pub depth: usize,
}

/// Outcome of a call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallResult {
    /// Whether the call succeeded
    pub success: bool,
    /// Gas left over
    pub gas_left: u64,
    /// Return or revert data
    pub output: Bytes,
    /// Address of a successfully created contract
    pub created: Option<Address>,
}

impl CallResult {
    /// Successful call
    pub fn success(gas_left: u64, output: Bytes) -> Self {
        Self { success: true, gas_left, output, created: None }
    }

    /// Failed call that keeps `gas_left` (reverts, rejected transfers)
    pub fn failure(gas_left: u64, output: Bytes) -> Self {
        Self { success: false, gas_left, output, created: None }
    }

    /// Failed call that consumed all of its gas
    pub fn exceptional() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_kind_flags() {
        assert!(CallKind::Create.is_create());
        assert!(CallKind::Create2 { salt: U256::one() }.is_create());
        assert!(!CallKind::Call.is_create());
        assert!(CallKind::Call.transfers_value());
        assert!(!CallKind::DelegateCall.transfers_value());
        assert!(!CallKind::CallCode.transfers_value());
    }

    #[test]
    fn test_call_result_constructors() {
        let ok = CallResult::success(10, Bytes::from_static(&[1]));
        assert!(ok.success);
        assert_eq!(ok.gas_left, 10);

        let failed = CallResult::exceptional();
        assert!(!failed.success);
        assert_eq!(failed.gas_left, 0);
        assert!(failed.output.is_empty());
    }
}
