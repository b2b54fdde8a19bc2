//! Block and transaction environment

use lockstep_primitives::{Address, H256, U256};
use std::collections::HashMap;

/// Block environment information
#[derive(Clone, Debug)]
pub struct BlockContext {
    /// Block number
    pub number: u64,
    /// Block timestamp
    pub timestamp: u64,
    /// Block gas limit
    pub gas_limit: u64,
    /// Block coinbase (fee recipient)
    pub coinbase: Address,
    /// Block prevrandao
    pub prevrandao: H256,
    /// Chain ID
    pub chain_id: u64,
    /// Base fee (EIP-1559)
    pub base_fee: U256,
    /// Blob base fee (EIP-7516)
    pub blob_base_fee: U256,
    /// Known ancestor hashes for BLOCKHASH
    pub block_hashes: HashMap<u64, H256>,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            gas_limit: 30_000_000,
            coinbase: Address::ZERO,
            prevrandao: H256::ZERO,
            chain_id: 1,
            base_fee: U256::zero(),
            blob_base_fee: U256::zero(),
            block_hashes: HashMap::new(),
        }
    }
}

impl BlockContext {
    /// Hash of block `number`, zero outside the 256-block window
    pub fn block_hash(&self, number: U256) -> H256 {
        if number >= U256::from(self.number) {
            return H256::ZERO;
        }
        let number = number.low_u64();
        if self.number - number > 256 {
            return H256::ZERO;
        }
        self.block_hashes.get(&number).copied().unwrap_or(H256::ZERO)
    }
}

/// Transaction environment information
#[derive(Clone, Debug, Default)]
pub struct TxContext {
    /// Transaction origin (original sender)
    pub origin: Address,
    /// Gas price
    pub gas_price: U256,
    /// Versioned blob hashes (EIP-4844)
    pub blob_hashes: Vec<H256>,
}

/// Complete execution environment
#[derive(Clone, Debug, Default)]
pub struct Environment {
    /// Block context
    pub block: BlockContext,
    /// Transaction context
    pub tx: TxContext,
}

impl Environment {
    /// Create new environment
    pub fn new(block: BlockContext, tx: TxContext) -> Self {
        Self { block, tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_context_default() {
        let ctx = BlockContext::default();
        assert_eq!(ctx.gas_limit, 30_000_000);
        assert_eq!(ctx.chain_id, 1);
        assert_eq!(ctx.coinbase, Address::ZERO);
    }

    #[test]
    fn test_block_hash_window() {
        let mut ctx = BlockContext { number: 1000, ..Default::default() };
        let hash = H256::from_bytes([7; 32]);
        ctx.block_hashes.insert(999, hash);
        ctx.block_hashes.insert(700, hash);

        assert_eq!(ctx.block_hash(U256::from(999)), hash);
        assert_eq!(ctx.block_hash(U256::from(1000)), H256::ZERO);
        assert_eq!(ctx.block_hash(U256::from(700)), H256::ZERO);
        assert_eq!(ctx.block_hash(U256::from(998)), H256::ZERO);
    }
}
