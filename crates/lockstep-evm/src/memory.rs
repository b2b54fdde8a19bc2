//! Sparse EVM memory
//!
//! Only written bytes are stored. `size` tracks the highest touched offset
//! plus one; MSIZE and expansion gas work on that size rounded up to a word.

use crate::error::{EvmError, EvmResult};
use lockstep_primitives::{word_from_bytes, word_to_bytes, U256};
use std::collections::HashMap;

/// Hard ceiling on addressable memory (16 MiB)
pub const MAX_MEMORY_SIZE: usize = 16 * 1024 * 1024;

/// Byte-addressable memory that never pre-allocates
#[derive(Clone, Debug, Default)]
pub struct Memory {
    bytes: HashMap<u32, u8>,
    size: u32,
}

impl Memory {
    /// Create new empty memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest touched offset + 1
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Size as reported by MSIZE (rounded up to 32 bytes)
    pub fn msize(&self) -> usize {
        self.size().div_ceil(32) * 32
    }

    fn check_range(offset: usize, len: usize) -> EvmResult<usize> {
        let end = offset.saturating_add(len);
        if end > MAX_MEMORY_SIZE {
            return Err(EvmError::MemoryOverflow(end));
        }
        Ok(end)
    }

    /// Extend `size` to cover `offset..offset + len` without writing
    pub fn touch(&mut self, offset: usize, len: usize) -> EvmResult<()> {
        if len == 0 {
            return Ok(());
        }
        let end = Self::check_range(offset, len)?;
        if end > self.size() {
            // end <= 16 MiB, so it fits in u32
            self.size = end as u32;
        }
        Ok(())
    }

    fn read(&self, offset: usize) -> u8 {
        self.bytes.get(&(offset as u32)).copied().unwrap_or(0)
    }

    fn write(&mut self, offset: usize, value: u8) {
        if value == 0 {
            self.bytes.remove(&(offset as u32));
        } else {
            self.bytes.insert(offset as u32, value);
        }
    }

    /// Read one byte; untouched offsets read as zero
    pub fn byte(&self, offset: usize) -> u8 {
        if offset >= MAX_MEMORY_SIZE {
            return 0;
        }
        self.read(offset)
    }

    /// Load a 32-byte word
    pub fn load_word(&mut self, offset: usize) -> EvmResult<U256> {
        let bytes = self.load_slice(offset, 32)?;
        Ok(word_from_bytes(&bytes))
    }

    /// Store a 32-byte word
    pub fn store_word(&mut self, offset: usize, value: &U256) -> EvmResult<()> {
        self.store_slice(offset, &word_to_bytes(value))
    }

    /// Store a single byte
    pub fn store_byte(&mut self, offset: usize, value: u8) -> EvmResult<()> {
        self.touch(offset, 1)?;
        self.write(offset, value);
        Ok(())
    }

    /// Load `len` bytes, extending `size` like a real read does
    pub fn load_slice(&mut self, offset: usize, len: usize) -> EvmResult<Vec<u8>> {
        self.touch(offset, len)?;
        Ok((offset..offset + len).map(|i| self.read(i)).collect())
    }

    /// Read `len` bytes without touching `size`
    pub fn peek_slice(&self, offset: usize, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.byte(offset.saturating_add(i))).collect()
    }

    /// Store a byte slice
    pub fn store_slice(&mut self, offset: usize, data: &[u8]) -> EvmResult<()> {
        self.touch(offset, data.len())?;
        for (i, b) in data.iter().enumerate() {
            self.write(offset + i, *b);
        }
        Ok(())
    }

    /// Copy `data` into `offset..offset + len`, zero-filling past its end
    pub fn store_padded(&mut self, offset: usize, len: usize, data: &[u8]) -> EvmResult<()> {
        self.touch(offset, len)?;
        for i in 0..len {
            self.write(offset + i, data.get(i).copied().unwrap_or(0));
        }
        Ok(())
    }

    /// Overlap-safe copy within memory (MCOPY)
    pub fn copy_within(&mut self, dest: usize, src: usize, len: usize) -> EvmResult<()> {
        if len == 0 {
            return Ok(());
        }
        let data = self.load_slice(src, len)?;
        self.store_slice(dest, &data)
    }

    /// Number of bytes physically held
    pub fn resident_bytes(&self) -> usize {
        self.bytes.len()
    }
}
