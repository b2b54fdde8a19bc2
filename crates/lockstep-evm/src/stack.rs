//! EVM stack and 256-bit word arithmetic

use crate::error::{EvmError, EvmResult};
use lockstep_primitives::{U256, U512};

/// Maximum number of words on the stack
pub const MAX_STACK_SIZE: usize = 1024;

/// EVM stack (max 1024 items, 256-bit each)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stack {
    data: Vec<U256>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Self { data: Vec::with_capacity(32) }
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: U256) -> EvmResult<()> {
        if self.data.len() >= MAX_STACK_SIZE {
            return Err(EvmError::StackOverflow);
        }
        self.data.push(value);
        Ok(())
    }

    /// Pop a value from the stack
    pub fn pop(&mut self) -> EvmResult<U256> {
        self.data.pop().ok_or(EvmError::StackUnderflow)
    }

    /// Peek at a specific depth (0 = top)
    pub fn peek(&self, depth: usize) -> EvmResult<U256> {
        if depth >= self.data.len() {
            return Err(EvmError::StackUnderflow);
        }
        Ok(self.data[self.data.len() - 1 - depth])
    }

    /// Fail unless at least `n` items are present
    pub fn require(&self, n: usize) -> EvmResult<()> {
        if self.data.len() < n {
            Err(EvmError::StackUnderflow)
        } else {
            Ok(())
        }
    }

    /// Swap top with item at depth (1 = swap with second item)
    pub fn swap(&mut self, depth: usize) -> EvmResult<()> {
        let len = self.data.len();
        if depth == 0 || depth >= len {
            return Err(EvmError::StackUnderflow);
        }
        self.data.swap(len - 1, len - 1 - depth);
        Ok(())
    }

    /// Duplicate item at depth to top (1 = dup top)
    pub fn dup(&mut self, depth: usize) -> EvmResult<()> {
        if depth == 0 || depth > self.data.len() {
            return Err(EvmError::StackUnderflow);
        }
        if self.data.len() >= MAX_STACK_SIZE {
            return Err(EvmError::StackOverflow);
        }
        let value = self.data[self.data.len() - depth];
        self.data.push(value);
        Ok(())
    }

    /// Get current stack size
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if stack is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Items bottom-first
    pub fn as_slice(&self) -> &[U256] {
        &self.data
    }

    /// Items top-first
    pub fn iter_top_down(&self) -> impl Iterator<Item = &U256> {
        self.data.iter().rev()
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a boolean to 0 or 1
pub fn bool_to_word(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}

/// Clamp a word into u64
pub fn as_u64_saturated(value: &U256) -> u64 {
    if value.0[1..].iter().any(|limb| *limb != 0) {
        u64::MAX
    } else {
        value.0[0]
    }
}

/// Clamp a word into usize
pub fn as_usize_saturated(value: &U256) -> usize {
    usize::try_from(as_u64_saturated(value)).unwrap_or(usize::MAX)
}

fn is_negative(value: &U256) -> bool {
    value.bit(255)
}

fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

fn abs(value: U256) -> U256 {
    if is_negative(&value) {
        negate(value)
    } else {
        value
    }
}

fn low_256(value: U512) -> U256 {
    let limbs = value.0;
    U256([limbs[0], limbs[1], limbs[2], limbs[3]])
}

/// Signed division, `a / b` rounding toward zero
pub fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let quotient = abs(a) / abs(b);
    if is_negative(&a) != is_negative(&b) {
        negate(quotient)
    } else {
        quotient
    }
}

/// Signed modulo, result takes the sign of `a`
pub fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let rem = abs(a) % abs(b);
    if is_negative(&a) {
        negate(rem)
    } else {
        rem
    }
}

/// `(a + b) % n` without intermediate overflow, 0 when `n == 0`
pub fn addmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    let sum = U512::from(a) + U512::from(b);
    low_256(sum % U512::from(n))
}

/// `(a * b) % n` without intermediate overflow, 0 when `n == 0`
pub fn mulmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    low_256(a.full_mul(b) % U512::from(n))
}

/// Wrapping exponentiation
pub fn exp(base: U256, exponent: U256) -> U256 {
    base.overflowing_pow(exponent).0
}

/// Extend the sign bit of the `(b + 1)`-byte value `x`
pub fn signextend(b: U256, x: U256) -> U256 {
    if b >= U256::from(31) {
        return x;
    }
    let bit = b.low_u64() as usize * 8 + 7;
    let mask = (U256::one() << bit) - U256::one();
    if x.bit(bit) {
        x | !mask
    } else {
        x & mask
    }
}

/// Byte `i` of `x`, counting from the most significant
pub fn byte(i: U256, x: U256) -> U256 {
    if i >= U256::from(32) {
        return U256::zero();
    }
    let shift = (31 - i.low_u64() as usize) * 8;
    (x >> shift) & U256::from(0xFF)
}

/// Logical shift left
pub fn shl(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) {
        U256::zero()
    } else {
        value << shift.low_u64() as usize
    }
}

/// Logical shift right
pub fn shr(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) {
        U256::zero()
    } else {
        value >> shift.low_u64() as usize
    }
}

/// Arithmetic shift right
pub fn sar(shift: U256, value: U256) -> U256 {
    let negative = is_negative(&value);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let shift = shift.low_u64() as usize;
    if negative {
        !((!value) >> shift)
    } else {
        value >> shift
    }
}

/// Signed less-than
pub fn slt(a: U256, b: U256) -> bool {
    match (is_negative(&a), is_negative(&b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

/// Signed greater-than
pub fn sgt(a: U256, b: U256) -> bool {
    slt(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(v: u64) -> U256 {
        U256::from(v)
    }

    fn neg(v: u64) -> U256 {
        negate(U256::from(v))
    }

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();
        stack.push(w(1)).unwrap();
        stack.push(w(2)).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop().unwrap(), w(2));
        assert_eq!(stack.pop().unwrap(), w(1));
        assert_eq!(stack.pop(), Err(EvmError::StackUnderflow));
    }

    #[test]
    fn test_overflow() {
        let mut stack = Stack::new();
        for i in 0..MAX_STACK_SIZE {
            stack.push(w(i as u64)).unwrap();
        }
        assert_eq!(stack.push(w(0)), Err(EvmError::StackOverflow));
        assert_eq!(stack.dup(1), Err(EvmError::StackOverflow));
    }

    #[test]
    fn test_peek_dup_swap() {
        let mut stack = Stack::new();
        for i in 1..=3 {
            stack.push(w(i)).unwrap();
        }
        assert_eq!(stack.peek(0).unwrap(), w(3));
        assert_eq!(stack.peek(2).unwrap(), w(1));
        assert!(stack.peek(3).is_err());

        stack.dup(3).unwrap();
        assert_eq!(stack.peek(0).unwrap(), w(1));

        stack.swap(3).unwrap();
        assert_eq!(stack.peek(0).unwrap(), w(1));
        assert_eq!(stack.peek(3).unwrap(), w(1));
        assert_eq!(stack.swap(4), Err(EvmError::StackUnderflow));
        assert_eq!(stack.swap(0), Err(EvmError::StackUnderflow));
    }

    #[test]
    fn test_top_down_iteration() {
        let mut stack = Stack::new();
        stack.push(w(1)).unwrap();
        stack.push(w(2)).unwrap();
        let items: Vec<_> = stack.iter_top_down().copied().collect();
        assert_eq!(items, vec![w(2), w(1)]);
    }

    #[test]
    fn test_signed_division() {
        assert_eq!(sdiv(neg(10), w(3)), neg(3));
        assert_eq!(sdiv(w(10), neg(3)), neg(3));
        assert_eq!(sdiv(neg(10), neg(3)), w(3));
        assert_eq!(sdiv(w(10), w(0)), w(0));
        // MIN / -1 overflows back to MIN
        let min = U256::one() << 255;
        assert_eq!(sdiv(min, U256::MAX), min);
    }

    #[test]
    fn test_signed_modulo() {
        assert_eq!(smod(neg(10), w(3)), neg(1));
        assert_eq!(smod(w(10), neg(3)), w(1));
        assert_eq!(smod(w(10), w(0)), w(0));
    }

    #[test]
    fn test_addmod_mulmod_wide() {
        assert_eq!(addmod(U256::MAX, w(2), w(10)), (U256::MAX % w(10) + w(2)) % w(10));
        assert_eq!(addmod(w(1), w(2), w(0)), w(0));
        assert_eq!(mulmod(U256::MAX, U256::MAX, w(12)), w(9));
        assert_eq!(mulmod(w(3), w(4), w(0)), w(0));
    }

    #[test]
    fn test_exp_wraps() {
        assert_eq!(exp(w(2), w(10)), w(1024));
        assert_eq!(exp(w(2), w(256)), w(0));
        assert_eq!(exp(w(0), w(0)), w(1));
    }

    #[test]
    fn test_signextend() {
        assert_eq!(signextend(w(0), w(0xFF)), U256::MAX);
        assert_eq!(signextend(w(0), w(0x7F)), w(0x7F));
        assert_eq!(signextend(w(1), w(0x80FF)), U256::MAX - w(0x7F00));
        assert_eq!(signextend(w(31), w(0xFF)), w(0xFF));
        assert_eq!(signextend(U256::MAX, w(0xFF)), w(0xFF));
    }

    #[test]
    fn test_byte() {
        let x = U256::from_big_endian(&[0xAB; 32]) ^ U256::from(0xAB ^ 0x12);
        assert_eq!(byte(w(31), x), w(0x12));
        assert_eq!(byte(w(0), x), w(0xAB));
        assert_eq!(byte(w(32), x), w(0));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(shl(w(4), w(1)), w(16));
        assert_eq!(shl(w(256), w(1)), w(0));
        assert_eq!(shr(w(4), w(16)), w(1));
        assert_eq!(shr(w(300), w(16)), w(0));
        assert_eq!(sar(w(4), neg(16)), neg(1));
        assert_eq!(sar(w(256), neg(16)), U256::MAX);
        assert_eq!(sar(w(256), w(16)), w(0));
        assert_eq!(sar(w(1), w(16)), w(8));
    }

    #[test]
    fn test_signed_compare() {
        assert!(slt(neg(1), w(0)));
        assert!(!slt(w(0), neg(1)));
        assert!(slt(w(1), w(2)));
        assert!(sgt(w(0), neg(1)));
        assert!(slt(neg(2), neg(1)));
    }

    #[test]
    fn test_saturating_conversions() {
        assert_eq!(as_u64_saturated(&w(42)), 42);
        assert_eq!(as_u64_saturated(&U256::MAX), u64::MAX);
        assert_eq!(as_usize_saturated(&(U256::one() << 64)), usize::MAX);
    }
}
