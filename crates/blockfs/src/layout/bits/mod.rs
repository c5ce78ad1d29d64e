//! Growable bit vector backing the free-block bitmap.


/// `len` bits over a byte buffer, LSB-first within each byte.
///
/// The buffer may be longer than `len` bits so it can mirror whole on-disk blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitVector {
    bytes: Vec<u8>,
    len: u64,
}

impl BitVector {
    /// `zeroed` returns `len` clear bits over `byte_len` bytes (at least enough to hold them).
    #[must_use]
    pub fn zeroed(len: u64, byte_len: usize) -> Self {
        let needed = usize::try_from(len.div_ceil(8)).unwrap_or(usize::MAX);
        Self {
            bytes: vec![0u8; byte_len.max(needed)],
            len,
        }
    }

    /// `from_bytes` wraps an existing buffer, truncating `len` to what it can hold.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>, len: u64) -> Self {
        let len = len.min(bytes.len() as u64 * 8);
        Self { bytes, len }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    #[must_use]
    /// `get` returns the bit at `i`; bits past `len` read as clear.
    pub fn get(&self, i: u64) -> bool {
        if i >= self.len {
            return false;
        }
        let (byte, bit) = ((i >> 3) as usize, i & 7);
        (self.bytes[byte] >> bit) & 1 == 1
    }

    #[inline]
    /// `set` updates the bit at `i`; indices past `len` are ignored.
    pub fn set(&mut self, i: u64, val: bool) {
        if i >= self.len {
            return;
        }
        let (byte, bit) = ((i >> 3) as usize, i & 7);
        let m = 1u8 << bit;
        if val {
            self.bytes[byte] |= m;
        } else {
            self.bytes[byte] &= !m;
        }
    }

    /// `first_clear` returns the lowest clear bit below `len`.
    #[must_use]
    pub fn first_clear(&self) -> Option<u64> {
        self.bytes
            .iter()
            .enumerate()
            .find(|(_, byte)| **byte != 0xFF)
            .map(|(i, byte)| i as u64 * 8 + u64::from(byte.trailing_ones()))
            .filter(|&bit| bit < self.len)
    }

    /// `count_ones` counts set bits below `len`.
    #[must_use]
    pub fn count_ones(&self) -> u64 {
        (0..self.len).filter(|&i| self.get(i)).count() as u64
    }
}
