//! Bit-packed array for storing fixed-width block-state indices in a `Vec<u64>`.
//!
//! Each element occupies exactly `bits` bits (1..=32). Elements are packed
//! tightly and an element may straddle two adjacent words, low bits first,
//! which is the layout chunk sections use on the wire.

/// A compact array where each element is stored using a fixed number of bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitPackedArray {
    /// Raw storage. Elements are packed into 64-bit words.
    data: Vec<u64>,
    /// Bits per element (1..=32).
    bits: u8,
    /// Total number of logical elements.
    len: usize,
}

impl BitPackedArray {
    /// Creates a new array with `len` elements, all initialized to zero.
    pub fn new(bits: u8, len: usize) -> Self {
        debug_assert!((1..=32).contains(&bits), "bits must be in 1..=32");
        Self {
            data: vec![0u64; Self::word_count(bits, len)],
            bits,
            len,
        }
    }

    /// Number of `u64` words needed to hold `len` elements of `bits` bits.
    pub fn word_count(bits: u8, len: usize) -> usize {
        (len * usize::from(bits)).div_ceil(64)
    }

    /// Returns the value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&self, index: usize) -> u32 {
        assert!(index < self.len, "index out of bounds");
        let (start, end, offset) = self.locate(index);
        let mut value = self.data[start] >> offset;
        if end != start {
            value |= self.data[end] << (64 - offset);
        }
        (value & self.mask()) as u32
    }

    /// Sets the value at the given index. Bits of `value` above the element
    /// width are discarded.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&mut self, index: usize, value: u32) {
        assert!(index < self.len, "index out of bounds");
        let mask = self.mask();
        let value = u64::from(value) & mask;
        let (start, end, offset) = self.locate(index);
        self.data[start] = (self.data[start] & !(mask << offset)) | (value << offset);
        if end != start {
            let shift = 64 - offset;
            self.data[end] = (self.data[end] & !(mask >> shift)) | (value >> shift);
        }
    }

    /// Returns the number of bits per element.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Returns the number of logical elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a reference to the raw `u64` storage words.
    pub fn raw_data(&self) -> &[u64] {
        &self.data
    }

    /// Constructs a `BitPackedArray` from raw words.
    ///
    /// Returns `None` if `data` does not hold exactly the number of words
    /// that `bits * len` requires.
    pub fn from_raw(bits: u8, len: usize, data: Vec<u64>) -> Option<Self> {
        if !(1..=32).contains(&bits) || data.len() != Self::word_count(bits, len) {
            return None;
        }
        Some(Self { data, bits, len })
    }

    /// Copies every element into a new array with a different width.
    pub fn resized(&self, bits: u8) -> Self {
        let mut out = Self::new(bits, self.len);
        for i in 0..self.len {
            out.set(i, self.get(i));
        }
        out
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bits) - 1
    }

    /// `(start word, end word, bit offset in start word)` of element `index`.
    fn locate(&self, index: usize) -> (usize, usize, u32) {
        let bits = self.bits as usize;
        let bit_index = index * bits;
        let start = bit_index / 64;
        let end = (bit_index + bits - 1) / 64;
        (start, end, (bit_index % 64) as u32)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_bit_roundtrip() {
        let mut arr = BitPackedArray::new(4, 4096);
        for i in 0..4096 {
            arr.set(i, (i % 16) as u32);
        }
        for i in 0..4096 {
            assert_eq!(arr.get(i), (i % 16) as u32);
        }
    }

    #[test]
    fn test_values_straddling_words() {
        // 13 bits does not divide 64, so many entries span two words.
        let mut arr = BitPackedArray::new(13, 4096);
        for i in 0..4096 {
            arr.set(i, (i * 7 % 8192) as u32);
        }
        for i in 0..4096 {
            assert_eq!(arr.get(i), (i * 7 % 8192) as u32, "index {i}");
        }
    }

    #[test]
    fn test_set_does_not_clobber_neighbours() {
        let mut arr = BitPackedArray::new(5, 64);
        for i in 0..64 {
            arr.set(i, 31);
        }
        arr.set(12, 0); // bits 60..65, spans words 0 and 1
        assert_eq!(arr.get(11), 31);
        assert_eq!(arr.get(12), 0);
        assert_eq!(arr.get(13), 31);
    }

    #[test]
    fn test_word_counts_for_section_volume() {
        assert_eq!(BitPackedArray::word_count(4, 4096), 256);
        assert_eq!(BitPackedArray::word_count(5, 4096), 320);
        assert_eq!(BitPackedArray::word_count(13, 4096), 832);
    }

    #[test]
    fn test_from_raw_rejects_wrong_word_count() {
        assert!(BitPackedArray::from_raw(4, 4096, vec![0; 255]).is_none());
        assert!(BitPackedArray::from_raw(4, 4096, vec![0; 256]).is_some());
        assert!(BitPackedArray::from_raw(0, 4096, vec![]).is_none());
    }

    #[test]
    fn test_resized_preserves_values() {
        let mut arr = BitPackedArray::new(4, 100);
        for i in 0..100 {
            arr.set(i, (i % 16) as u32);
        }
        let wider = arr.resized(9);
        assert_eq!(wider.bits(), 9);
        for i in 0..100 {
            assert_eq!(wider.get(i), (i % 16) as u32);
        }
    }
}
