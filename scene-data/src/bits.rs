//! Dense bit arrays used as selection masks
//!
//! Bits are packed LSB-first into bytes. Owned storage is [`BitArray`], the
//! filters take non-owning [`BitSlice`] views so that several fields can be
//! filtered with the very same mask.

use std::fmt;

/// Structural identity of a bit view: pointer, bit offset, bit length
///
/// Two views with the same id are the same mask, not merely equal masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitSliceId {
    pub ptr: usize,
    pub offset: usize,
    pub len: usize,
}

/// Owned, growable-at-construction bit array
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BitArray {
    data: Vec<u8>,
    len: usize,
}

impl BitArray {
    /// Create a bit array of `len` bits, all set to `value`
    pub fn new(len: usize, value: bool) -> Self {
        let fill = if value { 0xff } else { 0x00 };
        let mut array = Self {
            data: vec![fill; bytes_for_bits(len)],
            len,
        };
        array.clear_padding();
        array
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        let mut array = Self::new(bits.len(), false);
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                array.set(i);
            }
        }
        array
    }

    /// Create a bit array of `len` bits with only the listed bits set
    pub fn from_indices(len: usize, indices: &[usize]) -> Self {
        let mut array = Self::new(len, false);
        for &i in indices {
            array.set(i);
        }
        array
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> bool {
        self.view().get(i)
    }

    pub fn set(&mut self, i: usize) {
        self.view_mut().set(i);
    }

    pub fn reset(&mut self, i: usize) {
        self.view_mut().reset(i);
    }

    pub fn set_value(&mut self, i: usize, value: bool) {
        self.view_mut().set_value(i, value);
    }

    pub fn set_all(&mut self) {
        self.data.fill(0xff);
        self.clear_padding();
    }

    pub fn reset_all(&mut self) {
        self.data.fill(0);
    }

    pub fn count_ones(&self) -> usize {
        self.view().count_ones()
    }

    pub fn view(&self) -> BitSlice<'_> {
        BitSlice {
            bytes: &self.data,
            offset: 0,
            len: self.len,
        }
    }

    pub fn view_mut(&mut self) -> BitSliceMut<'_> {
        BitSliceMut {
            bytes: &mut self.data,
            offset: 0,
            len: self.len,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn clear_padding(&mut self) {
        let rem = self.len % 8;
        if rem != 0 {
            if let Some(last) = self.data.last_mut() {
                *last &= (1u8 << rem) - 1;
            }
        }
    }
}

impl fmt::Debug for BitArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.view().fmt(f)
    }
}

/// Non-owning view of `len` bits starting `offset` bits into `bytes`
#[derive(Clone, Copy)]
pub struct BitSlice<'a> {
    bytes: &'a [u8],
    offset: usize,
    len: usize,
}

impl<'a> BitSlice<'a> {
    /// Create a view over `len` bits starting at bit `offset` of `bytes`
    ///
    /// # Panics
    /// If the bit range doesn't fit into `bytes`.
    pub fn new(bytes: &'a [u8], offset: usize, len: usize) -> Self {
        assert!(
            offset + len <= bytes.len() * 8,
            "BitSlice: {} bits at offset {} don't fit into {} bytes",
            len,
            offset,
            bytes.len()
        );
        // Normalize so the identity of equal ranges is equal
        let bytes = &bytes[offset / 8..];
        Self {
            bytes,
            offset: offset % 8,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bit_offset(&self) -> usize {
        self.offset
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn id(&self) -> BitSliceId {
        BitSliceId {
            ptr: self.bytes.as_ptr() as usize,
            offset: self.offset,
            len: self.len,
        }
    }

    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len, "BitSlice: index {} out of range for {} bits", i, self.len);
        let bit = self.offset + i;
        (self.bytes[bit >> 3] >> (bit & 7)) & 1 != 0
    }

    pub fn count_ones(&self) -> usize {
        if self.offset == 0 {
            let full = self.len / 8;
            let mut count: usize = self.bytes[..full]
                .iter()
                .map(|b| b.count_ones() as usize)
                .sum();
            let rem = self.len % 8;
            if rem != 0 {
                count += (self.bytes[full] & ((1u8 << rem) - 1)).count_ones() as usize;
            }
            return count;
        }

        (0..self.len).filter(|&i| self.get(i)).count()
    }

    pub fn all(&self) -> bool {
        self.count_ones() == self.len
    }

    /// Iterate over indices of set bits in ascending order
    pub fn iter_ones(self) -> impl Iterator<Item = usize> + 'a {
        (0..self.len).filter(move |&i| self.get(i))
    }

    pub fn iter(self) -> impl Iterator<Item = bool> + 'a {
        (0..self.len).map(move |i| self.get(i))
    }

    pub fn slice(&self, begin: usize, end: usize) -> BitSlice<'a> {
        assert!(
            begin <= end && end <= self.len,
            "BitSlice: slice [{}, {}) out of range for {} bits",
            begin,
            end,
            self.len
        );
        BitSlice::new(self.bytes, self.offset + begin, end - begin)
    }

    pub fn prefix(&self, len: usize) -> BitSlice<'a> {
        self.slice(0, len)
    }
}

impl fmt::Debug for BitSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for i in 0..self.len {
            if i != 0 {
                f.write_str(", ")?;
            }
            f.write_str(if self.get(i) { "1" } else { "0" })?;
        }
        f.write_str("}")
    }
}

/// Mutable counterpart of [`BitSlice`]
pub struct BitSliceMut<'a> {
    bytes: &'a mut [u8],
    offset: usize,
    len: usize,
}

impl<'a> BitSliceMut<'a> {
    pub fn new(bytes: &'a mut [u8], offset: usize, len: usize) -> Self {
        assert!(
            offset + len <= bytes.len() * 8,
            "BitSliceMut: {} bits at offset {} don't fit into {} bytes",
            len,
            offset,
            bytes.len()
        );
        let bytes = &mut bytes[offset / 8..];
        Self {
            bytes,
            offset: offset % 8,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_const(&self) -> BitSlice<'_> {
        BitSlice {
            bytes: &*self.bytes,
            offset: self.offset,
            len: self.len,
        }
    }

    pub fn get(&self, i: usize) -> bool {
        self.as_const().get(i)
    }

    pub fn set(&mut self, i: usize) {
        self.set_value(i, true);
    }

    pub fn reset(&mut self, i: usize) {
        self.set_value(i, false);
    }

    pub fn set_value(&mut self, i: usize, value: bool) {
        assert!(i < self.len, "BitSliceMut: index {} out of range for {} bits", i, self.len);
        let bit = self.offset + i;
        let byte = &mut self.bytes[bit >> 3];
        if value {
            *byte |= 1 << (bit & 7);
        } else {
            *byte &= !(1 << (bit & 7));
        }
    }
}

/// Bytes needed to store `bits` packed bits
pub fn bytes_for_bits(bits: usize) -> usize {
    bits.div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_count() {
        let ones = BitArray::new(13, true);
        assert_eq!(ones.len(), 13);
        assert_eq!(ones.count_ones(), 13);
        // Padding bits past the end stay clear
        assert_eq!(ones.as_bytes()[1], 0b0001_1111);

        let zeros = BitArray::new(13, false);
        assert_eq!(zeros.count_ones(), 0);
        assert!(BitArray::new(0, true).is_empty());
    }

    #[test]
    fn test_set_reset() {
        let mut bits = BitArray::new(10, false);
        bits.set(0);
        bits.set(9);
        bits.set(4);
        assert!(bits.get(0) && bits.get(4) && bits.get(9));
        assert!(!bits.get(1));
        assert_eq!(bits.count_ones(), 3);

        bits.reset(4);
        assert_eq!(bits.count_ones(), 2);

        bits.set_all();
        assert_eq!(bits.count_ones(), 10);
        bits.reset_all();
        assert_eq!(bits.count_ones(), 0);
    }

    #[test]
    fn test_iter_ones() {
        let bits = BitArray::from_bools(&[true, false, true, true, false]);
        assert_eq!(bits.view().iter_ones().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(format!("{:?}", bits), "{1, 0, 1, 1, 0}");
    }

    #[test]
    fn test_unaligned_slice() {
        let bits = BitArray::from_indices(20, &[3, 9, 10, 17]);
        let slice = bits.view().slice(9, 18);
        assert_eq!(slice.len(), 9);
        assert_eq!(slice.count_ones(), 3);
        assert!(slice.get(0));
        assert!(slice.get(1));
        assert!(slice.get(8));
        assert_eq!(slice.bit_offset(), 1);
    }

    #[test]
    fn test_identity() {
        let bits = BitArray::new(16, true);
        let other = bits.clone();

        assert_eq!(bits.view().id(), bits.view().id());
        // Equal content, different storage
        assert_ne!(bits.view().id(), other.view().id());
        // Same range reached through different offsets
        assert_eq!(bits.view().slice(8, 12).id(), BitSlice::new(bits.as_bytes(), 8, 4).id());
    }
}
