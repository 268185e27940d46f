//! Strided byte views
//!
//! Fields never own memory, they are strided projections of a byte buffer.
//! These views are width-agnostic: element access yields raw bytes, typed
//! access goes through `bytemuck`.

use crate::bits::BitSlice;
use crate::types::MappingType;
use bytemuck::Pod;

/// Structural identity of a strided view: pointer, element count, stride
///
/// Compared purely as a value, never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId {
    pub ptr: usize,
    pub count: usize,
    pub stride: usize,
}

/// `count` elements of `element_size` bytes, `stride` bytes apart
#[derive(Debug, Clone, Copy)]
pub struct StridedBytes<'a> {
    bytes: &'a [u8],
    count: usize,
    stride: usize,
    element_size: usize,
}

fn required_len(count: usize, stride: usize, element_size: usize) -> usize {
    if count == 0 {
        0
    } else {
        (count - 1) * stride + element_size
    }
}

impl<'a> StridedBytes<'a> {
    /// Create a view over `bytes`, which starts at the first element
    ///
    /// Returns `None` if the elements don't fit into `bytes`.
    pub fn from_bytes(
        bytes: &'a [u8],
        count: usize,
        stride: usize,
        element_size: usize,
    ) -> Option<Self> {
        if required_len(count, stride, element_size) > bytes.len() {
            return None;
        }
        Some(Self {
            bytes,
            count,
            stride,
            element_size,
        })
    }

    /// Create a view whose bounds were already validated
    pub(crate) fn from_parts(
        bytes: &'a [u8],
        count: usize,
        stride: usize,
        element_size: usize,
    ) -> Self {
        debug_assert!(required_len(count, stride, element_size) <= bytes.len());
        Self {
            bytes,
            count,
            stride,
            element_size,
        }
    }

    /// Contiguous view of a typed slice
    pub fn from_slice<T: Pod>(slice: &'a [T]) -> Self {
        let size = std::mem::size_of::<T>();
        Self {
            bytes: bytemuck::cast_slice(slice),
            count: slice.len(),
            stride: size,
            element_size: size,
        }
    }

    /// View of one `size`-byte member at byte `offset` of each struct in
    /// `slice`
    ///
    /// # Panics
    /// If the member doesn't fit into the struct.
    pub fn from_struct_field<S: Pod>(slice: &'a [S], offset: usize, size: usize) -> Self {
        let stride = std::mem::size_of::<S>();
        assert!(
            offset + size <= stride,
            "StridedBytes::from_struct_field(): member at {} of size {} doesn't fit into {} bytes",
            offset,
            size,
            stride
        );
        let bytes: &'a [u8] = bytemuck::cast_slice(slice);
        Self {
            bytes: &bytes[offset.min(bytes.len())..],
            count: slice.len(),
            stride,
            element_size: size,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    pub fn id(&self) -> ViewId {
        ViewId {
            ptr: self.bytes.as_ptr() as usize,
            count: self.count,
            stride: self.stride,
        }
    }

    pub fn get(&self, i: usize) -> &'a [u8] {
        assert!(
            i < self.count,
            "StridedBytes: index {} out of range for {} elements",
            i,
            self.count
        );
        let begin = i * self.stride;
        &self.bytes[begin..begin + self.element_size]
    }

    pub fn iter(self) -> impl Iterator<Item = &'a [u8]> + 'a {
        (0..self.count).map(move |i| self.get(i))
    }

    /// Read element `i` as `T`, which has to be exactly `element_size` bytes
    pub fn read<T: Pod>(&self, i: usize) -> T {
        bytemuck::pod_read_unaligned(self.get(i))
    }

    pub fn prefix(&self, count: usize) -> Self {
        assert!(
            count <= self.count,
            "StridedBytes: prefix of {} out of range for {} elements",
            count,
            self.count
        );
        Self { count, ..*self }
    }

    pub fn suffix(&self, begin: usize) -> Self {
        assert!(
            begin <= self.count,
            "StridedBytes: suffix from {} out of range for {} elements",
            begin,
            self.count
        );
        let offset = (begin * self.stride).min(self.bytes.len());
        Self {
            bytes: &self.bytes[offset..],
            count: self.count - begin,
            ..*self
        }
    }

    /// Gather all elements into a tightly packed vector
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.count * self.element_size);
        for element in self.iter() {
            out.extend_from_slice(element);
        }
        out
    }
}

/// Mutable counterpart of [`StridedBytes`]
#[derive(Debug)]
pub struct StridedBytesMut<'a> {
    bytes: &'a mut [u8],
    count: usize,
    stride: usize,
    element_size: usize,
}

impl<'a> StridedBytesMut<'a> {
    pub fn from_bytes(
        bytes: &'a mut [u8],
        count: usize,
        stride: usize,
        element_size: usize,
    ) -> Option<Self> {
        if required_len(count, stride, element_size) > bytes.len() {
            return None;
        }
        Some(Self {
            bytes,
            count,
            stride,
            element_size,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn as_const(&self) -> StridedBytes<'_> {
        StridedBytes {
            bytes: &*self.bytes,
            count: self.count,
            stride: self.stride,
            element_size: self.element_size,
        }
    }

    pub fn get_mut(&mut self, i: usize) -> &mut [u8] {
        assert!(
            i < self.count,
            "StridedBytesMut: index {} out of range for {} elements",
            i,
            self.count
        );
        let begin = i * self.stride;
        &mut self.bytes[begin..begin + self.element_size]
    }

    pub fn set(&mut self, i: usize, value: &[u8]) {
        self.get_mut(i).copy_from_slice(value);
    }

    pub fn write<T: Pod>(&mut self, i: usize, value: T) {
        self.set(i, bytemuck::bytes_of(&value));
    }
}

/// Read a mapping value of given width
pub fn read_index(bytes: &[u8], ty: MappingType) -> u64 {
    match ty {
        MappingType::U8 => bytes[0] as u64,
        MappingType::U16 => bytemuck::pod_read_unaligned::<u16>(&bytes[..2]) as u64,
        MappingType::U32 => bytemuck::pod_read_unaligned::<u32>(&bytes[..4]) as u64,
        MappingType::U64 => bytemuck::pod_read_unaligned::<u64>(&bytes[..8]),
    }
}

/// Write a mapping value of given width
///
/// # Panics
/// If `value` isn't representable in `ty`.
pub fn write_index(bytes: &mut [u8], ty: MappingType, value: u64) {
    assert!(
        value <= ty.max(),
        "write_index(): object {} not representable with {:?}",
        value,
        ty
    );
    match ty {
        MappingType::U8 => bytes[0] = value as u8,
        MappingType::U16 => bytes[..2].copy_from_slice(&(value as u16).to_ne_bytes()),
        MappingType::U32 => bytes[..4].copy_from_slice(&(value as u32).to_ne_bytes()),
        MappingType::U64 => bytes[..8].copy_from_slice(&value.to_ne_bytes()),
    }
}

/// Copy elements of `src` whose `mask` bit is set into consecutive elements
/// of `dst`, preserving their relative order
///
/// # Panics
/// If `mask` doesn't match `src` in size, `dst` doesn't have exactly
/// `mask.count_ones()` elements or element sizes differ.
pub fn masked_copy(src: StridedBytes<'_>, mask: BitSlice<'_>, dst: &mut StridedBytesMut<'_>) {
    assert_eq!(src.len(), mask.len(), "masked_copy: expected {} mask bits", src.len());
    assert_eq!(
        dst.len(),
        mask.count_ones(),
        "masked_copy: expected {} destination elements",
        mask.count_ones()
    );
    assert_eq!(src.element_size(), dst.element_size(), "masked_copy: element size mismatch");

    for (out, i) in mask.iter_ones().enumerate() {
        dst.set(out, src.get(i));
    }
}
