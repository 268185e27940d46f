//! Scene table
//!
//! A [`SceneData`] is a set of named fields over one contiguous byte buffer.
//! Every field is a pair of equally-sized columns: an object mapping (which
//! object each entry belongs to) and the entry values. Fields only record
//! offsets and strides into the buffer, so several fields can point at the
//! same mapping bytes.

use crate::bits::{BitSlice, BitSliceMut};
use crate::error::{Result, SceneError};
use crate::field::{FieldBlueprint, FieldSource, MappingSource};
use crate::types::{FieldValue, MappingType, SceneField, SceneFieldFlags, SceneFieldType};
use crate::view::{read_index, StridedBytes, StridedBytesMut, ViewId};

/// Zero-initialized byte buffer aligned to 8 bytes
///
/// Backed by `u64` words so any field type can be placed at its natural
/// alignment relative to the start of the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignedBuffer {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(8)],
            len,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buffer = Self::zeroed(bytes.len());
        buffer.as_bytes_mut().copy_from_slice(bytes);
        buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }
}

#[derive(Debug)]
enum Storage<'a> {
    Owned(AlignedBuffer),
    Borrowed(&'a [u8]),
}

impl Storage<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(buffer) => buffer.as_bytes(),
            Storage::Borrowed(bytes) => bytes,
        }
    }
}

/// Placement of field values inside the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLayout {
    /// Fixed-size elements, `stride` bytes apart
    Strided { offset: usize, stride: usize },
    /// Packed bits starting at given bit offset, `array_size` bits per entry
    Bits { bit_offset: usize },
    /// `[u32 offset, u32 size]` elements plus the blob they point into
    Strings {
        offset: usize,
        stride: usize,
        blob_offset: usize,
        blob_size: usize,
    },
}

/// Placement and metadata of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: SceneField,
    pub field_type: SceneFieldType,
    pub array_size: u16,
    pub flags: SceneFieldFlags,
    /// Entry count
    pub size: usize,
    pub mapping_type: MappingType,
    pub mapping_offset: usize,
    pub mapping_stride: usize,
    pub data: DataLayout,
}

impl FieldLayout {
    /// Values per entry, one for non-array fields
    pub fn columns(&self) -> usize {
        (self.array_size as usize).max(1)
    }

    pub fn element_size(&self) -> usize {
        self.field_type.size() * self.columns()
    }
}

fn strided_end(offset: usize, count: usize, stride: usize, element_size: usize) -> usize {
    if count == 0 {
        offset
    } else {
        offset + (count - 1) * stride + element_size
    }
}

/// Scene table over a single owned or borrowed byte buffer
#[derive(Debug)]
pub struct SceneData<'a> {
    mapping_type: MappingType,
    mapping_bound: u64,
    storage: Storage<'a>,
    fields: Vec<FieldLayout>,
}

impl SceneData<'static> {
    /// Create a table owning `data`
    pub fn new(
        mapping_type: MappingType,
        mapping_bound: u64,
        data: AlignedBuffer,
        fields: Vec<FieldLayout>,
    ) -> Result<Self> {
        Self::with_storage(mapping_type, mapping_bound, Storage::Owned(data), fields)
    }
}

impl<'a> SceneData<'a> {
    /// Create a table referencing externally owned `data`
    ///
    /// The table can be read but not modified.
    pub fn from_borrowed(
        mapping_type: MappingType,
        mapping_bound: u64,
        data: &'a [u8],
        fields: Vec<FieldLayout>,
    ) -> Result<Self> {
        Self::with_storage(mapping_type, mapping_bound, Storage::Borrowed(data), fields)
    }

    fn with_storage(
        mapping_type: MappingType,
        mapping_bound: u64,
        storage: Storage<'a>,
        fields: Vec<FieldLayout>,
    ) -> Result<Self> {
        let len = storage.bytes().len();
        for (id, field) in fields.iter().enumerate() {
            let id = id as u32;
            if field.mapping_type != mapping_type {
                log::error!("SceneData: field {} has mismatched mapping type", id);
                return Err(SceneError::MappingTypeMismatch {
                    field: id,
                    expected: mapping_type,
                    got: field.mapping_type,
                });
            }
            if !Self::layout_matches_type(field) {
                log::error!(
                    "SceneData: field {} of type {:?} has a mismatched data layout",
                    id,
                    field.field_type
                );
                return Err(SceneError::LayoutMismatch {
                    field: id,
                    field_type: field.field_type,
                });
            }
            if !Self::field_fits(field, len) {
                log::error!("SceneData: field {} doesn't fit into {} bytes", id, len);
                return Err(SceneError::FieldOutOfBounds { field: id });
            }
        }

        Ok(Self {
            mapping_type,
            mapping_bound,
            storage,
            fields,
        })
    }

    fn layout_matches_type(field: &FieldLayout) -> bool {
        match field.data {
            DataLayout::Strided { .. } => field.field_type.is_trivially_copyable(),
            DataLayout::Bits { .. } => field.field_type.is_bit(),
            DataLayout::Strings { .. } => field.field_type.is_string(),
        }
    }

    fn field_fits(field: &FieldLayout, len: usize) -> bool {
        let mapping_end = strided_end(
            field.mapping_offset,
            field.size,
            field.mapping_stride,
            field.mapping_type.size(),
        );
        if mapping_end > len {
            return false;
        }

        match field.data {
            DataLayout::Strided { offset, stride } => {
                strided_end(offset, field.size, stride, field.element_size()) <= len
            }
            DataLayout::Bits { bit_offset } => bit_offset + field.size * field.columns() <= len * 8,
            DataLayout::Strings {
                offset,
                stride,
                blob_offset,
                blob_size,
            } => {
                strided_end(offset, field.size, stride, field.element_size()) <= len
                    && blob_offset + blob_size <= len
            }
        }
    }

    /// Same table with a different set of fields over the same buffer
    ///
    /// No data are copied. The fields are validated against the buffer.
    pub fn with_fields(self, fields: Vec<FieldLayout>) -> Result<Self> {
        Self::with_storage(self.mapping_type, self.mapping_bound, self.storage, fields)
    }

    pub fn mapping_type(&self) -> MappingType {
        self.mapping_type
    }

    /// Upper bound on object indices in all mappings
    pub fn mapping_bound(&self) -> u64 {
        self.mapping_bound
    }

    pub fn data(&self) -> &[u8] {
        self.storage.bytes()
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// Blueprint referencing the data of given field
    pub fn field_blueprint(&self, id: u32) -> Result<FieldBlueprint<'_>> {
        let field = self.field_layout(id)?;
        Ok(self.blueprint_of(field))
    }

    /// Blueprints of all fields, in field order
    ///
    /// Combining them yields a copy of the table with sharing preserved.
    pub fn field_blueprints(&self) -> Vec<FieldBlueprint<'_>> {
        self.fields.iter().map(|field| self.blueprint_of(field)).collect()
    }

    fn blueprint_of(&self, field: &FieldLayout) -> FieldBlueprint<'_> {
        let bytes = self.data();
        let mapping = MappingSource::View {
            ty: self.mapping_type,
            view: StridedBytes::from_parts(
                &bytes[field.mapping_offset..],
                field.size,
                field.mapping_stride,
                self.mapping_type.size(),
            ),
        };
        let data = match field.data {
            DataLayout::Strided { offset, stride } | DataLayout::Strings { offset, stride, .. } => {
                FieldSource::View(StridedBytes::from_parts(
                    &bytes[offset..],
                    field.size,
                    stride,
                    field.element_size(),
                ))
            }
            DataLayout::Bits { bit_offset } => {
                FieldSource::Bits(BitSlice::new(bytes, bit_offset, field.size * field.columns()))
            }
        };

        let mut blueprint = FieldBlueprint::new(
            field.name,
            mapping,
            field.field_type,
            data,
            field.array_size,
            field.flags,
        );
        if let DataLayout::Strings {
            blob_offset, blob_size, ..
        } = field.data
        {
            blueprint.strings = Some(&bytes[blob_offset..blob_offset + blob_size]);
        }
        blueprint
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    /// Non-owning table over the same bytes
    pub fn borrow(&self) -> SceneData<'_> {
        SceneData {
            mapping_type: self.mapping_type,
            mapping_bound: self.mapping_bound,
            storage: Storage::Borrowed(self.storage.bytes()),
            fields: self.fields.clone(),
        }
    }

    /// Owning table, copying the bytes if they're borrowed
    ///
    /// The layout is kept, so fields sharing a mapping still do afterwards.
    pub fn into_owned(self) -> SceneData<'static> {
        let storage = match self.storage {
            Storage::Owned(buffer) => buffer,
            Storage::Borrowed(bytes) => AlignedBuffer::from_bytes(bytes),
        };
        SceneData {
            mapping_type: self.mapping_type,
            mapping_bound: self.mapping_bound,
            storage: Storage::Owned(storage),
            fields: self.fields,
        }
    }

    pub fn field_count(&self) -> u32 {
        self.fields.len() as u32
    }

    /// Layout of given field
    pub fn field_layout(&self, id: u32) -> Result<&FieldLayout> {
        self.fields.get(id as usize).ok_or_else(|| {
            log::error!("SceneData: index {} out of range for {} fields", id, self.fields.len());
            SceneError::FieldIndexOutOfRange {
                index: id,
                count: self.field_count(),
            }
        })
    }

    pub fn field_size(&self, id: u32) -> Result<usize> {
        Ok(self.field_layout(id)?.size)
    }

    pub fn field_name(&self, id: u32) -> Result<SceneField> {
        Ok(self.field_layout(id)?.name)
    }

    pub fn field_type(&self, id: u32) -> Result<SceneFieldType> {
        Ok(self.field_layout(id)?.field_type)
    }

    pub fn field_array_size(&self, id: u32) -> Result<u16> {
        Ok(self.field_layout(id)?.array_size)
    }

    pub fn field_flags(&self, id: u32) -> Result<SceneFieldFlags> {
        Ok(self.field_layout(id)?.flags)
    }

    pub fn find_field_id(&self, name: SceneField) -> Option<u32> {
        self.fields.iter().position(|f| f.name == name).map(|i| i as u32)
    }

    pub fn field_id(&self, name: SceneField) -> Result<u32> {
        self.find_field_id(name).ok_or_else(|| {
            log::error!("SceneData: field {} not found", name);
            SceneError::FieldNotFound(name)
        })
    }

    /// Raw mapping bytes, one `mapping_type().size()` element per entry
    pub fn mapping(&self, id: u32) -> Result<StridedBytes<'_>> {
        let field = self.field_layout(id)?;
        let bytes = &self.data()[field.mapping_offset..];
        StridedBytes::from_bytes(bytes, field.size, field.mapping_stride, self.mapping_type.size())
            .ok_or(SceneError::FieldOutOfBounds { field: id })
    }

    /// Identity of the mapping view, equal for fields sharing a mapping
    pub fn mapping_id(&self, id: u32) -> Result<ViewId> {
        Ok(self.mapping(id)?.id())
    }

    pub fn mapping_into_u64(&self, id: u32) -> Result<Vec<u64>> {
        let ty = self.mapping_type;
        Ok(self.mapping(id)?.iter().map(|bytes| read_index(bytes, ty)).collect())
    }

    /// Mapping converted to 32-bit object indices
    ///
    /// Indices above `u32::MAX` only appear with a mapping bound above it and
    /// are truncated.
    pub fn mapping_as_array(&self, id: u32) -> Result<Vec<u32>> {
        let ty = self.mapping_type;
        Ok(self
            .mapping(id)?
            .iter()
            .map(|bytes| read_index(bytes, ty) as u32)
            .collect())
    }

    /// Raw field bytes, `field_type().size() * array_size` bytes per entry
    ///
    /// Bit fields have no byte representation, use [`Self::field_bits`].
    pub fn field(&self, id: u32) -> Result<StridedBytes<'_>> {
        let field = self.field_layout(id)?;
        let (offset, stride) = match field.data {
            DataLayout::Strided { offset, stride } | DataLayout::Strings { offset, stride, .. } => {
                (offset, stride)
            }
            DataLayout::Bits { .. } => {
                log::error!("SceneData: field {} is a bit field", field.name);
                return Err(SceneError::Unsupported {
                    field: field.name,
                    field_type: field.field_type,
                });
            }
        };
        StridedBytes::from_bytes(&self.data()[offset..], field.size, stride, field.element_size())
            .ok_or(SceneError::FieldOutOfBounds { field: id })
    }

    /// Packed bits of a bit field, `max(array_size, 1)` bits per entry
    pub fn field_bits(&self, id: u32) -> Result<BitSlice<'_>> {
        let field = self.field_layout(id)?;
        match field.data {
            DataLayout::Bits { bit_offset } => Ok(BitSlice::new(
                self.data(),
                bit_offset,
                field.size * field.columns(),
            )),
            _ => Err(Self::type_mismatch(field, SceneFieldType::Bit)),
        }
    }

    /// Field values as `T`, array fields flattened
    pub fn field_as<T: FieldValue>(&self, id: u32) -> Result<Vec<T>> {
        let field = self.field_layout(id)?;
        if field.field_type != T::TYPE {
            return Err(Self::type_mismatch(field, T::TYPE));
        }

        let size = std::mem::size_of::<T>();
        let mut out = Vec::with_capacity(field.size * field.columns());
        for element in self.field(id)?.iter() {
            out.extend(element.chunks_exact(size).map(bytemuck::pod_read_unaligned::<T>));
        }
        Ok(out)
    }

    /// Values of a string field
    pub fn field_strings(&self, id: u32) -> Result<Vec<String>> {
        let field = self.field_layout(id)?;
        let DataLayout::Strings {
            blob_offset, blob_size, ..
        } = field.data
        else {
            return Err(Self::type_mismatch(field, SceneFieldType::StringRange32));
        };

        let blob = &self.data()[blob_offset..blob_offset + blob_size];
        let mut out = Vec::with_capacity(field.size);
        for range in self.field(id)?.iter() {
            let [offset, size]: [u32; 2] = bytemuck::pod_read_unaligned(range);
            let begin = offset as usize;
            let end = begin + size as usize;
            if end > blob_size {
                return Err(SceneError::FieldOutOfBounds { field: id });
            }
            out.push(String::from_utf8_lossy(&blob[begin..end]).into_owned());
        }
        Ok(out)
    }

    fn type_mismatch(field: &FieldLayout, expected: SceneFieldType) -> SceneError {
        log::error!(
            "SceneData: field {} is {:?} but {:?} was requested",
            field.name,
            field.field_type,
            expected
        );
        SceneError::FieldTypeMismatch {
            field: field.name,
            expected,
            got: field.field_type,
        }
    }

    /// Position of the first entry at or after `offset` that belongs to
    /// `object`
    ///
    /// Constant time for implicit mappings, a binary search for ordered ones
    /// and a linear scan otherwise.
    pub fn find_field_object_offset(
        &self,
        id: u32,
        object: u64,
        offset: usize,
    ) -> Result<Option<usize>> {
        let field = self.field_layout(id)?;
        let size = field.size;
        if offset >= size {
            return Ok(None);
        }

        let ty = self.mapping_type;
        let mapping = self.mapping(id)?;
        let at = |i: usize| read_index(mapping.get(i), ty);

        if field.flags.contains(SceneFieldFlags::IMPLICIT_MAPPING) {
            let found = object as usize;
            return Ok((object >= offset as u64 && object < size as u64).then_some(found));
        }

        if field.flags.contains(SceneFieldFlags::ORDERED_MAPPING) {
            let (mut lo, mut hi) = (offset, size);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if at(mid) < object {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            return Ok((lo < size && at(lo) == object).then_some(lo));
        }

        Ok((offset..size).find(|&i| at(i) == object))
    }

    pub fn has_field_object(&self, id: u32, object: u64) -> Result<bool> {
        Ok(self.find_field_object_offset(id, object, 0)?.is_some())
    }

    /// `(object, parent)` pairs of the parent field
    pub fn parents_as_array(&self) -> Result<Vec<(u32, i32)>> {
        let id = self.field_id(SceneField::PARENT)?;
        let objects = self.mapping_as_array(id)?;
        let parents = self.signed_values(id)?;
        Ok(objects.into_iter().zip(parents).map(|(o, p)| (o, p as i32)).collect())
    }

    /// Objects whose parent is `parent`, `-1` gives root objects
    pub fn children_for(&self, parent: i64) -> Result<Vec<u64>> {
        let id = self.field_id(SceneField::PARENT)?;
        let objects = self.mapping_into_u64(id)?;
        let parents = self.signed_values(id)?;
        Ok(objects
            .into_iter()
            .zip(parents)
            .filter(|&(_, p)| p == parent)
            .map(|(o, _)| o)
            .collect())
    }

    fn signed_values(&self, id: u32) -> Result<Vec<i64>> {
        let field = self.field_layout(id)?;
        let read: fn(&[u8]) -> i64 = match field.field_type {
            SceneFieldType::I8 => |b| bytemuck::pod_read_unaligned::<i8>(b) as i64,
            SceneFieldType::I16 => |b| bytemuck::pod_read_unaligned::<i16>(b) as i64,
            SceneFieldType::I32 => |b| bytemuck::pod_read_unaligned::<i32>(b) as i64,
            SceneFieldType::I64 => |b| bytemuck::pod_read_unaligned::<i64>(b),
            _ => return Err(Self::type_mismatch(field, SceneFieldType::I32)),
        };
        Ok(self.field(id)?.iter().map(read).collect())
    }

    /// All values of field `name` attached to `object`, in entry order
    pub fn field_entries_for<T: FieldValue>(
        &self,
        name: SceneField,
        object: u64,
    ) -> Result<Vec<T>> {
        let id = self.field_id(name)?;
        let field = self.field_layout(id)?;
        if field.field_type != T::TYPE {
            return Err(Self::type_mismatch(field, T::TYPE));
        }

        let data = self.field(id)?;
        let size = std::mem::size_of::<T>();
        let mut out = Vec::new();
        let mut offset = 0;
        while let Some(found) = self.find_field_object_offset(id, object, offset)? {
            out.extend(data.get(found).chunks_exact(size).map(bytemuck::pod_read_unaligned::<T>));
            offset = found + 1;
        }
        Ok(out)
    }

    fn owned_bytes_mut(&mut self) -> Result<&mut [u8]> {
        match &mut self.storage {
            Storage::Owned(buffer) => Ok(buffer.as_bytes_mut()),
            Storage::Borrowed(_) => {
                log::error!("SceneData: the data are not mutable");
                Err(SceneError::NotMutable)
            }
        }
    }

    /// Mutable mapping bytes of an owned table
    ///
    /// Fields sharing the mapping see the modifications as well.
    pub fn mapping_mut(&mut self, id: u32) -> Result<StridedBytesMut<'_>> {
        let field = *self.field_layout(id)?;
        let element_size = self.mapping_type.size();
        let bytes = self.owned_bytes_mut()?;
        StridedBytesMut::from_bytes(
            &mut bytes[field.mapping_offset..],
            field.size,
            field.mapping_stride,
            element_size,
        )
        .ok_or(SceneError::FieldOutOfBounds { field: id })
    }

    pub fn field_mut(&mut self, id: u32) -> Result<StridedBytesMut<'_>> {
        let field = *self.field_layout(id)?;
        let (offset, stride) = match field.data {
            DataLayout::Strided { offset, stride } | DataLayout::Strings { offset, stride, .. } => {
                (offset, stride)
            }
            DataLayout::Bits { .. } => {
                return Err(SceneError::Unsupported {
                    field: field.name,
                    field_type: field.field_type,
                })
            }
        };
        let bytes = self.owned_bytes_mut()?;
        StridedBytesMut::from_bytes(&mut bytes[offset..], field.size, stride, field.element_size())
            .ok_or(SceneError::FieldOutOfBounds { field: id })
    }

    pub fn field_bits_mut(&mut self, id: u32) -> Result<BitSliceMut<'_>> {
        let field = *self.field_layout(id)?;
        let DataLayout::Bits { bit_offset } = field.data else {
            return Err(Self::type_mismatch(&field, SceneFieldType::Bit));
        };
        let bytes = self.owned_bytes_mut()?;
        Ok(BitSliceMut::new(bytes, bit_offset, field.size * field.columns()))
    }
}
