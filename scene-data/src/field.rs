//! Field blueprints
//!
//! A blueprint describes one field to be laid out by the combiner: its name,
//! where its mapping and data come from and how it's typed. Both the mapping
//! and the data can be a *placeholder*, which only reserves space of a given
//! entry count to be filled in after the table is allocated.

use crate::bits::BitSlice;
use crate::types::{
    FieldValue, MappingIndex, MappingType, SceneField, SceneFieldFlags, SceneFieldType,
};
use crate::view::StridedBytes;

/// Where a field's object mapping comes from
#[derive(Debug, Clone, Copy)]
pub enum MappingSource<'a> {
    /// Existing mapping values of given width
    View { ty: MappingType, view: StridedBytes<'a> },
    /// Zero-initialized space for given entry count, never shared
    Placeholder(usize),
}

impl<'a> MappingSource<'a> {
    pub fn from_slice<M: MappingIndex>(mapping: &'a [M]) -> Self {
        MappingSource::View {
            ty: M::TYPE,
            view: StridedBytes::from_slice(mapping),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MappingSource::View { view, .. } => view.len(),
            MappingSource::Placeholder(count) => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a field's values come from
#[derive(Debug, Clone, Copy)]
pub enum FieldSource<'a> {
    /// One element of `field_type.size() * array_size` bytes per entry
    View(StridedBytes<'a>),
    /// Packed bits, `array_size` bits per entry
    Bits(BitSlice<'a>),
    /// Zero-initialized space for given entry count
    Placeholder(usize),
}

/// Description of a single field to be combined into a scene
#[derive(Debug, Clone, Copy)]
pub struct FieldBlueprint<'a> {
    pub name: SceneField,
    pub mapping: MappingSource<'a>,
    pub field_type: SceneFieldType,
    pub data: FieldSource<'a>,
    /// Zero for non-array fields
    pub array_size: u16,
    pub flags: SceneFieldFlags,
    /// String blob referenced by [`SceneFieldType::StringRange32`] values
    pub strings: Option<&'a [u8]>,
}

impl<'a> FieldBlueprint<'a> {
    /// Create a blueprint from arbitrary sources
    ///
    /// # Panics
    /// If the mapping and data entry counts differ or the data source doesn't
    /// match `field_type` and `array_size`.
    pub fn new(
        name: SceneField,
        mapping: MappingSource<'a>,
        field_type: SceneFieldType,
        data: FieldSource<'a>,
        array_size: u16,
        flags: SceneFieldFlags,
    ) -> Self {
        let count = mapping.len();
        let columns = (array_size as usize).max(1);
        match data {
            FieldSource::View(view) => {
                assert!(
                    !field_type.is_bit(),
                    "FieldBlueprint: {} has bit type but byte data",
                    name
                );
                assert_eq!(
                    view.len(),
                    count,
                    "FieldBlueprint: {} has {} mapping entries but {} data entries",
                    name,
                    count,
                    view.len()
                );
                assert_eq!(
                    view.element_size(),
                    field_type.size() * columns,
                    "FieldBlueprint: {} expected {} bytes per entry",
                    name,
                    field_type.size() * columns
                );
            }
            FieldSource::Bits(bits) => {
                assert!(
                    field_type.is_bit(),
                    "FieldBlueprint: {} has bit data but {:?} type",
                    name,
                    field_type
                );
                assert_eq!(
                    bits.len(),
                    count * columns,
                    "FieldBlueprint: {} has {} mapping entries but {} bits",
                    name,
                    count,
                    bits.len()
                );
            }
            FieldSource::Placeholder(entries) => {
                assert_eq!(
                    entries, count,
                    "FieldBlueprint: {} has {} mapping entries but {} data entries",
                    name, count, entries
                );
            }
        }

        Self {
            name,
            mapping,
            field_type,
            data,
            array_size,
            flags,
            strings: None,
        }
    }

    /// Field with one typed value per mapping entry
    pub fn from_slices<M: MappingIndex, T: FieldValue>(
        name: SceneField,
        mapping: &'a [M],
        data: &'a [T],
        flags: SceneFieldFlags,
    ) -> Self {
        Self::new(
            name,
            MappingSource::from_slice(mapping),
            T::TYPE,
            FieldSource::View(StridedBytes::from_slice(data)),
            0,
            flags,
        )
    }

    /// Array field with `array_size` consecutive values per mapping entry
    ///
    /// # Panics
    /// If `data` doesn't contain exactly `mapping.len() * array_size` values.
    pub fn array_from_slices<M: MappingIndex, T: FieldValue>(
        name: SceneField,
        mapping: &'a [M],
        data: &'a [T],
        array_size: u16,
        flags: SceneFieldFlags,
    ) -> Self {
        assert!(array_size > 0, "FieldBlueprint: {} array size can't be zero", name);
        assert_eq!(
            data.len(),
            mapping.len() * array_size as usize,
            "FieldBlueprint: {} expected {} values",
            name,
            mapping.len() * array_size as usize
        );
        let bytes: &'a [u8] = bytemuck::cast_slice(data);
        let element_size = std::mem::size_of::<T>() * array_size as usize;
        let view = StridedBytes::from_bytes(bytes, mapping.len(), element_size, element_size)
            .unwrap_or_else(|| StridedBytes::from_slice::<u8>(&[]));
        Self::new(
            name,
            MappingSource::from_slice(mapping),
            T::TYPE,
            FieldSource::View(view),
            array_size,
            flags,
        )
    }

    pub fn bits_from_slice<M: MappingIndex>(
        name: SceneField,
        mapping: &'a [M],
        bits: BitSlice<'a>,
        array_size: u16,
        flags: SceneFieldFlags,
    ) -> Self {
        Self::new(
            name,
            MappingSource::from_slice(mapping),
            SceneFieldType::Bit,
            FieldSource::Bits(bits),
            array_size,
            flags,
        )
    }

    /// Field whose data are reserved but not filled
    pub fn placeholder(
        name: SceneField,
        mapping: MappingSource<'a>,
        field_type: SceneFieldType,
        array_size: u16,
        flags: SceneFieldFlags,
    ) -> Self {
        let count = mapping.len();
        Self::new(name, mapping, field_type, FieldSource::Placeholder(count), array_size, flags)
    }

    /// String field, each entry a `[offset, size]` byte range into `strings`
    ///
    /// # Panics
    /// If a range points outside of `strings`.
    pub fn strings_from<M: MappingIndex>(
        name: SceneField,
        mapping: &'a [M],
        ranges: &'a [[u32; 2]],
        strings: &'a [u8],
        flags: SceneFieldFlags,
    ) -> Self {
        for (i, &[offset, size]) in ranges.iter().enumerate() {
            assert!(
                offset as usize + size as usize <= strings.len(),
                "FieldBlueprint: {} string {} out of range for {} bytes",
                name,
                i,
                strings.len()
            );
        }
        let mut blueprint = Self::new(
            name,
            MappingSource::from_slice(mapping),
            SceneFieldType::StringRange32,
            FieldSource::View(StridedBytes::from_slice(ranges)),
            0,
            flags,
        );
        blueprint.strings = Some(strings);
        blueprint
    }

    /// Entry count
    pub fn size(&self) -> usize {
        self.mapping.len()
    }

    /// Size of one entry in bytes, zero for bit fields
    pub fn element_size(&self) -> usize {
        self.field_type.size() * (self.array_size as usize).max(1)
    }

    pub fn with_flags(mut self, flags: SceneFieldFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitArray;

    #[test]
    fn test_from_slices() {
        let mapping = [3u16, 0, 7];
        let meshes = [1u32, 2, 3];
        let field = FieldBlueprint::from_slices(
            SceneField::MESH,
            &mapping,
            &meshes,
            SceneFieldFlags::empty(),
        );
        assert_eq!(field.size(), 3);
        assert_eq!(field.field_type, SceneFieldType::U32);
        assert_eq!(field.element_size(), 4);
        match field.mapping {
            MappingSource::View { ty, .. } => assert_eq!(ty, MappingType::U16),
            MappingSource::Placeholder(_) => panic!("expected a view"),
        }
    }

    #[test]
    fn test_array_from_slices() {
        let mapping = [0u8, 1];
        let data = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let field = FieldBlueprint::array_from_slices(
            SceneField::custom(1),
            &mapping,
            &data,
            3,
            SceneFieldFlags::empty(),
        );
        assert_eq!(field.element_size(), 12);
        match field.data {
            FieldSource::View(view) => assert_eq!(view.read::<[f32; 3]>(1), [4.0, 5.0, 6.0]),
            _ => panic!("expected a view"),
        }
    }

    #[test]
    fn test_bits_and_placeholders() {
        let mapping = [0u32, 1, 2];
        let bits = BitArray::from_bools(&[true, false, true, true, false, false]);
        let field = FieldBlueprint::bits_from_slice(
            SceneField::custom(2),
            &mapping,
            bits.view(),
            2,
            SceneFieldFlags::empty(),
        );
        assert_eq!(field.element_size(), 0);

        let placeholder = FieldBlueprint::placeholder(
            SceneField::PARENT,
            MappingSource::Placeholder(5),
            SceneFieldType::I32,
            0,
            SceneFieldFlags::ORDERED_MAPPING,
        );
        assert_eq!(placeholder.size(), 5);
        assert!(matches!(placeholder.data, FieldSource::Placeholder(5)));
    }

    #[test]
    #[should_panic(expected = "has 2 mapping entries but 3 data entries")]
    fn test_count_mismatch() {
        let mapping = [0u8, 1];
        let data = [1i8, 2, 3];
        let _ = FieldBlueprint::from_slices(
            SceneField::custom(0),
            &mapping,
            &data,
            SceneFieldFlags::empty(),
        );
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_string_out_of_range() {
        let mapping = [0u8];
        let ranges = [[2u32, 5]];
        let _ = FieldBlueprint::strings_from(
            SceneField::custom(0),
            &mapping,
            &ranges,
            b"abc",
            SceneFieldFlags::empty(),
        );
    }
}
