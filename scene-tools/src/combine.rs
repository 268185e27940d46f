//! Field combiner
//!
//! Lays out a list of field blueprints into a single freshly allocated
//! buffer. Every item is placed at its natural alignment in field order: the
//! mapping (unless an earlier field already placed the very same mapping
//! view), the values and, for string fields, the string blob.

use scene_data::{
    bytes_for_bits, read_index, write_index, AlignedBuffer, BitSliceMut, DataLayout, FieldBlueprint,
    FieldLayout, FieldSource, MappingSource, MappingType, SceneData, ViewId,
};
use std::collections::BTreeMap;

fn place(len: &mut usize, size: usize, alignment: usize) -> usize {
    let offset = len.div_ceil(alignment) * alignment;
    *len = offset + size;
    offset
}

/// Combine fields into a new owned scene
///
/// Mapping values are converted to `mapping_type`, fields that referenced
/// the same mapping view keep sharing a single copy of it. Placeholder
/// mappings and values are zero-initialized and never shared.
///
/// # Panics
/// If a mapping value isn't representable in `mapping_type`.
pub fn combine_fields(
    mapping_type: MappingType,
    mapping_bound: u64,
    fields: &[FieldBlueprint<'_>],
) -> SceneData<'static> {
    let mut unique_mappings: BTreeMap<ViewId, usize> = BTreeMap::new();
    let mut copy_mapping = Vec::with_capacity(fields.len());
    let mut layouts = Vec::with_capacity(fields.len());
    let mut len = 0;

    for field in fields {
        let count = field.size();
        let mapping_size = count * mapping_type.size();

        let mapping_offset = match field.mapping {
            MappingSource::View { view, .. } if !view.is_empty() => {
                if let Some(&offset) = unique_mappings.get(&view.id()) {
                    copy_mapping.push(false);
                    offset
                } else {
                    let offset = place(&mut len, mapping_size, mapping_type.alignment());
                    unique_mappings.insert(view.id(), offset);
                    copy_mapping.push(true);
                    offset
                }
            }
            _ => {
                copy_mapping.push(false);
                place(&mut len, mapping_size, mapping_type.alignment())
            }
        };

        let element_size = field.element_size();
        let data = if field.field_type.is_bit() {
            let bits = count * (field.array_size as usize).max(1);
            let offset = place(&mut len, bytes_for_bits(bits), 1);
            DataLayout::Bits { bit_offset: offset * 8 }
        } else if field.field_type.is_string() {
            let offset = place(&mut len, count * element_size, field.field_type.alignment());
            let blob_size = field.strings.map_or(0, <[u8]>::len);
            let blob_offset = place(&mut len, blob_size, 1);
            DataLayout::Strings {
                offset,
                stride: element_size,
                blob_offset,
                blob_size,
            }
        } else {
            let offset = place(&mut len, count * element_size, field.field_type.alignment());
            DataLayout::Strided {
                offset,
                stride: element_size,
            }
        };

        layouts.push(FieldLayout {
            name: field.name,
            field_type: field.field_type,
            array_size: field.array_size,
            flags: field.flags,
            size: count,
            mapping_type,
            mapping_offset,
            mapping_stride: mapping_type.size(),
            data,
        });
    }

    log::trace!(
        "combine_fields: {} fields, {} unique mappings, {} bytes",
        fields.len(),
        unique_mappings.len(),
        len
    );

    let mut buffer = AlignedBuffer::zeroed(len);
    let bytes = buffer.as_bytes_mut();

    for ((field, layout), copy) in fields.iter().zip(&layouts).zip(copy_mapping) {
        if let (true, MappingSource::View { ty, view }) = (copy, field.mapping) {
            let stride = mapping_type.size();
            for (i, value) in view.iter().enumerate() {
                let offset = layout.mapping_offset + i * stride;
                write_index(
                    &mut bytes[offset..offset + stride],
                    mapping_type,
                    read_index(value, ty),
                );
            }
        }

        match (field.data, layout.data) {
            (FieldSource::View(view), DataLayout::Strided { offset, stride })
            | (FieldSource::View(view), DataLayout::Strings { offset, stride, .. }) => {
                for (i, element) in view.iter().enumerate() {
                    let begin = offset + i * stride;
                    bytes[begin..begin + element.len()].copy_from_slice(element);
                }
            }
            (FieldSource::Bits(src), DataLayout::Bits { bit_offset }) => {
                let mut dst = BitSliceMut::new(bytes, bit_offset, src.len());
                for (i, bit) in src.iter().enumerate() {
                    dst.set_value(i, bit);
                }
            }
            _ => {}
        }

        if let (Some(strings), DataLayout::Strings { blob_offset, blob_size, .. }) =
            (field.strings, layout.data)
        {
            bytes[blob_offset..blob_offset + blob_size].copy_from_slice(strings);
        }
    }

    SceneData::new(mapping_type, mapping_bound, buffer, layouts)
        .unwrap_or_else(|err| panic!("combine_fields(): inconsistent layout: {}", err))
}

/// Deep copy of `scene` into a freshly owned buffer
///
/// Fields that share a mapping still share it in the copy. Unlike
/// [`SceneData::into_owned`] the layout is recomputed, so unreferenced bytes
/// of the original buffer are dropped.
pub fn copy(scene: &SceneData<'_>) -> SceneData<'static> {
    combine_fields(scene.mapping_type(), scene.mapping_bound(), &scene.field_blueprints())
}
