//! Field, entry and object filtering
//!
//! [`filter_fields`] drops whole fields without touching any data.
//! [`filter_field_entries`] and [`filter_objects`] drop individual entries
//! and repack the result into a new table through
//! [`combine_fields`](crate::combine_fields), keeping fields that shared a
//! mapping sharing it afterwards.

use crate::combine::combine_fields;
use scene_data::{
    masked_copy, BitArray, BitSlice, BitSliceId, FieldBlueprint, MappingSource, Result, SceneData,
    SceneError, SceneField, StridedBytes, StridedBytesMut, ViewId,
};
use std::collections::BTreeMap;

/// Keep only fields whose bit in `fields_to_keep` is set
///
/// The result references the same buffer as `scene`, owned stays owned and
/// borrowed stays borrowed. Pass `scene.borrow()` to keep the original table
/// around.
pub fn filter_fields<'a>(
    scene: SceneData<'a>,
    fields_to_keep: BitSlice<'_>,
) -> Result<SceneData<'a>> {
    let count = scene.field_count() as usize;
    if fields_to_keep.len() != count {
        log::error!(
            "filter_fields: expected {} bits but got {}",
            count,
            fields_to_keep.len()
        );
        return Err(SceneError::FieldMaskSizeMismatch {
            expected: count,
            got: fields_to_keep.len(),
        });
    }

    let fields = scene
        .fields()
        .iter()
        .zip(fields_to_keep.iter())
        .filter(|&(_, keep)| keep)
        .map(|(field, _)| *field)
        .collect();
    scene.with_fields(fields)
}

/// Keep only fields with given names, names not present are ignored
pub fn filter_only_fields<'a>(
    scene: SceneData<'a>,
    fields: &[SceneField],
) -> Result<SceneData<'a>> {
    let mut keep = BitArray::new(scene.field_count() as usize, false);
    for &name in fields {
        if let Some(id) = scene.find_field_id(name) {
            keep.set(id as usize);
        }
    }
    filter_fields(scene, keep.view())
}

/// Keep all fields except those with given names
pub fn filter_except_fields<'a>(
    scene: SceneData<'a>,
    fields: &[SceneField],
) -> Result<SceneData<'a>> {
    let mut keep = BitArray::new(scene.field_count() as usize, true);
    for &name in fields {
        if let Some(id) = scene.find_field_id(name) {
            keep.reset(id as usize);
        }
    }
    filter_fields(scene, keep.view())
}

fn id_mask(scene: &SceneData<'_>, ids: &[u32], value: bool) -> Result<BitArray> {
    let count = scene.field_count();
    let mut mask = BitArray::new(count as usize, !value);
    for &id in ids {
        if id >= count {
            log::error!("filter: index {} out of range for {} fields", id, count);
            return Err(SceneError::FieldIndexOutOfRange { index: id, count });
        }
        mask.set_value(id as usize, value);
    }
    Ok(mask)
}

/// Keep only fields with given ids
pub fn filter_only_field_ids<'a>(scene: SceneData<'a>, ids: &[u32]) -> Result<SceneData<'a>> {
    let keep = id_mask(&scene, ids, true)?;
    filter_fields(scene, keep.view())
}

/// Keep all fields except those with given ids
pub fn filter_except_field_ids<'a>(scene: SceneData<'a>, ids: &[u32]) -> Result<SceneData<'a>> {
    let keep = id_mask(&scene, ids, false)?;
    filter_fields(scene, keep.view())
}

/// Fields referencing one mapping view
#[derive(Debug, Default)]
struct MappingGroup {
    references: usize,
    listed: usize,
    mask: Option<BitSliceId>,
    /// Compacted mapping, shared by reference by all listed fields
    filtered: Vec<u8>,
}

/// Keep only entries whose bit is set in the mask paired with each field
///
/// Fields not listed in `entries_to_keep` are copied unchanged. Listed
/// fields with an implicit mapping are marked as ordered instead, regardless
/// of which entries were kept.
///
/// # Errors
/// If a field id is out of range or listed twice, if a mask doesn't match
/// the entry count of its field or if a listed field is a bit or string
/// field. Nothing is allocated in that case.
///
/// # Panics
/// If fields sharing a mapping are not all listed with the very same mask
/// view.
pub fn filter_field_entries(
    scene: &SceneData<'_>,
    entries_to_keep: &[(u32, BitSlice<'_>)],
) -> Result<SceneData<'static>> {
    let count = scene.field_count();

    let mut groups: BTreeMap<ViewId, MappingGroup> = BTreeMap::new();
    for id in 0..count {
        if scene.field_size(id)? == 0 {
            continue;
        }
        groups.entry(scene.mapping_id(id)?).or_default().references += 1;
    }

    let mut masks: Vec<Option<BitSlice<'_>>> = vec![None; count as usize];
    for &(id, mask) in entries_to_keep {
        if id >= count {
            log::error!("filter_field_entries: index {} out of range for {} fields", id, count);
            return Err(SceneError::FieldIndexOutOfRange { index: id, count });
        }
        if masks[id as usize].is_some() {
            log::error!("filter_field_entries: field {} listed more than once", id);
            return Err(SceneError::DuplicateField(id));
        }
        let size = scene.field_size(id)?;
        if mask.len() != size {
            log::error!(
                "filter_field_entries: expected {} bits for field {} but got {}",
                size,
                id,
                mask.len()
            );
            return Err(SceneError::EntryMaskSizeMismatch {
                field: id,
                expected: size,
                got: mask.len(),
            });
        }
        let field_type = scene.field_type(id)?;
        if !field_type.is_trivially_copyable() {
            let field = scene.field_name(id)?;
            log::error!(
                "filter_field_entries: filtering {:?} field {} is not implemented",
                field_type,
                field
            );
            return Err(SceneError::Unsupported { field, field_type });
        }
        masks[id as usize] = Some(mask);
    }

    let ty = scene.mapping_type();
    for &(id, mask) in entries_to_keep {
        if mask.is_empty() {
            continue;
        }
        let key = scene.mapping_id(id)?;
        let Some(group) = groups.get_mut(&key) else {
            continue;
        };
        group.listed += 1;
        match group.mask {
            Some(first) => assert_eq!(
                first,
                mask.id(),
                "filter_field_entries(): field {} shares a mapping filtered by another mask",
                id
            ),
            None => {
                group.mask = Some(mask.id());
                let mapping = scene.mapping(id)?;
                let mut filtered = vec![0u8; mask.count_ones() * ty.size()];
                let mut dst = StridedBytesMut::from_bytes(
                    &mut filtered,
                    mask.count_ones(),
                    ty.size(),
                    ty.size(),
                )
                .ok_or(SceneError::FieldOutOfBounds { field: id })?;
                masked_copy(mapping, mask, &mut dst);
                group.filtered = filtered;
            }
        }
    }
    for group in groups.values() {
        assert!(
            group.listed == 0 || group.listed == group.references,
            "filter_field_entries(): {} fields share a mapping but only {} of them are filtered",
            group.references,
            group.listed
        );
    }

    let mut blueprints = Vec::with_capacity(count as usize);
    for id in 0..count {
        let blueprint = scene.field_blueprint(id)?;
        let blueprint = match masks[id as usize] {
            Some(mask) if !mask.is_empty() => {
                let filtered = &groups[&scene.mapping_id(id)?].filtered;
                let view =
                    StridedBytes::from_bytes(filtered, mask.count_ones(), ty.size(), ty.size())
                        .ok_or(SceneError::FieldOutOfBounds { field: id })?;
                FieldBlueprint::placeholder(
                    blueprint.name,
                    MappingSource::View { ty, view },
                    blueprint.field_type,
                    blueprint.array_size,
                    blueprint.flags.without_implicit(),
                )
            }
            Some(_) => blueprint.with_flags(blueprint.flags.without_implicit()),
            None => blueprint,
        };
        blueprints.push(blueprint);
    }

    let mut out = combine_fields(ty, scene.mapping_bound(), &blueprints);

    for &(id, mask) in entries_to_keep {
        if mask.is_empty() {
            continue;
        }
        masked_copy(scene.field(id)?, mask, &mut out.field_mut(id)?);
    }

    log::debug!(
        "filter_field_entries: filtered {} of {} fields",
        entries_to_keep.len(),
        count
    );
    Ok(out)
}

/// Keep only entries attached to objects whose bit is set
///
/// Fields that keep all their entries are copied unchanged. References to
/// removed objects stored in field values, such as parent indices, are not
/// updated.
///
/// # Errors
/// If the mask size doesn't match the mapping bound, or any error of
/// [`filter_field_entries`].
///
/// # Panics
/// If a mapping references an object outside of the mapping bound.
pub fn filter_objects(
    scene: &SceneData<'_>,
    objects_to_keep: BitSlice<'_>,
) -> Result<SceneData<'static>> {
    let bound = scene.mapping_bound();
    if objects_to_keep.len() as u64 != bound {
        log::error!(
            "filter_objects: expected {} bits but got {}",
            bound,
            objects_to_keep.len()
        );
        return Err(SceneError::ObjectMaskSizeMismatch {
            expected: bound as usize,
            got: objects_to_keep.len(),
        });
    }

    // For each distinct mapping the index of its mask, `None` if all entries
    // are kept
    let mut computed: BTreeMap<ViewId, Option<usize>> = BTreeMap::new();
    let mut masks: Vec<BitArray> = Vec::new();
    let mut entries: Vec<(u32, usize)> = Vec::new();

    for id in 0..scene.field_count() {
        let size = scene.field_size(id)?;
        if size == 0 {
            continue;
        }

        let key = scene.mapping_id(id)?;
        if let Some(&slot) = computed.get(&key) {
            if let Some(index) = slot {
                entries.push((id, index));
            }
            continue;
        }

        let mut mask = BitArray::new(size, false);
        for (i, object) in scene.mapping_into_u64(id)?.into_iter().enumerate() {
            assert!(
                object < bound,
                "filter_objects(): object {} in field {} out of range for {} objects",
                object,
                id,
                bound
            );
            mask.set_value(i, objects_to_keep.get(object as usize));
        }

        if mask.count_ones() == size {
            computed.insert(key, None);
        } else {
            computed.insert(key, Some(masks.len()));
            entries.push((id, masks.len()));
            masks.push(mask);
        }
    }

    let entries: Vec<(u32, BitSlice<'_>)> =
        entries.iter().map(|&(id, index)| (id, masks[index].view())).collect();
    filter_field_entries(scene, &entries)
}
