//! Single-function object conversion
//!
//! Makes every object carry at most one of a given set of fields. Extra
//! occurrences are moved to newly added objects, which become children of
//! the object they were taken from.

use crate::combine::combine_fields;
use std::collections::BTreeSet;
use scene_data::{
    read_index, write_index, FieldBlueprint, MappingSource, MappingType, Result, SceneData,
    SceneError, SceneField, SceneFieldType,
};

/// Move fields so each object has at most one of `fields_to_convert`
///
/// Objects with more than one entry of the fields in `fields_to_convert`
/// keep the first one, every further entry is reassigned to a new object
/// with an index starting at `new_object_offset`, parented to the original.
/// Fields sharing a mapping with a converted field follow it. Listing more
/// than one field of such a group converts the shared mapping once. Entries
/// of `fields_to_copy`
/// attached to the original object are duplicated to each new child. Fields
/// not present in the scene are skipped in both lists.
///
/// The output has a 32-bit mapping and a 32-bit parent field. An implicit
/// parent mapping becomes ordered, all other fields lose their mapping
/// flags, even those that end up untouched.
///
/// # Errors
/// If the parent field isn't a signed integer or a field to copy is a bit
/// or string field.
///
/// # Panics
/// If the scene has no parent field, if the parent field is listed, if a
/// field is listed in both lists or if the new objects don't fit into 32
/// bits.
pub fn convert_to_single_function_objects(
    scene: &SceneData<'_>,
    fields_to_convert: &[SceneField],
    fields_to_copy: &[SceneField],
    new_object_offset: u32,
) -> Result<SceneData<'static>> {
    let Some(parent_id) = scene.find_field_id(SceneField::PARENT) else {
        panic!("convert_to_single_function_objects(): the scene has no parent field");
    };
    let bound = scene.mapping_bound();

    // Converted fields with distinct mappings, in list order
    let mut seen_mappings = BTreeSet::new();
    let mut convert_ids = Vec::with_capacity(fields_to_convert.len());
    for &name in fields_to_convert {
        assert!(
            name != SceneField::PARENT,
            "convert_to_single_function_objects(): the parent field can't be converted"
        );
        let Some(id) = scene.find_field_id(name) else {
            continue;
        };
        if seen_mappings.insert(scene.mapping_id(id)?) {
            convert_ids.push(id);
        }
    }

    let mut attachments = vec![0u32; bound as usize];
    for &id in &convert_ids {
        for object in scene.mapping_into_u64(id)? {
            assert!(
                object < bound,
                "convert_to_single_function_objects(): object {} out of range for {} objects",
                object,
                bound
            );
            attachments[object as usize] += 1;
        }
    }

    // Entries appended to each field to copy
    let mut copy_additions = vec![0usize; fields_to_copy.len()];
    for (i, &name) in fields_to_copy.iter().enumerate() {
        assert!(
            name != SceneField::PARENT,
            "convert_to_single_function_objects(): the parent field can't be copied"
        );
        assert!(
            !fields_to_convert.contains(&name),
            "convert_to_single_function_objects(): field {} is both converted and copied",
            name
        );
        let Some(id) = scene.find_field_id(name) else {
            continue;
        };
        let field_type = scene.field_type(id)?;
        if !field_type.is_trivially_copyable() {
            log::error!(
                "convert_to_single_function_objects: copying {:?} field {} is not implemented",
                field_type,
                name
            );
            return Err(SceneError::Unsupported { field: name, field_type });
        }
        for object in scene.mapping_into_u64(id)? {
            assert!(
                object < bound,
                "convert_to_single_function_objects(): object {} out of range for {} objects",
                object,
                bound
            );
            let count = attachments[object as usize] as usize;
            if count > 1 {
                copy_additions[i] += count - 1;
            }
        }
    }

    let objects_to_add: u64 = attachments
        .iter()
        .filter(|&&count| count > 1)
        .map(|&count| u64::from(count - 1))
        .sum();
    assert!(
        u64::from(new_object_offset) + objects_to_add <= u64::from(u32::MAX),
        "convert_to_single_function_objects(): {} new objects at offset {} don't fit into 32 bits",
        objects_to_add,
        new_object_offset
    );
    let objects_to_add = objects_to_add as usize;

    // Enlarge the parent field and the fields to copy, keep the rest
    let parents = scene.parents_as_array()?;
    let mut blueprints = Vec::with_capacity(scene.field_count() as usize);
    for id in 0..scene.field_count() {
        let field = scene.field_blueprint(id)?;
        let blueprint = if id == parent_id {
            FieldBlueprint::placeholder(
                SceneField::PARENT,
                MappingSource::Placeholder(parents.len() + objects_to_add),
                SceneFieldType::I32,
                0,
                field.flags.without_implicit(),
            )
        } else if let Some(i) = fields_to_copy.iter().position(|&name| name == field.name) {
            FieldBlueprint::placeholder(
                field.name,
                MappingSource::Placeholder(field.size() + copy_additions[i]),
                field.field_type,
                field.array_size,
                field.flags.without_mapping_guarantees(),
            )
        } else {
            field.with_flags(field.flags.without_mapping_guarantees())
        };
        blueprints.push(blueprint);
    }

    let new_bound = bound.max(u64::from(new_object_offset) + objects_to_add as u64);
    let mut out = combine_fields(MappingType::U32, new_bound, &blueprints);

    // Reassign extra entries to new objects, collecting copied entries on
    // the way
    let mut new_parents = vec![-1i32; objects_to_add];
    let mut copied: Vec<(Vec<u64>, Vec<u8>)> = vec![(Vec::new(), Vec::new()); fields_to_copy.len()];
    attachments.fill(0);
    let mut next = 0;
    for &id in &convert_ids {
        let mut mapping = out.mapping_mut(id)?;
        for entry in 0..mapping.len() {
            let object = read_index(mapping.get_mut(entry), MappingType::U32);
            // Already a new object
            if object >= bound {
                continue;
            }
            if attachments[object as usize] == 0 {
                attachments[object as usize] += 1;
                continue;
            }

            let new_object = u64::from(new_object_offset) + next as u64;
            for (i, &copy_name) in fields_to_copy.iter().enumerate() {
                let Some(copy_id) = scene.find_field_id(copy_name) else {
                    continue;
                };
                let src = scene.field(copy_id)?;
                let mut offset = 0;
                while let Some(found) = scene.find_field_object_offset(copy_id, object, offset)? {
                    copied[i].0.push(new_object);
                    copied[i].1.extend_from_slice(src.get(found));
                    offset = found + 1;
                }
            }

            new_parents[next] = object as i32;
            write_index(mapping.get_mut(entry), MappingType::U32, new_object);
            next += 1;
        }
    }
    assert_eq!(
        next, objects_to_add,
        "convert_to_single_function_objects(): expected to add {} objects",
        objects_to_add
    );

    // Original parents first, new objects after
    {
        let mut mapping = out.mapping_mut(parent_id)?;
        let new_objects = (0..objects_to_add).map(|i| u64::from(new_object_offset) + i as u64);
        let objects = parents.iter().map(|&(object, _)| u64::from(object)).chain(new_objects);
        for (entry, object) in objects.enumerate() {
            write_index(mapping.get_mut(entry), MappingType::U32, object);
        }
    }
    {
        let mut data = out.field_mut(parent_id)?;
        let values = parents.iter().map(|&(_, parent)| parent).chain(new_parents);
        for (entry, parent) in values.enumerate() {
            data.write(entry, parent);
        }
    }

    for (i, &name) in fields_to_copy.iter().enumerate() {
        let Some(id) = scene.find_field_id(name) else {
            continue;
        };
        let (objects, values) = &copied[i];
        assert_eq!(
            objects.len(),
            copy_additions[i],
            "convert_to_single_function_objects(): expected {} copies of {}",
            copy_additions[i],
            name
        );

        let size = scene.field_size(id)?;
        {
            let mut mapping = out.mapping_mut(id)?;
            let all_objects =
                scene.mapping_into_u64(id)?.into_iter().chain(objects.iter().copied());
            for (entry, object) in all_objects.enumerate() {
                write_index(mapping.get_mut(entry), MappingType::U32, object);
            }
        }
        let src = scene.field(id)?;
        let mut data = out.field_mut(id)?;
        for entry in 0..size {
            data.set(entry, src.get(entry));
        }
        for (j, value) in values.chunks_exact(src.element_size()).enumerate() {
            data.set(size + j, value);
        }
    }

    log::debug!(
        "convert_to_single_function_objects: added {} objects at offset {}",
        objects_to_add,
        new_object_offset
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_data::SceneFieldFlags;

    fn build(parent_flags: SceneFieldFlags) -> SceneData<'static> {
        let parent_mapping = [0u8, 1, 2];
        let parents = [-1i8, 0, 0];
        let mesh_mapping = [1u8, 1, 2, 1];
        let meshes = [4u16, 5, 6, 7];
        let fields = [
            FieldBlueprint::from_slices(
                SceneField::PARENT,
                &parent_mapping,
                &parents,
                parent_flags,
            ),
            FieldBlueprint::from_slices(
                SceneField::MESH,
                &mesh_mapping,
                &meshes,
                SceneFieldFlags::ORDERED_MAPPING,
            ),
        ];
        combine_fields(MappingType::U8, 3, &fields)
    }

    #[test]
    fn test_split() {
        let scene = build(SceneFieldFlags::IMPLICIT_MAPPING);
        let out = convert_to_single_function_objects(&scene, &[SceneField::MESH], &[], 10).unwrap();

        assert_eq!(out.mapping_type(), MappingType::U32);
        assert_eq!(out.mapping_bound(), 12);
        assert_eq!(out.field_type(0).unwrap(), SceneFieldType::I32);
        assert_eq!(
            out.parents_as_array().unwrap(),
            vec![(0, -1), (1, 0), (2, 0), (10, 1), (11, 1)]
        );
        assert_eq!(out.field_flags(0).unwrap(), SceneFieldFlags::ORDERED_MAPPING);
        assert_eq!(out.mapping_as_array(1).unwrap(), vec![1, 10, 2, 11]);
        assert_eq!(out.field_as::<u16>(1).unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(out.field_flags(1).unwrap(), SceneFieldFlags::empty());
    }

    #[test]
    fn test_nothing_to_split() {
        let scene = build(SceneFieldFlags::empty());
        let out = convert_to_single_function_objects(
            &scene,
            &[SceneField::CAMERA],
            &[SceneField::SKIN],
            10,
        )
        .unwrap();
        // The bound covers the offset even if no objects got added
        assert_eq!(out.mapping_bound(), 10);
        assert_eq!(out.parents_as_array().unwrap(), vec![(0, -1), (1, 0), (2, 0)]);
        assert_eq!(out.mapping_as_array(1).unwrap(), vec![1, 1, 2, 1]);
    }

    #[test]
    fn test_shared_mapping_listed_twice() {
        let parent_mapping = [0u8, 1, 2];
        let parents = [-1i8, 0, 0];
        let mesh_mapping = [1u8, 1, 2, 1];
        let meshes = [4u16, 5, 6, 7];
        let materials = [0i8, 1, 2, 3];
        let fields = [
            FieldBlueprint::from_slices(
                SceneField::PARENT,
                &parent_mapping,
                &parents,
                SceneFieldFlags::empty(),
            ),
            FieldBlueprint::from_slices(
                SceneField::MESH,
                &mesh_mapping,
                &meshes,
                SceneFieldFlags::empty(),
            ),
            FieldBlueprint::from_slices(
                SceneField::MESH_MATERIAL,
                &mesh_mapping,
                &materials,
                SceneFieldFlags::empty(),
            ),
        ];
        let scene = combine_fields(MappingType::U8, 3, &fields);

        let out = convert_to_single_function_objects(
            &scene,
            &[SceneField::MESH, SceneField::MESH_MATERIAL, SceneField::MESH],
            &[],
            3,
        )
        .unwrap();
        assert_eq!(out.mapping_bound(), 5);
        assert_eq!(out.mapping_as_array(1).unwrap(), vec![1, 3, 2, 4]);
        assert_eq!(out.mapping_id(1).unwrap(), out.mapping_id(2).unwrap());
        assert_eq!(out.field_as::<i8>(2).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(
            out.parents_as_array().unwrap(),
            vec![(0, -1), (1, 0), (2, 0), (3, 1), (4, 1)]
        );
    }

    #[test]
    #[should_panic(expected = "no parent field")]
    fn test_no_parent() {
        let mapping = [0u8];
        let meshes = [1u32];
        let fields = [FieldBlueprint::from_slices(
            SceneField::MESH,
            &mapping,
            &meshes,
            SceneFieldFlags::empty(),
        )];
        let scene = combine_fields(MappingType::U8, 1, &fields);
        let _ = convert_to_single_function_objects(&scene, &[SceneField::MESH], &[], 1);
    }

    #[test]
    #[should_panic(expected = "can't be converted")]
    fn test_parent_converted() {
        let scene = build(SceneFieldFlags::empty());
        let _ = convert_to_single_function_objects(&scene, &[SceneField::PARENT], &[], 10);
    }

    #[test]
    #[should_panic(expected = "both converted and copied")]
    fn test_field_in_both_lists() {
        let scene = build(SceneFieldFlags::empty());
        let _ = convert_to_single_function_objects(
            &scene,
            &[SceneField::MESH],
            &[SceneField::MESH],
            10,
        );
    }

    #[test]
    #[should_panic(expected = "don't fit into 32 bits")]
    fn test_offset_overflow() {
        let scene = build(SceneFieldFlags::empty());
        let _ = convert_to_single_function_objects(&scene, &[SceneField::MESH], &[], u32::MAX - 1);
    }
}
