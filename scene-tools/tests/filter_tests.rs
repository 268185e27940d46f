//! Scene Filtering Tests
//!
//! Tests for:
//! - Field filtering without copying data
//! - Entry filtering with compaction and shared mappings
//! - Mapping flag downgrades
//! - Empty fields next to filtered ones
//! - Object filtering feeding into single-function conversion

use scene_data::{
    BitArray, FieldBlueprint, MappingType, SceneData, SceneError, SceneField, SceneFieldFlags,
    SceneFieldType,
};
use scene_tools::{
    combine_fields, convert_to_single_function_objects, filter_except_fields, filter_field_entries,
    filter_fields, filter_objects,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parents, meshes and materials sharing a mapping, and implicit lights
fn build() -> SceneData<'static> {
    let parent_mapping = [0u32, 1, 2, 3];
    let parents = [-1i16, 0, 1, 1];
    let mesh_mapping = [1u32, 2, 2, 3];
    let meshes = [5u16, 6, 7, 8];
    let materials = [0i8, 1, -1, 2];
    let light_mapping = [0u32, 1, 2, 3];
    let lights = [1.0f32, 0.5, 0.25, 0.125];

    let fields = [
        FieldBlueprint::from_slices(
            SceneField::PARENT,
            &parent_mapping,
            &parents,
            SceneFieldFlags::IMPLICIT_MAPPING,
        ),
        FieldBlueprint::from_slices(
            SceneField::MESH,
            &mesh_mapping,
            &meshes,
            SceneFieldFlags::ORDERED_MAPPING,
        ),
        FieldBlueprint::from_slices(
            SceneField::MESH_MATERIAL,
            &mesh_mapping,
            &materials,
            SceneFieldFlags::ORDERED_MAPPING,
        ),
        FieldBlueprint::from_slices(
            SceneField::LIGHT,
            &light_mapping,
            &lights,
            SceneFieldFlags::IMPLICIT_MAPPING,
        ),
    ];
    combine_fields(MappingType::U32, 4, &fields)
}

/// The scene above plus an empty custom field with an implicit mapping
fn with_empty_field() -> SceneData<'static> {
    let scene = build();
    let empty_mapping: [u32; 0] = [];
    let empty: [u64; 0] = [];
    let mut fields = scene.field_blueprints();
    fields.push(FieldBlueprint::from_slices(
        SceneField::custom(7),
        &empty_mapping,
        &empty,
        SceneFieldFlags::IMPLICIT_MAPPING,
    ));
    combine_fields(MappingType::U32, 4, &fields)
}

// ============================================================================
// Field filtering
// ============================================================================

#[test]
fn filter_all_fields_changes_nothing() {
    let scene = build();
    let data = scene.data().as_ptr();
    let mappings: Vec<_> = (0..4).map(|id| scene.mapping_id(id).unwrap()).collect();
    let layouts = scene.fields().to_vec();

    let filtered = filter_fields(scene, BitArray::new(4, true).view()).unwrap();
    assert_eq!(filtered.data().as_ptr(), data);
    assert_eq!(filtered.fields(), &layouts[..]);
    for (id, mapping) in mappings.into_iter().enumerate() {
        assert_eq!(filtered.mapping_id(id as u32).unwrap(), mapping);
    }
}

#[test]
fn filter_fields_rejects_wrong_mask_size() {
    init_logger();
    let scene = build();
    for len in [0, 1, 3, 5, 8] {
        assert_eq!(
            filter_fields(scene.borrow(), BitArray::new(len, true).view()).unwrap_err(),
            SceneError::FieldMaskSizeMismatch { expected: 4, got: len }
        );
    }
}

#[test]
fn filter_fields_keeps_shared_mappings_shared() {
    let scene = build();
    let filtered = filter_except_fields(
        scene.borrow(),
        &[SceneField::PARENT, SceneField::LIGHT],
    )
    .unwrap();

    assert_eq!(filtered.field_count(), 2);
    assert_eq!(filtered.mapping_id(0).unwrap(), filtered.mapping_id(1).unwrap());
    assert_eq!(filtered.mapping_id(0).unwrap(), scene.mapping_id(1).unwrap());
    assert_eq!(filtered.field_flags(0).unwrap(), SceneFieldFlags::ORDERED_MAPPING);
}

// ============================================================================
// Entry filtering
// ============================================================================

#[test]
fn filter_entries_compacts_kept_entries() {
    let mapping = [0u16, 1, 2];
    let values = [10u64, 20, 30];
    let fields = [FieldBlueprint::from_slices(
        SceneField::custom(3),
        &mapping,
        &values,
        SceneFieldFlags::empty(),
    )];
    let scene = combine_fields(MappingType::U16, 3, &fields);

    let mask = BitArray::from_bools(&[true, false, true]);
    let filtered = filter_field_entries(&scene, &[(0, mask.view())]).unwrap();
    assert_eq!(filtered.mapping_as_array(0).unwrap(), vec![0, 2]);
    assert_eq!(filtered.field_as::<u64>(0).unwrap(), vec![10, 30]);
}

#[test]
fn filter_entries_downgrades_implicit_mapping() {
    let scene = build();
    let all = BitArray::new(4, true);
    let filtered = filter_field_entries(&scene, &[(3, all.view())]).unwrap();

    // Nothing got removed but the flag is downgraded anyway
    assert_eq!(filtered.field_as::<f32>(3).unwrap(), vec![1.0, 0.5, 0.25, 0.125]);
    assert_eq!(filtered.field_flags(3).unwrap(), SceneFieldFlags::ORDERED_MAPPING);

    // Fields that weren't listed keep theirs
    assert_eq!(filtered.field_flags(0).unwrap(), SceneFieldFlags::IMPLICIT_MAPPING);
    assert_eq!(filtered.field_flags(1).unwrap(), SceneFieldFlags::ORDERED_MAPPING);
}

#[test]
fn filter_entries_of_shared_mapping() {
    init_logger();
    let scene = build();
    let mask = BitArray::from_bools(&[false, true, true, false]);
    let filtered = filter_field_entries(&scene, &[(2, mask.view()), (1, mask.view())]).unwrap();

    assert_eq!(filtered.mapping_as_array(1).unwrap(), vec![2, 2]);
    assert_eq!(filtered.field_as::<u16>(1).unwrap(), vec![6, 7]);
    assert_eq!(filtered.field_as::<i8>(2).unwrap(), vec![1, -1]);
    assert_eq!(filtered.mapping_id(1).unwrap(), filtered.mapping_id(2).unwrap());
    assert_eq!(filtered.field_size(3).unwrap(), 4);
}

#[test]
fn filter_entries_of_strings_is_unsupported() {
    init_logger();
    let mapping = [0u8, 1];
    let ranges = [[0u32, 3], [3, 5]];
    let fields = [FieldBlueprint::strings_from(
        SceneField::custom(1),
        &mapping,
        &ranges,
        b"onetwoxx",
        SceneFieldFlags::empty(),
    )];
    let scene = combine_fields(MappingType::U8, 2, &fields);

    let mask = BitArray::new(2, true);
    assert_eq!(
        filter_field_entries(&scene, &[(0, mask.view())]).unwrap_err(),
        SceneError::Unsupported {
            field: SceneField::custom(1),
            field_type: SceneFieldType::StringRange32,
        }
    );
}

#[test]
fn filter_entries_of_empty_field() {
    let scene = with_empty_field();
    let empty = BitArray::new(0, false);
    let filtered = filter_field_entries(&scene, &[(4, empty.view())]).unwrap();

    assert_eq!(filtered.field_count(), 5);
    assert_eq!(filtered.field_size(4).unwrap(), 0);
    assert_eq!(filtered.field_flags(4).unwrap(), SceneFieldFlags::ORDERED_MAPPING);
    assert_eq!(filtered.field_flags(3).unwrap(), SceneFieldFlags::IMPLICIT_MAPPING);
    assert_eq!(filtered.mapping_id(1).unwrap(), filtered.mapping_id(2).unwrap());
}

// ============================================================================
// Object filtering
// ============================================================================

#[test]
fn filter_objects_keeps_parent_values() {
    let scene = build();
    let keep = BitArray::from_indices(4, &[0, 2, 3]);
    let filtered = filter_objects(&scene, keep.view()).unwrap();

    // Object 1 is gone but objects 2 and 3 still reference it
    assert_eq!(filtered.parents_as_array().unwrap(), vec![(0, -1), (2, 1), (3, 1)]);
    assert_eq!(filtered.mapping_as_array(1).unwrap(), vec![2, 2, 3]);
    assert_eq!(filtered.field_as::<u16>(1).unwrap(), vec![6, 7, 8]);
    assert_eq!(filtered.mapping_id(1).unwrap(), filtered.mapping_id(2).unwrap());
    assert_eq!(filtered.field_flags(3).unwrap(), SceneFieldFlags::ORDERED_MAPPING);
}

#[test]
fn filter_objects_passes_empty_field_through() {
    init_logger();
    let scene = with_empty_field();
    let keep = BitArray::from_indices(4, &[0, 1, 3]);
    let filtered = filter_objects(&scene, keep.view()).unwrap();

    // The shared mesh mapping loses both entries of object 2
    assert_eq!(filtered.mapping_as_array(1).unwrap(), vec![1, 3]);
    assert_eq!(filtered.field_as::<i8>(2).unwrap(), vec![0, 2]);
    assert_eq!(filtered.mapping_id(1).unwrap(), filtered.mapping_id(2).unwrap());

    assert_eq!(filtered.field_name(4).unwrap(), SceneField::custom(7));
    assert_eq!(filtered.field_size(4).unwrap(), 0);
    assert_eq!(filtered.field_type(4).unwrap(), SceneFieldType::U64);
    assert_eq!(filtered.field_flags(4).unwrap(), SceneFieldFlags::IMPLICIT_MAPPING);
}

#[test]
fn filter_objects_then_convert() {
    init_logger();
    let scene = build();
    let keep = BitArray::from_indices(4, &[0, 1, 2]);
    let filtered = filter_objects(&scene, keep.view()).unwrap();
    let converted = convert_to_single_function_objects(
        &filtered,
        &[SceneField::MESH],
        &[],
        4,
    )
    .unwrap();

    // Object 2 had two meshes
    assert_eq!(converted.mapping_bound(), 5);
    assert_eq!(converted.mapping_as_array(1).unwrap(), vec![1, 2, 4]);
    assert_eq!(converted.mapping_as_array(2).unwrap(), vec![1, 2, 4]);
    assert_eq!(converted.children_for(2).unwrap(), vec![4]);
    assert_eq!(converted.field_as::<i8>(2).unwrap(), vec![0, 1, -1]);
}
