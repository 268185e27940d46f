//! Scene Data - columnar scene tables
//!
//! A scene is a set of named fields, each a list of entries attaching a value
//! to an object index. All fields of a scene live in a single contiguous
//! buffer and may share their object mapping with other fields.
//!
//! Key properties:
//! - One allocation per scene, fields are offsets into it
//! - Width-agnostic strided views over mappings and values
//! - Owned and borrowed tables with the same read API

pub mod bits;
pub mod error;
pub mod field;
pub mod scene;
pub mod types;
pub mod view;

pub use bits::*;
pub use error::*;
pub use field::*;
pub use scene::*;
pub use types::*;
pub use view::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_type_fits_bound() {
        assert!(MappingType::for_bound(64).max() >= 63);
        assert_eq!(MappingType::U32.size(), SceneFieldType::U32.size());
    }
}
