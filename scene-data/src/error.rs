//! Recoverable scene errors
//!
//! Caller mistakes that can be detected up front are reported through
//! [`SceneError`]. Broken cross-field invariants of a table are not errors
//! but panics.

use crate::types::{MappingType, SceneField, SceneFieldType};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("index {index} out of range for {count} fields")]
    FieldIndexOutOfRange { index: u32, count: u32 },

    #[error("field {0} not found")]
    FieldNotFound(SceneField),

    #[error("expected {expected} bits but got {got}")]
    FieldMaskSizeMismatch { expected: usize, got: usize },

    #[error("expected {expected} bits for field {field} but got {got}")]
    EntryMaskSizeMismatch { field: u32, expected: usize, got: usize },

    #[error("expected {expected} bits but got {got}")]
    ObjectMaskSizeMismatch { expected: usize, got: usize },

    #[error("field {0} listed more than once")]
    DuplicateField(u32),

    #[error("filtering {field_type:?} field {field} is not supported")]
    Unsupported { field: SceneField, field_type: SceneFieldType },

    #[error("the data are not mutable")]
    NotMutable,

    #[error("field {field} is {got:?} but {expected:?} was requested")]
    FieldTypeMismatch {
        field: SceneField,
        expected: SceneFieldType,
        got: SceneFieldType,
    },

    #[error("field {field} doesn't fit into the data")]
    FieldOutOfBounds { field: u32 },

    #[error("field {field} of type {field_type:?} has a layout for a different kind of data")]
    LayoutMismatch { field: u32, field_type: SceneFieldType },

    #[error("field {field} mapping is {got:?} but the scene uses {expected:?}")]
    MappingTypeMismatch {
        field: u32,
        expected: MappingType,
        got: MappingType,
    },
}

pub type Result<T> = std::result::Result<T, SceneError>;
