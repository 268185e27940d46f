//! Scene table type definitions
//!
//! Mapping index widths, field names, per-entry value types and mapping
//! flags. The numeric values of [`SceneField`] are a stable namespace:
//! built-in names are small integers, custom names start at
//! [`SceneField::CUSTOM_BASE`].

use bitflags::bitflags;
use bytemuck::Pod;
use std::fmt;

/// Integer width used to store object indices
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MappingType {
    U8 = 1,
    U16 = 2,
    U32 = 3,
    U64 = 4,
}

impl MappingType {
    /// Size of one mapping entry in bytes
    pub fn size(self) -> usize {
        match self {
            MappingType::U8 => 1,
            MappingType::U16 => 2,
            MappingType::U32 => 4,
            MappingType::U64 => 8,
        }
    }

    pub fn alignment(self) -> usize {
        self.size()
    }

    /// Largest object index representable in this width
    pub fn max(self) -> u64 {
        match self {
            MappingType::U8 => u8::MAX as u64,
            MappingType::U16 => u16::MAX as u64,
            MappingType::U32 => u32::MAX as u64,
            MappingType::U64 => u64::MAX,
        }
    }

    /// Smallest width able to index objects `0..bound`
    pub fn for_bound(bound: u64) -> Self {
        if bound <= u8::MAX as u64 + 1 {
            MappingType::U8
        } else if bound <= u16::MAX as u64 + 1 {
            MappingType::U16
        } else if bound <= u32::MAX as u64 + 1 {
            MappingType::U32
        } else {
            MappingType::U64
        }
    }
}

/// Field name
///
/// A newtype over the raw numeric id rather than an enum so custom fields
/// can be represented without an allocation or a catch-all variant.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SceneField(u32);

impl SceneField {
    /// Parent index, a signed integer where `-1` means a root object
    pub const PARENT: Self = Self(1);
    pub const TRANSFORMATION: Self = Self(2);
    pub const TRANSLATION: Self = Self(3);
    pub const ROTATION: Self = Self(4);
    pub const SCALING: Self = Self(5);
    pub const MESH: Self = Self(6);
    pub const MESH_MATERIAL: Self = Self(7);
    pub const LIGHT: Self = Self(8);
    pub const CAMERA: Self = Self(9);
    pub const SKIN: Self = Self(10);
    pub const IMPORTER_STATE: Self = Self(11);

    /// First numeric id of the custom field range
    pub const CUSTOM_BASE: u32 = 0x8000_0000;

    /// Custom field with given id
    ///
    /// # Panics
    /// If `id` doesn't fit below the custom range size, which would make it
    /// wrap into the built-in range.
    pub const fn custom(id: u32) -> Self {
        assert!(id < Self::CUSTOM_BASE, "SceneField::custom(): id too large");
        Self(Self::CUSTOM_BASE + id)
    }

    pub const fn is_custom(self) -> bool {
        self.0 >= Self::CUSTOM_BASE
    }

    pub const fn custom_id(self) -> Option<u32> {
        if self.is_custom() {
            Some(self.0 - Self::CUSTOM_BASE)
        } else {
            None
        }
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn builtin_name(self) -> Option<&'static str> {
        Some(match self {
            Self::PARENT => "Parent",
            Self::TRANSFORMATION => "Transformation",
            Self::TRANSLATION => "Translation",
            Self::ROTATION => "Rotation",
            Self::SCALING => "Scaling",
            Self::MESH => "Mesh",
            Self::MESH_MATERIAL => "MeshMaterial",
            Self::LIGHT => "Light",
            Self::CAMERA => "Camera",
            Self::SKIN => "Skin",
            Self::IMPORTER_STATE => "ImporterState",
            _ => return None,
        })
    }
}

impl fmt::Display for SceneField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = self.custom_id() {
            write!(f, "Custom({})", id)
        } else if let Some(name) = self.builtin_name() {
            f.write_str(name)
        } else {
            write!(f, "({:#x})", self.0)
        }
    }
}

impl fmt::Debug for SceneField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneField::{}", self)
    }
}

/// Type of a single field element
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneFieldType {
    U8 = 1,
    I8 = 2,
    U16 = 3,
    I16 = 4,
    U32 = 5,
    I32 = 6,
    U64 = 7,
    I64 = 8,
    F32 = 9,
    F64 = 10,
    Vector2 = 11,
    Vector3 = 12,
    Vector4 = 13,
    Vector2d = 14,
    Vector3d = 15,
    Vector4d = 16,
    Vector2i = 17,
    Vector3i = 18,
    Vector4i = 19,
    Vector2ui = 20,
    Vector3ui = 21,
    Vector4ui = 22,
    Matrix3x3 = 23,
    Matrix4x4 = 24,
    Matrix3x3d = 25,
    Matrix4x4d = 26,
    Quaternion = 27,
    Quaterniond = 28,
    DualQuaternion = 29,
    /// Opaque pointer-sized value, e.g. importer state
    Pointer = 30,
    /// One bit per element, packed
    Bit = 31,
    /// `(u32 offset, u32 size)` byte range into the field's string blob
    StringRange32 = 32,
}

impl SceneFieldType {
    /// Size of one element in bytes, zero for [`SceneFieldType::Bit`]
    pub fn size(self) -> usize {
        use SceneFieldType::*;
        match self {
            U8 | I8 => 1,
            U16 | I16 => 2,
            U32 | I32 | F32 => 4,
            U64 | I64 | F64 | Vector2 | Vector2i | Vector2ui | StringRange32 => 8,
            Vector3 | Vector3i | Vector3ui => 12,
            Vector4 | Vector4i | Vector4ui | Vector2d | Quaternion => 16,
            Vector3d => 24,
            Vector4d | Quaterniond | DualQuaternion => 32,
            Matrix3x3 => 36,
            Matrix4x4 => 64,
            Matrix3x3d => 72,
            Matrix4x4d => 128,
            Pointer => std::mem::size_of::<usize>(),
            Bit => 0,
        }
    }

    pub fn alignment(self) -> usize {
        use SceneFieldType::*;
        match self {
            U8 | I8 | Bit => 1,
            U16 | I16 => 2,
            U32 | I32 | F32 | Vector2 | Vector3 | Vector4 | Vector2i | Vector3i | Vector4i
            | Vector2ui | Vector3ui | Vector4ui | Matrix3x3 | Matrix4x4 | Quaternion
            | DualQuaternion | StringRange32 => 4,
            U64 | I64 | F64 | Vector2d | Vector3d | Vector4d | Matrix3x3d | Matrix4x4d
            | Quaterniond => 8,
            Pointer => std::mem::align_of::<usize>(),
        }
    }

    pub fn is_bit(self) -> bool {
        self == SceneFieldType::Bit
    }

    pub fn is_string(self) -> bool {
        self == SceneFieldType::StringRange32
    }

    /// Whether entries can be moved around as plain fixed-size byte blocks
    pub fn is_trivially_copyable(self) -> bool {
        !self.is_bit() && !self.is_string()
    }
}

bitflags! {
    /// Claims about a field's mapping that consumers are allowed to rely on
    ///
    /// `IMPLICIT_MAPPING` includes the `ORDERED_MAPPING` bit, as an implicit
    /// mapping is always ordered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SceneFieldFlags: u8 {
        /// Mapping values are non-decreasing
        const ORDERED_MAPPING = 1 << 0;
        /// Mapping is exactly `0, 1, 2, ..., size - 1`
        const IMPLICIT_MAPPING = (1 << 1) | Self::ORDERED_MAPPING.bits();
    }
}

impl SceneFieldFlags {
    /// Implicit mapping becomes ordered, everything else is kept
    pub fn without_implicit(self) -> Self {
        self.difference(Self::IMPLICIT_MAPPING.difference(Self::ORDERED_MAPPING))
    }

    /// Drops both the implicit and ordered claims
    pub fn without_mapping_guarantees(self) -> Self {
        self.difference(Self::IMPLICIT_MAPPING)
    }
}

/// Integer type usable as an object mapping
pub trait MappingIndex: Pod {
    const TYPE: MappingType;
}

macro_rules! impl_mapping_index {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl MappingIndex for $t {
            const TYPE: MappingType = MappingType::$variant;
        })*
    };
}

impl_mapping_index!(u8 => U8, u16 => U16, u32 => U32, u64 => U64);

/// Plain-old-data type with a matching [`SceneFieldType`]
pub trait FieldValue: Pod {
    const TYPE: SceneFieldType;
}

macro_rules! impl_field_value {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl FieldValue for $t {
            const TYPE: SceneFieldType = SceneFieldType::$variant;
        })*
    };
}

impl_field_value!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    [f32; 2] => Vector2,
    [f32; 3] => Vector3,
    [f32; 4] => Vector4,
    [f64; 2] => Vector2d,
    [f64; 3] => Vector3d,
    [f64; 4] => Vector4d,
    [i32; 2] => Vector2i,
    [i32; 3] => Vector3i,
    [i32; 4] => Vector4i,
    [u32; 2] => Vector2ui,
    [u32; 3] => Vector3ui,
    [u32; 4] => Vector4ui,
    [[f32; 3]; 3] => Matrix3x3,
    [[f32; 4]; 4] => Matrix4x4,
    [[f64; 3]; 3] => Matrix3x3d,
    [[f64; 4]; 4] => Matrix4x4d,
);
