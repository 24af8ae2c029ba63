//! Fields of a loaded class and the categories the layout engine packs them by.

use bitflags::bitflags;

use crate::{
    macros::see_jvm_spec,
    symbols::Symbol,
    types::field_type::{FieldType, PrimitiveType},
};

bitflags! {
    /// The access flags of a field.
    #[doc = see_jvm_spec!(4, 5)]
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
    pub struct FieldAccessFlags: u16 {
        /// Declared `public`; may be accessed from outside its package.
        const PUBLIC = 0x0001;
        /// Declared `private`; accessible only within the defining class and other classes belonging to the same nest.
        const PRIVATE = 0x0002;
        /// Declared `protected`; may be accessed within subclasses.
        const PROTECTED = 0x0004;
        /// Declared `static`.
        const STATIC = 0x0008;
        /// Declared `final`; never directly assigned to after object construction.
        const FINAL = 0x0010;
        /// Declared `volatile`; cannot be cached.
        const VOLATILE = 0x0040;
        /// Declared `transient`; not written or read by a persistent object manager.
        const TRANSIENT = 0x0080;
        /// Declared synthetic; not present in the source code.
        const SYNTHETIC = 0x1000;
        /// Declared as an element of an `enum` class.
        const ENUM = 0x4000;
    }
}

/// Where a field is stored and how large it is, as far as layout is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum FieldAllocationType {
    /// A static reference.
    StaticOop,
    /// A static `boolean` or `byte`.
    StaticByte,
    /// A static `char` or `short`.
    StaticShort,
    /// A static `int` or `float`.
    StaticWord,
    /// A static `long` or `double`.
    StaticDouble,
    /// An instance reference.
    NonstaticOop,
    /// An instance `boolean` or `byte`.
    NonstaticByte,
    /// An instance `char` or `short`.
    NonstaticShort,
    /// An instance `int` or `float`.
    NonstaticWord,
    /// An instance `long` or `double`.
    NonstaticDouble,
}

impl FieldAllocationType {
    /// All allocation types, in the order of [`FieldAllocationType::index`].
    pub const ALL: [Self; 10] = [
        Self::StaticOop,
        Self::StaticByte,
        Self::StaticShort,
        Self::StaticWord,
        Self::StaticDouble,
        Self::NonstaticOop,
        Self::NonstaticByte,
        Self::NonstaticShort,
        Self::NonstaticWord,
        Self::NonstaticDouble,
    ];

    /// Categorises a field by its type and static-ness.
    #[must_use]
    pub const fn new(field_type: &FieldType, is_static: bool) -> Self {
        match (field_type, is_static) {
            (FieldType::Object(_) | FieldType::Array(_), true) => Self::StaticOop,
            (FieldType::Object(_) | FieldType::Array(_), false) => Self::NonstaticOop,
            (FieldType::Base(primitive), _) => {
                let size = primitive.size_in_bytes();
                match (size, is_static) {
                    (1, true) => Self::StaticByte,
                    (2, true) => Self::StaticShort,
                    (4, true) => Self::StaticWord,
                    (_, true) => Self::StaticDouble,
                    (1, false) => Self::NonstaticByte,
                    (2, false) => Self::NonstaticShort,
                    (4, false) => Self::NonstaticWord,
                    (_, false) => Self::NonstaticDouble,
                }
            }
        }
    }

    /// Returns the position of this type in [`FieldAllocationType::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns `true` for the static categories.
    #[must_use]
    pub const fn is_static(self) -> bool {
        matches!(
            self,
            Self::StaticOop
                | Self::StaticByte
                | Self::StaticShort
                | Self::StaticWord
                | Self::StaticDouble
        )
    }

    /// Returns `true` for the reference categories.
    #[must_use]
    pub const fn is_oop(self) -> bool {
        matches!(self, Self::StaticOop | Self::NonstaticOop)
    }

    /// Returns the size of a field of this category on a heap with `heap_oop_size` byte
    /// references.
    #[must_use]
    pub const fn size_in_bytes(self, heap_oop_size: u32) -> u32 {
        match self {
            Self::StaticOop | Self::NonstaticOop => heap_oop_size,
            Self::StaticByte | Self::NonstaticByte => 1,
            Self::StaticShort | Self::NonstaticShort => 2,
            Self::StaticWord | Self::NonstaticWord => 4,
            Self::StaticDouble | Self::NonstaticDouble => 8,
        }
    }
}

/// Number of fields per [`FieldAllocationType`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldAllocationCount {
    count: [u32; 10],
}

impl FieldAllocationCount {
    /// Counts one more field of the given category.
    pub fn update(&mut self, allocation_type: FieldAllocationType) {
        self.count[allocation_type.index()] += 1;
    }

    /// Returns the number of fields of the given category.
    #[must_use]
    pub const fn count(&self, allocation_type: FieldAllocationType) -> u32 {
        self.count[allocation_type.index()]
    }

    /// Returns the number of static fields.
    #[must_use]
    pub fn static_count(&self) -> u32 {
        self.count[..5].iter().sum()
    }

    /// Returns the number of nonstatic fields.
    #[must_use]
    pub fn nonstatic_count(&self) -> u32 {
        self.count[5..].iter().sum()
    }
}

impl<'a> FromIterator<&'a FieldInfo> for FieldAllocationCount {
    fn from_iter<T: IntoIterator<Item = &'a FieldInfo>>(iter: T) -> Self {
        let mut counts = Self::default();
        for field in iter {
            counts.update(field.allocation_type);
        }
        counts
    }
}

/// Raw annotation data attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAnnotations {
    /// `RuntimeVisibleAnnotations`
    pub visible: Option<Vec<u8>>,
    /// `RuntimeInvisibleAnnotations`
    pub invisible: Option<Vec<u8>>,
    /// `RuntimeVisibleTypeAnnotations`
    pub visible_type: Option<Vec<u8>>,
    /// `RuntimeInvisibleTypeAnnotations`
    pub invisible_type: Option<Vec<u8>>,
}

/// A field of a loaded class.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    /// The access flags, restricted to the recognised bits.
    pub access_flags: FieldAccessFlags,
    /// The name of the field.
    pub name: Symbol,
    /// The descriptor of the field.
    pub signature: Symbol,
    /// The parsed descriptor.
    pub field_type: FieldType,
    /// The constant pool index of the name, 0 for injected fields.
    pub name_index: u16,
    /// The constant pool index of the descriptor, 0 for injected fields.
    pub signature_index: u16,
    /// The constant pool index of the `ConstantValue`, 0 if there is none.
    pub initial_value_index: u16,
    /// The constant pool index of the generic `Signature`, 0 if there is none.
    pub generic_signature_index: u16,
    /// The layout category of the field.
    pub allocation_type: FieldAllocationType,
    /// The contention group, if the field is annotated `@Contended`. Group 0 is the
    /// default group.
    pub contended_group: Option<u16>,
    /// Whether the field is annotated `@Stable`.
    pub is_stable: bool,
    /// Whether the field was synthesised by the VM rather than declared.
    pub is_injected: bool,
    /// Whether the field carries the `Synthetic` attribute.
    pub is_synthetic: bool,
    /// Whether the field carries the `Deprecated` attribute.
    pub is_deprecated: bool,
    /// Raw annotation data.
    pub annotations: FieldAnnotations,
    /// The byte offset of the field within an instance, or within the static area for
    /// static fields.
    pub offset: u32,
}

impl FieldInfo {
    /// Checks if the field is static.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }

    /// Checks if the field holds a reference.
    #[must_use]
    pub const fn is_oop(&self) -> bool {
        self.allocation_type.is_oop()
    }

    /// Checks if the field is annotated `@Contended`.
    #[must_use]
    pub const fn is_contended(&self) -> bool {
        self.contended_group.is_some()
    }

    /// Returns the primitive type of the field, if it is not a reference.
    #[must_use]
    pub const fn primitive_type(&self) -> Option<PrimitiveType> {
        match self.field_type {
            FieldType::Base(it) => Some(it),
            _ => None,
        }
    }
}
