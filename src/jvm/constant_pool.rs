//! Constant pool of a class being loaded.

use crate::{
    errors::LoadError,
    macros::{malform, see_jvm_spec},
    symbols::Symbol,
};

/// Tag bytes of constant pool entries.
#[doc = crate::macros::see_jvm_spec!(4, 4)]
pub mod tag {
    /// `CONSTANT_Utf8`
    pub const UTF8: u8 = 1;
    /// `CONSTANT_Integer`
    pub const INTEGER: u8 = 3;
    /// `CONSTANT_Float`
    pub const FLOAT: u8 = 4;
    /// `CONSTANT_Long`
    pub const LONG: u8 = 5;
    /// `CONSTANT_Double`
    pub const DOUBLE: u8 = 6;
    /// `CONSTANT_Class`
    pub const CLASS: u8 = 7;
    /// `CONSTANT_String`
    pub const STRING: u8 = 8;
    /// `CONSTANT_Fieldref`
    pub const FIELDREF: u8 = 9;
    /// `CONSTANT_Methodref`
    pub const METHODREF: u8 = 10;
    /// `CONSTANT_InterfaceMethodref`
    pub const INTERFACE_METHODREF: u8 = 11;
    /// `CONSTANT_NameAndType`
    pub const NAME_AND_TYPE: u8 = 12;
    /// `CONSTANT_MethodHandle`
    pub const METHOD_HANDLE: u8 = 15;
    /// `CONSTANT_MethodType`
    pub const METHOD_TYPE: u8 = 16;
    /// `CONSTANT_InvokeDynamic`
    pub const INVOKE_DYNAMIC: u8 = 18;
}

/// The kind of a method handle constant.
#[doc = see_jvm_spec!(5, 4, 3, 5)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReferenceKind {
    /// `REF_getField`
    GetField = 1,
    /// `REF_getStatic`
    GetStatic = 2,
    /// `REF_putField`
    PutField = 3,
    /// `REF_putStatic`
    PutStatic = 4,
    /// `REF_invokeVirtual`
    InvokeVirtual = 5,
    /// `REF_invokeStatic`
    InvokeStatic = 6,
    /// `REF_invokeSpecial`
    InvokeSpecial = 7,
    /// `REF_newInvokeSpecial`
    NewInvokeSpecial = 8,
    /// `REF_invokeInterface`
    InvokeInterface = 9,
}

impl ReferenceKind {
    /// Decodes a reference kind byte.
    #[must_use]
    pub const fn from_u8(kind: u8) -> Option<Self> {
        match kind {
            1 => Some(Self::GetField),
            2 => Some(Self::GetStatic),
            3 => Some(Self::PutField),
            4 => Some(Self::PutStatic),
            5 => Some(Self::InvokeVirtual),
            6 => Some(Self::InvokeStatic),
            7 => Some(Self::InvokeSpecial),
            8 => Some(Self::NewInvokeSpecial),
            9 => Some(Self::InvokeInterface),
            _ => None,
        }
    }

    /// Returns `true` for the four kinds that refer to a field.
    #[must_use]
    pub const fn is_field_access(self) -> bool {
        matches!(
            self,
            Self::GetField | Self::GetStatic | Self::PutField | Self::PutStatic
        )
    }
}

/// An entry in the [`ConstantPool`].
///
/// `ClassIndex` and `StringIndex` only exist between reading the raw entries and
/// resolving them; a fully parsed pool holds `UnresolvedClass` and `UnresolvedString`
/// instead.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Entry {
    /// Slot 0 and the slot following a `Long` or `Double`.
    Invalid,
    /// A UTF-8 string.
    #[doc = see_jvm_spec!(4, 4, 7)]
    Utf8(Symbol),
    /// An integer.
    Integer(i32),
    /// A float.
    Float(f32),
    /// A long.
    Long(i64),
    /// A double.
    Double(f64),
    /// A class whose name has not been checked yet.
    ClassIndex {
        /// The index of its binary name.
        name_index: u16,
    },
    /// A string whose value has not been checked yet.
    StringIndex {
        /// The index of its value.
        string_index: u16,
    },
    /// A class, referenced by name.
    #[doc = see_jvm_spec!(4, 4, 1)]
    UnresolvedClass(Symbol),
    /// A string constant.
    #[doc = see_jvm_spec!(4, 4, 3)]
    UnresolvedString(Symbol),
    /// A field reference.
    FieldRef {
        /// The index of the owning class.
        class_index: u16,
        /// The index of the name and type.
        name_and_type_index: u16,
    },
    /// A method reference.
    MethodRef {
        /// The index of the owning class.
        class_index: u16,
        /// The index of the name and type.
        name_and_type_index: u16,
    },
    /// An interface method reference.
    InterfaceMethodRef {
        /// The index of the owning interface.
        class_index: u16,
        /// The index of the name and type.
        name_and_type_index: u16,
    },
    /// A name and type.
    #[doc = see_jvm_spec!(4, 4, 6)]
    NameAndType {
        /// The index of the name.
        name_index: u16,
        /// The index of the descriptor.
        signature_index: u16,
    },
    /// A method handle.
    #[doc = see_jvm_spec!(4, 4, 8)]
    MethodHandle {
        /// The kind of method handle.
        reference_kind: ReferenceKind,
        /// The index of the referenced member.
        reference_index: u16,
    },
    /// A method type.
    MethodType {
        /// The index of the method descriptor.
        signature_index: u16,
    },
    /// An `invokedynamic` call site.
    #[doc = see_jvm_spec!(4, 4, 10)]
    InvokeDynamic {
        /// The index into the `BootstrapMethods` attribute.
        bootstrap_method_attr_index: u16,
        /// The index of the name and type.
        name_and_type_index: u16,
    },
}

impl Entry {
    /// Returns the tag of this entry as found in the class file.
    ///
    /// Resolved forms report the tag they were read with; [`Entry::Invalid`] reports 0.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::Utf8(_) => tag::UTF8,
            Self::Integer(_) => tag::INTEGER,
            Self::Float(_) => tag::FLOAT,
            Self::Long(_) => tag::LONG,
            Self::Double(_) => tag::DOUBLE,
            Self::ClassIndex { .. } | Self::UnresolvedClass(_) => tag::CLASS,
            Self::StringIndex { .. } | Self::UnresolvedString(_) => tag::STRING,
            Self::FieldRef { .. } => tag::FIELDREF,
            Self::MethodRef { .. } => tag::METHODREF,
            Self::InterfaceMethodRef { .. } => tag::INTERFACE_METHODREF,
            Self::NameAndType { .. } => tag::NAME_AND_TYPE,
            Self::MethodHandle { .. } => tag::METHOD_HANDLE,
            Self::MethodType { .. } => tag::METHOD_TYPE,
            Self::InvokeDynamic { .. } => tag::INVOKE_DYNAMIC,
        }
    }

    /// Gets the kind of this constant pool entry.
    #[must_use]
    pub const fn constant_kind(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Utf8(_) => "CONSTANT_Utf8",
            Self::Integer(_) => "CONSTANT_Integer",
            Self::Float(_) => "CONSTANT_Float",
            Self::Long(_) => "CONSTANT_Long",
            Self::Double(_) => "CONSTANT_Double",
            Self::ClassIndex { .. } | Self::UnresolvedClass(_) => "CONSTANT_Class",
            Self::StringIndex { .. } | Self::UnresolvedString(_) => "CONSTANT_String",
            Self::FieldRef { .. } => "CONSTANT_Fieldref",
            Self::MethodRef { .. } => "CONSTANT_Methodref",
            Self::InterfaceMethodRef { .. } => "CONSTANT_InterfaceMethodref",
            Self::NameAndType { .. } => "CONSTANT_NameAndType",
            Self::MethodHandle { .. } => "CONSTANT_MethodHandle",
            Self::MethodType { .. } => "CONSTANT_MethodType",
            Self::InvokeDynamic { .. } => "CONSTANT_InvokeDynamic",
        }
    }
}

/// A value substituted for a constant pool entry before resolution.
///
/// Patches are only accepted for classes defined on behalf of a host class, whose
/// constant pool is partly supplied at definition time.
#[derive(Debug, Clone, PartialEq)]
pub enum CpPatch {
    /// Replaces a `CONSTANT_Utf8`.
    Utf8(String),
    /// Replaces a `CONSTANT_Class` with the named class.
    Class(String),
    /// Replaces a `CONSTANT_String`.
    String(String),
    /// Replaces a `CONSTANT_Integer`.
    Integer(i32),
    /// Replaces a `CONSTANT_Float`.
    Float(f32),
    /// Replaces a `CONSTANT_Long`.
    Long(i64),
    /// Replaces a `CONSTANT_Double`.
    Double(f64),
}

/// A JVM constant pool. Index 0 is always [`Entry::Invalid`].
#[doc = crate::macros::see_jvm_spec!(4, 4)]
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    pub(crate) entries: Vec<Entry>,
}

impl ConstantPool {
    /// Creates a pool whose `constant_pool_count` is `length`, every slot invalid.
    pub(crate) fn with_length(length: u16) -> Self {
        Self {
            entries: vec![Entry::Invalid; usize::from(length)],
        }
    }

    /// Gets the count of the constant pool. Note that this is NOT the number of entries.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "The pool is created from a u16 count and never grows."
    )]
    pub fn length(&self) -> u16 {
        self.entries.len() as u16
    }

    /// Gets the entry at the given index, or [`None`] if the index is out of bounds.
    #[must_use]
    pub fn get(&self, index: u16) -> Option<&Entry> {
        self.entries.get(usize::from(index))
    }

    /// Returns `true` if `index` designates a slot of the pool other than slot 0.
    #[must_use]
    pub fn is_within_bounds(&self, index: u16) -> bool {
        index > 0 && index < self.length()
    }

    pub(crate) fn set(&mut self, index: u16, entry: Entry) {
        self.entries[usize::from(index)] = entry;
    }

    /// Returns the tag of the entry at `index`, 0 for invalid or out-of-bounds slots.
    #[must_use]
    pub fn tag_at(&self, index: u16) -> u8 {
        self.get(index).map_or(0, Entry::tag)
    }

    /// Gets the UTF-8 entry at `index`.
    ///
    /// # Errors
    /// Returns a format error if the slot does not hold a `CONSTANT_Utf8`.
    pub fn utf8_at(&self, index: u16) -> Result<&Symbol, LoadError> {
        match self.get(index) {
            Some(Entry::Utf8(symbol)) => Ok(symbol),
            _ => malform!("Invalid constant pool index {index}: expected CONSTANT_Utf8"),
        }
    }

    /// Gets the name of the class entry at `index`.
    ///
    /// # Errors
    /// Returns a format error if the slot does not hold a `CONSTANT_Class`.
    pub fn klass_name_at(&self, index: u16) -> Result<&Symbol, LoadError> {
        match self.get(index) {
            Some(Entry::UnresolvedClass(name)) => Ok(name),
            _ => malform!("Invalid constant pool index {index}: expected CONSTANT_Class"),
        }
    }

    /// Gets the name and signature indices of the `NameAndType` entry at `index`.
    ///
    /// # Errors
    /// Returns a format error if the slot does not hold a `CONSTANT_NameAndType`.
    pub fn name_and_type_at(&self, index: u16) -> Result<(u16, u16), LoadError> {
        match self.get(index) {
            Some(&Entry::NameAndType {
                name_index,
                signature_index,
            }) => Ok((name_index, signature_index)),
            _ => malform!("Invalid constant pool index {index}: expected CONSTANT_NameAndType"),
        }
    }

    /// Gets the string constant at `index`.
    ///
    /// # Errors
    /// Returns a format error if the slot does not hold a `CONSTANT_String`.
    pub fn string_at(&self, index: u16) -> Result<&Symbol, LoadError> {
        match self.get(index) {
            Some(Entry::UnresolvedString(value)) => Ok(value),
            _ => malform!("Invalid constant pool index {index}: expected CONSTANT_String"),
        }
    }

    /// Iterates over the valid slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Entry)> {
        (0..self.length())
            .zip(self.entries.iter())
            .filter(|(_, entry)| !matches!(entry, Entry::Invalid))
    }
}
