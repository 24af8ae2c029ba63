//! JVM classes and interfaces as produced by the loader.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use super::{
    constant_pool::ConstantPool,
    field::FieldInfo,
    layout::{FieldLayout, OopMapBlock},
    method::MethodInfo,
    resolver::LoaderContext,
    vtable::VtableSizes,
};
use crate::{macros::see_jvm_spec, symbols::Symbol};

/// A shared reference to a loaded class.
pub type ClassHandle = Arc<ClassDescriptor>;

/// The binary name of `java.lang.Object`.
pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";
/// The binary name of `java.lang.Class`.
pub const JAVA_LANG_CLASS: &str = "java/lang/Class";

/// Major version of Java 1.1 class files.
pub const JAVA_1_1_VERSION: u16 = 45;
/// Major version of Java 1.3 class files.
pub const JAVA_1_3_VERSION: u16 = 47;
/// Major version of Java 5 class files.
pub const JAVA_1_5_VERSION: u16 = 49;
/// Major version of Java 6 class files.
pub const JAVA_6_VERSION: u16 = 50;
/// Major version of Java 7 class files.
pub const JAVA_7_VERSION: u16 = 51;
/// Major version of Java 8 class files.
pub const JAVA_8_VERSION: u16 = 52;
/// Major version of Java 9 class files.
pub const JAVA_9_VERSION: u16 = 53;

bitflags! {
    /// The access flags of a class.
    #[doc = see_jvm_spec!(4, 1)]
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
    pub struct ClassAccessFlags: u16 {
        /// Declared `public`; may be accessed from outside its package.
        const PUBLIC = 0x0001;
        /// Declared `final`; no subclasses allowed.
        const FINAL = 0x0010;
        /// Treat superclass methods specially when invoked by the `invokespecial` instruction.
        const SUPER = 0x0020;
        /// Is an interface, not a class.
        const INTERFACE = 0x0200;
        /// Declared `abstract`; must not be instantiated.
        const ABSTRACT = 0x0400;
        /// Declared synthetic; not present in the source code.
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface.
        const ANNOTATION = 0x2000;
        /// Declared as an `enum` class.
        const ENUM = 0x4000;
    }
}

/// The access flag marking a `module-info` class.
pub const ACC_MODULE: u16 = 0x8000;

/// The version of a class file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// The major version.
    pub major: u16,
    /// The minor version.
    pub minor: u16,
}

impl Version {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Returns `true` if the major version is at least `major`.
    #[must_use]
    pub const fn is_at_least(&self, major: u16) -> bool {
        self.major >= major
    }

    /// Returns `true` for the oldest class files, which encode `Code` sizes in fewer bytes.
    #[must_use]
    pub const fn has_compact_code_sizes(&self) -> bool {
        self.major == JAVA_1_1_VERSION && self.minor < 3
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// An entry of the `InnerClasses` attribute, as constant pool indices.
#[doc = see_jvm_spec!(4, 7, 6)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InnerClassEntry {
    /// The index of the inner class.
    pub inner_class_info_index: u16,
    /// The index of the outer class, 0 if there is none.
    pub outer_class_info_index: u16,
    /// The index of the simple name, 0 for anonymous classes.
    pub inner_name_index: u16,
    /// The access flags of the inner class.
    pub inner_access_flags: u16,
}

/// The `EnclosingMethod` attribute.
#[doc = see_jvm_spec!(4, 7, 7)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnclosingMethod {
    /// The index of the enclosing class.
    pub class_index: u16,
    /// The index of the enclosing method's name and type, 0 if there is none.
    pub method_index: u16,
}

/// An entry of the `BootstrapMethods` attribute.
#[doc = see_jvm_spec!(4, 7, 23)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// The index of the `CONSTANT_MethodHandle`.
    pub method_ref: u16,
    /// The indices of the static arguments.
    pub arguments: Vec<u16>,
}

/// Raw annotation data attached to a class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassAnnotations {
    /// `RuntimeVisibleAnnotations`
    pub visible: Option<Vec<u8>>,
    /// `RuntimeInvisibleAnnotations`
    pub invisible: Option<Vec<u8>>,
    /// `RuntimeVisibleTypeAnnotations`
    pub visible_type: Option<Vec<u8>>,
    /// `RuntimeInvisibleTypeAnnotations`
    pub invisible_type: Option<Vec<u8>>,
}

/// A fully loaded, verified, and laid out class.
#[derive(Debug)]
pub struct ClassDescriptor {
    /// The binary name of the class.
    pub name: Symbol,
    /// The version of the class file.
    pub version: Version,
    /// The access flags of the class.
    pub access_flags: ClassAccessFlags,
    /// The super class, absent only for `java/lang/Object`.
    pub super_class: Option<ClassHandle>,
    /// The interfaces declared by the class.
    pub local_interfaces: Arc<[ClassHandle]>,
    /// Every interface implemented directly or indirectly.
    ///
    /// Shared with the super class or with [`ClassDescriptor::local_interfaces`] when
    /// this class adds nothing to either.
    pub transitive_interfaces: Arc<[ClassHandle]>,
    /// The resolved constant pool.
    pub constant_pool: ConstantPool,
    /// The declared fields followed by the injected fields, each with its offset.
    pub fields: Vec<FieldInfo>,
    /// The number of fields declared in the class file.
    pub java_fields_count: usize,
    /// The methods, sorted by name and descriptor.
    pub methods: Vec<MethodInfo>,
    /// For every position in [`ClassDescriptor::methods`], the index of the method in
    /// the class file.
    pub method_ordering: Vec<u16>,
    /// The instance and static layout.
    pub layout: FieldLayout,
    /// Sizes of the dispatch tables.
    pub vtable: VtableSizes,
    /// The `SourceFile` attribute.
    pub source_file: Option<Symbol>,
    /// The `SourceDebugExtension` attribute.
    pub source_debug_extension: Option<Vec<u8>>,
    /// The generic `Signature` attribute.
    pub generic_signature: Option<Symbol>,
    /// The `InnerClasses` attribute.
    pub inner_classes: Vec<InnerClassEntry>,
    /// The `EnclosingMethod` attribute.
    pub enclosing_method: Option<EnclosingMethod>,
    /// The `BootstrapMethods` attribute.
    pub bootstrap_methods: Vec<BootstrapMethod>,
    /// Raw annotation data.
    pub annotations: ClassAnnotations,
    /// Whether instances need finalization.
    pub has_finalizer: bool,
    /// Whether the no-argument constructor does nothing beyond calling a vanilla super
    /// constructor.
    pub has_vanilla_constructor: bool,
    /// Whether this interface declares a non-static, non-abstract method.
    pub declares_nonstatic_concrete_methods: bool,
    /// Whether this class or any super type declares a default method.
    pub has_nonstatic_concrete_methods: bool,
    /// Whether the class is annotated `@Contended`.
    pub is_contended: bool,
    /// Whether the class carries the `Synthetic` attribute.
    pub is_synthetic: bool,
    /// Whether the class carries the `Deprecated` attribute.
    pub is_deprecated: bool,
    /// The loader that defined the class.
    pub loader: LoaderContext,
    /// The class on whose behalf this class was defined, if any.
    pub host_class: Option<ClassHandle>,
}

impl ClassDescriptor {
    /// Checks if the class is an interface.
    #[must_use]
    pub const fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Checks if the class is an abstract class.
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }

    /// Checks if the class is final.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::FINAL)
    }

    /// Checks if the class is public.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::PUBLIC)
    }

    /// Returns the package part of the binary name, empty for the unnamed package.
    #[must_use]
    pub fn package_name(&self) -> &str {
        package_of(&self.name)
    }

    /// Checks if both classes are in the same runtime package.
    #[must_use]
    pub fn is_same_package(&self, other: &ClassDescriptor) -> bool {
        self.package_name() == other.package_name() && self.loader == other.loader
    }

    /// Gets a method of the class by its name and descriptor.
    #[must_use]
    pub fn find_method(&self, name: &str, signature: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.signature == signature)
    }

    /// Gets a field of the class by its name and descriptor.
    #[must_use]
    pub fn find_field(&self, name: &str, signature: &str) -> Option<&FieldInfo> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.signature == signature)
    }

    /// Iterates over the super classes, nearest first.
    pub fn super_classes(&self) -> impl Iterator<Item = &ClassHandle> {
        std::iter::successors(self.super_class.as_ref(), |it| it.super_class.as_ref())
    }

    /// Checks if `self` is `other` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(&self, other: &ClassDescriptor) -> bool {
        std::ptr::eq(self, other) || self.super_classes().any(|it| std::ptr::eq(&**it, other))
    }

    /// Returns the oop map blocks describing where references live in an instance.
    #[must_use]
    pub fn nonstatic_oop_maps(&self) -> &[OopMapBlock] {
        &self.layout.oop_maps
    }
}

impl fmt::Display for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Returns the package part of a binary class name.
pub(crate) fn package_of(binary_name: &str) -> &str {
    binary_name
        .rsplit_once('/')
        .map_or("", |(package, _)| package)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_names() {
        assert_eq!(package_of("java/lang/Object"), "java/lang");
        assert_eq!(package_of("Foo"), "");
    }

    #[test]
    fn versions_order_and_display() {
        assert!(Version::new(52, 0) > Version::new(51, 0xFFFF));
        assert!(Version::new(45, 2).has_compact_code_sizes());
        assert!(!Version::new(45, 3).has_compact_code_sizes());
        assert_eq!(Version::new(50, 0).to_string(), "50.0");
    }
}
