//! Configuration of the class-file loader.

use std::collections::HashMap;

use crate::jvm::layout::{AllocationStyle, LayoutConfig};

/// The highest class-file major version this crate understands.
pub const JAVA_MAX_SUPPORTED_VERSION: u16 = 52;
/// The highest minor version accepted together with [`JAVA_MAX_SUPPORTED_VERSION`].
pub const JAVA_MAX_SUPPORTED_MINOR_VERSION: u16 = 0;
/// The oldest class-file major version this crate understands.
pub const JAVA_MIN_SUPPORTED_VERSION: u16 = 45;

/// Number of new names collected before they are registered in the symbol table.
pub const SYMBOL_ALLOC_BATCH_SIZE: usize = 8;

/// A field synthesised by the VM and appended to the fields a class declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedField {
    /// The name of the field.
    pub name: String,
    /// The field descriptor.
    pub signature: String,
    /// Whether a Java declaration with the same name and signature may exist, in which
    /// case the Java declaration wins.
    pub may_be_java: bool,
}

impl InjectedField {
    /// Creates an injected field that never collides with a Java declaration.
    #[must_use]
    pub fn new(name: &str, signature: &str) -> Self {
        Self {
            name: name.to_owned(),
            signature: signature.to_owned(),
            may_be_java: false,
        }
    }

    /// Marks the field as possibly declared in Java as well.
    #[must_use]
    pub fn maybe_java(mut self) -> Self {
        self.may_be_java = true;
        self
    }
}

/// Options controlling verification strictness, version gating, and field layout.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Whether format checks are performed. Trusted classes may skip them.
    pub verify: bool,
    /// The oldest accepted major version.
    pub min_major_version: u16,
    /// The newest accepted major version, never above [`JAVA_MAX_SUPPORTED_VERSION`].
    pub max_major_version: u16,
    /// The newest accepted minor version when the major version equals
    /// [`LoadOptions::max_major_version`].
    pub max_minor_version: u16,
    /// Whether `MethodHandle`, `MethodType`, and `InvokeDynamic` constants are allowed.
    pub enable_invokedynamic: bool,
    /// Whether a `LocalVariableTypeTable` entry without a matching `LocalVariableTable`
    /// entry is tolerated.
    pub relax_local_variable_type_table: bool,
    /// Whether `@Contended` is ignored for classes outside privileged loaders.
    pub restrict_contended: bool,
    /// Bytes of padding placed around contended fields and groups.
    pub contended_padding_width: u32,
    /// The preferred order of nonstatic fields.
    pub allocation_style: AllocationStyle,
    /// Whether small fields are packed into the alignment gap before the first `long` or
    /// `double`.
    pub compact_fields: bool,
    /// Classes whose fields are accessed at fixed offsets by the VM; they always use
    /// [`AllocationStyle::OopsFirst`].
    pub fixed_offset_classes: Vec<String>,
    /// Fields the VM appends to the named classes.
    pub injected_fields: HashMap<String, Vec<InjectedField>>,
    /// Object layout parameters of the target heap.
    pub layout: LayoutConfig,
    /// Number of new symbols collected before registering them.
    pub symbol_batch_size: usize,
}

const FIXED_OFFSET_CLASSES: &[&str] = &[
    "java/lang/AssertionStatusDirectives",
    "java/lang/Class",
    "java/lang/ClassLoader",
    "java/lang/ref/Reference",
    "java/lang/ref/SoftReference",
    "java/lang/StackTraceElement",
    "java/lang/String",
    "java/lang/Throwable",
    "java/lang/Boolean",
    "java/lang/Character",
    "java/lang/Float",
    "java/lang/Double",
    "java/lang/Byte",
    "java/lang/Short",
    "java/lang/Integer",
    "java/lang/Long",
];

fn default_injected_fields() -> HashMap<String, Vec<InjectedField>> {
    HashMap::from([
        (
            "java/lang/Class".to_owned(),
            vec![
                InjectedField::new("klass", "J"),
                InjectedField::new("array_klass", "J"),
                InjectedField::new("oop_size", "I"),
                InjectedField::new("static_oop_field_count", "I"),
                InjectedField::new("protection_domain", "Ljava/lang/Object;"),
                InjectedField::new("init_lock", "Ljava/lang/Object;"),
                InjectedField::new("signers", "Ljava/lang/Object;"),
            ],
        ),
        (
            "java/lang/ClassLoader".to_owned(),
            vec![InjectedField::new("loader_data", "J")],
        ),
        (
            "java/lang/invoke/MemberName".to_owned(),
            vec![
                InjectedField::new("vmloader", "Ljava/lang/Object;"),
                InjectedField::new("vmindex", "J").maybe_java(),
            ],
        ),
        (
            "java/lang/invoke/ResolvedMethodName".to_owned(),
            vec![InjectedField::new("vmholder", "Ljava/lang/Class;")],
        ),
    ])
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            verify: true,
            min_major_version: JAVA_MIN_SUPPORTED_VERSION,
            max_major_version: JAVA_MAX_SUPPORTED_VERSION,
            max_minor_version: JAVA_MAX_SUPPORTED_MINOR_VERSION,
            enable_invokedynamic: true,
            relax_local_variable_type_table: false,
            restrict_contended: true,
            contended_padding_width: 128,
            allocation_style: AllocationStyle::OopsLast,
            compact_fields: true,
            fixed_offset_classes: FIXED_OFFSET_CLASSES.iter().map(|&it| it.to_owned()).collect(),
            injected_fields: default_injected_fields(),
            layout: LayoutConfig::compressed(),
            symbol_batch_size: SYMBOL_ALLOC_BATCH_SIZE,
        }
    }
}

impl LoadOptions {
    /// Enables or disables format checks.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Limits the accepted versions to at most `major.minor`.
    ///
    /// The major version is clamped to [`JAVA_MAX_SUPPORTED_VERSION`].
    #[must_use]
    pub fn with_max_version(mut self, major: u16, minor: u16) -> Self {
        if major >= JAVA_MAX_SUPPORTED_VERSION {
            self.max_major_version = JAVA_MAX_SUPPORTED_VERSION;
            self.max_minor_version = minor.min(JAVA_MAX_SUPPORTED_MINOR_VERSION);
        } else {
            self.max_major_version = major;
            self.max_minor_version = minor;
        }
        self
    }

    /// Enables or disables `invokedynamic` related constants.
    #[must_use]
    pub fn with_invokedynamic(mut self, enabled: bool) -> Self {
        self.enable_invokedynamic = enabled;
        self
    }

    /// Tolerates unmatched `LocalVariableTypeTable` entries.
    #[must_use]
    pub fn with_relaxed_local_variable_type_table(mut self, relaxed: bool) -> Self {
        self.relax_local_variable_type_table = relaxed;
        self
    }

    /// Controls whether `@Contended` is honoured outside privileged loaders.
    #[must_use]
    pub fn with_restrict_contended(mut self, restrict: bool) -> Self {
        self.restrict_contended = restrict;
        self
    }

    /// Sets the padding around contended fields.
    #[must_use]
    pub fn with_contended_padding_width(mut self, width: u32) -> Self {
        self.contended_padding_width = width;
        self
    }

    /// Sets the preferred field allocation style.
    #[must_use]
    pub fn with_allocation_style(mut self, style: AllocationStyle) -> Self {
        self.allocation_style = style;
        self
    }

    /// Enables or disables packing small fields into alignment gaps.
    #[must_use]
    pub fn with_compact_fields(mut self, compact: bool) -> Self {
        self.compact_fields = compact;
        self
    }

    /// Sets the object layout of the target heap.
    #[must_use]
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    /// Registers fields injected into the named class.
    #[must_use]
    pub fn with_injected_fields(
        mut self,
        class_name: impl Into<String>,
        fields: Vec<InjectedField>,
    ) -> Self {
        self.injected_fields.insert(class_name.into(), fields);
        self
    }

    /// Returns `true` if the class is one whose fields the VM accesses at fixed offsets.
    #[must_use]
    pub fn has_fixed_field_offsets(&self, class_name: &str) -> bool {
        self.fixed_offset_classes.iter().any(|it| it == class_name)
    }

    /// Returns `true` if a class file of `major.minor` may be loaded.
    #[must_use]
    pub fn is_supported_version(&self, major: u16, minor: u16) -> bool {
        major >= self.min_major_version
            && major <= self.max_major_version
            && (major != self.max_major_version || minor <= self.max_minor_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_window() {
        let options = LoadOptions::default();
        assert!(options.is_supported_version(45, 3));
        assert!(options.is_supported_version(51, 0xFFFF));
        assert!(options.is_supported_version(52, 0));
        assert!(!options.is_supported_version(52, 1));
        assert!(!options.is_supported_version(53, 0));
        assert!(!options.is_supported_version(44, 0));
    }

    #[test]
    fn max_version_is_clamped() {
        let options = LoadOptions::default().with_max_version(60, 5);
        assert_eq!(options.max_major_version, JAVA_MAX_SUPPORTED_VERSION);
        assert_eq!(options.max_minor_version, JAVA_MAX_SUPPORTED_MINOR_VERSION);
        let options = LoadOptions::default().with_max_version(50, 0);
        assert!(!options.is_supported_version(51, 0));
    }

    #[test]
    fn fixed_offset_classes() {
        let options = LoadOptions::default();
        assert!(options.has_fixed_field_offsets("java/lang/String"));
        assert!(!options.has_fixed_field_offsets("com/example/Foo"));
    }
}
